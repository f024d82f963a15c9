use crate::credentials::CredentialResolver;
use crate::memoize::Memoizer;
use crate::pagerduty::OnCallQuery;
use crate::schedule::ScheduleId;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct OnCallUser {
    pub name: String,
    pub email: String,
}

/// Lookup failures. The messages are shown to callers as is, so they must not
/// carry any internal detail.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum OnCallError {
    #[error("Unable to connect to PagerDuty")]
    UpstreamUnavailable,
    #[error("Unable to determine on-call person")]
    UpstreamQuery,
    #[error("No on-call person")]
    NoOnCall,
}

pub struct OnCallResolver {
    credentials: Arc<CredentialResolver>,
    cache: Memoizer<OnCallUser, OnCallError>,
}

impl OnCallResolver {
    pub fn new(credentials: CredentialResolver, freshness: Duration, expiry: Duration) -> Self {
        OnCallResolver {
            credentials: Arc::new(credentials),
            cache: Memoizer::new("schedule", freshness, expiry),
        }
    }

    /// Returns the user currently on call for `schedule`, querying PagerDuty
    /// at most once per freshness window.
    pub async fn whos_on_call(&self, schedule: &ScheduleId) -> Result<OnCallUser, OnCallError> {
        let credentials = self.credentials.clone();
        let lookup_schedule = schedule.clone();
        self.cache
            .memoize(&schedule.cache_key(), move || lookup(credentials, lookup_schedule))
            .await
    }
}

async fn lookup(
    credentials: Arc<CredentialResolver>,
    schedule: ScheduleId,
) -> Result<OnCallUser, OnCallError> {
    let client = credentials.client().await.map_err(|e| {
        tracing::error!(error = %e, "Unable to build PagerDuty client");
        OnCallError::UpstreamUnavailable
    })?;

    tracing::info!("Calling PagerDuty API");
    let query = OnCallQuery {
        schedule_ids: vec![schedule.to_string()],
        include_users: true,
    };
    let on_calls = client.list_on_calls(&query).await.map_err(|e| {
        tracing::error!(error = %e, "Unable to request on-call person");
        OnCallError::UpstreamQuery
    })?;

    // Upstream order decides between simultaneous entries.
    let Some(first) = on_calls.into_iter().next() else {
        tracing::error!("No users returned in request");
        return Err(OnCallError::NoOnCall);
    };

    tracing::info!(user = %first.user.name, "Have on-call user");
    Ok(OnCallUser {
        name: first.user.name,
        email: first.user.email,
    })
}
