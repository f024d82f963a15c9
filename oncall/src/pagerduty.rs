//! PagerDuty REST API client for the on-call listing endpoint.
use crate::credentials::Credential;
use crate::metrics_defs::PAGERDUTY_REQUEST_DURATION;
use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::{Deserialize, Deserializer};
use shared::histogram;
use std::sync::Arc;
use std::time::{Duration, Instant};

const ACCEPT_V2: &str = "application/vnd.pagerduty+json;version=2";

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("PagerDuty request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("PagerDuty returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("invalid PagerDuty URL: {0}")]
    InvalidUrl(String),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub email: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct OnCall {
    pub user: User,
    #[serde(default)]
    pub escalation_level: Option<u32>,
}

#[derive(Deserialize)]
struct OnCallsResponse {
    oncalls: Vec<OnCall>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OnCallQuery {
    pub schedule_ids: Vec<String>,
    /// Ask PagerDuty to embed the full user objects instead of references.
    pub include_users: bool,
}

/// An authenticated handle to the upstream on-call API.
#[async_trait]
pub trait OnCallApi: Send + Sync {
    /// Lists current on-call entries, in upstream order.
    async fn list_on_calls(&self, query: &OnCallQuery) -> Result<Vec<OnCall>, ApiError>;
}

/// Builds authenticated clients from a credential. Must not do network I/O.
pub trait Connector: Send + Sync {
    fn connect(&self, credential: &Credential) -> Arc<dyn OnCallApi>;
}

pub struct PagerDutyConnector {
    client: reqwest::Client,
    oncalls_url: String,
}

impl PagerDutyConnector {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let oncalls_url = format!("{}/{}", base_url.trim_end_matches('/'), "oncalls");
        Url::parse(&oncalls_url).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(PagerDutyConnector {
            client,
            oncalls_url,
        })
    }
}

impl Connector for PagerDutyConnector {
    fn connect(&self, credential: &Credential) -> Arc<dyn OnCallApi> {
        Arc::new(PagerDutyClient {
            client: self.client.clone(),
            oncalls_url: self.oncalls_url.clone(),
            credential: credential.clone(),
        })
    }
}

pub struct PagerDutyClient {
    client: reqwest::Client,
    oncalls_url: String,
    credential: Credential,
}

#[async_trait]
impl OnCallApi for PagerDutyClient {
    async fn list_on_calls(&self, query: &OnCallQuery) -> Result<Vec<OnCall>, ApiError> {
        let mut url =
            Url::parse(&self.oncalls_url).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        {
            let mut pairs = url.query_pairs_mut();
            for id in &query.schedule_ids {
                pairs.append_pair("schedule_ids[]", id);
            }
            if query.include_users {
                pairs.append_pair("include[]", "users");
            }
        }

        let start = Instant::now();
        let response = self
            .client
            .get(url)
            .header(ACCEPT, ACCEPT_V2)
            .header(
                AUTHORIZATION,
                format!("Token token={}", self.credential.expose()),
            )
            .send()
            .await;
        histogram!(PAGERDUTY_REQUEST_DURATION).record(start.elapsed().as_secs_f64());

        let response = response?;
        if !response.status().is_success() {
            return Err(ApiError::Status(response.status()));
        }

        Ok(response.json::<OnCallsResponse>().await?.oncalls)
    }
}
