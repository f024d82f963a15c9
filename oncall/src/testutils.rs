//! In-memory doubles for the secret store and the PagerDuty API which count
//! how often they are called.
use crate::credentials::{Credential, CredentialResolver, CredentialSource};
use crate::pagerduty::{ApiError, Connector, OnCall, OnCallApi, OnCallQuery, User};
use crate::resolver::{OnCallResolver, OnCallUser};
use crate::secrets::{SecretStore, SecretStoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const TOKEN_ENV: &str = "PAGERDUTY_API_TOKEN";

pub struct MockSecretStore {
    payload: Option<String>,
    pub calls: AtomicUsize,
    requested: Mutex<Vec<String>>,
}

impl MockSecretStore {
    pub fn new(payload: &str) -> Self {
        MockSecretStore {
            payload: Some(payload.to_string()),
            calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        MockSecretStore {
            payload: None,
            calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn requested_ids(&self) -> Vec<String> {
        self.requested.lock().clone()
    }
}

#[async_trait]
impl SecretStore for MockSecretStore {
    async fn secret_string(&self, secret_id: &str) -> Result<String, SecretStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().push(secret_id.to_string());

        self.payload.clone().ok_or_else(|| SecretStoreError::Retrieve {
            secret_id: secret_id.to_string(),
            reason: "access denied".into(),
        })
    }
}

pub struct MockOnCallApi {
    // None makes every call fail.
    on_calls: Mutex<Option<Vec<OnCall>>>,
    delay: Duration,
    pub calls: AtomicUsize,
    queries: Mutex<Vec<OnCallQuery>>,
}

fn on_calls(users: &[(&str, &str)]) -> Vec<OnCall> {
    users
        .iter()
        .enumerate()
        .map(|(level, (name, email))| OnCall {
            user: User {
                name: name.to_string(),
                email: email.to_string(),
            },
            escalation_level: Some(level as u32 + 1),
        })
        .collect()
}

impl MockOnCallApi {
    pub fn with_users(users: &[(&str, &str)]) -> Self {
        MockOnCallApi {
            on_calls: Mutex::new(Some(on_calls(users))),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        MockOnCallApi {
            on_calls: Mutex::new(None),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Every call sleeps for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_users(&self, users: &[(&str, &str)]) {
        *self.on_calls.lock() = Some(on_calls(users));
    }

    pub fn queries(&self) -> Vec<OnCallQuery> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl OnCallApi for MockOnCallApi {
    async fn list_on_calls(&self, query: &OnCallQuery) -> Result<Vec<OnCall>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().push(query.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let on_calls = self.on_calls.lock().clone();
        on_calls.ok_or(ApiError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE))
    }
}

pub struct MockConnector {
    api: Arc<MockOnCallApi>,
    credentials: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new(api: Arc<MockOnCallApi>) -> Self {
        MockConnector {
            api,
            credentials: Mutex::new(Vec::new()),
        }
    }

    /// Credentials passed to `connect`, in call order.
    pub fn credentials(&self) -> Vec<String> {
        self.credentials.lock().clone()
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        MockConnector::new(Arc::new(MockOnCallApi::with_users(&[])))
    }
}

impl Connector for MockConnector {
    fn connect(&self, credential: &Credential) -> Arc<dyn OnCallApi> {
        self.credentials.lock().push(credential.expose().to_string());
        self.api.clone()
    }
}

pub fn jane_doe() -> OnCallUser {
    OnCallUser {
        name: "Jane Doe".into(),
        email: "jane@x.com".into(),
    }
}

/// Resolver wired to `api`, with the secret store returning `payload`.
/// Uses 90s/10m for schedules and 10m/1h for the credential.
pub fn resolver_with(api: Arc<MockOnCallApi>, payload: &str) -> OnCallResolver {
    let credentials = CredentialResolver::new(
        CredentialSource::SecretStore {
            env: TOKEN_ENV.into(),
            field: "PagerDutyApiKey".into(),
            store: Arc::new(MockSecretStore::new(payload)),
        },
        Arc::new(MockConnector::new(api)),
        Duration::from_secs(600),
        Duration::from_secs(3600),
    )
    .with_env(|name| (name == TOKEN_ENV).then(|| "arn:secret:pagerduty".to_string()));

    OnCallResolver::new(credentials, Duration::from_secs(90), Duration::from_secs(600))
}
