use crate::memoize::Memoizer;
use crate::pagerduty::{Connector, OnCallApi};
use crate::secrets::{SecretFormatError, SecretStore, SecretStoreError, parse_payload, string_field};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Cache key under which the credential is memoized.
const CLIENT_KEY: &str = "clientKey";

/// The PagerDuty API token. Never printed.
#[derive(Clone, PartialEq)]
pub struct Credential(Arc<str>);

impl Credential {
    pub fn new(token: impl Into<Arc<str>>) -> Self {
        Credential(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CredentialError {
    #[error("environment variable {0} is not set")]
    Configuration(String),
    #[error("secret store error: {0}")]
    SecretStore(#[from] SecretStoreError),
    #[error("invalid secret payload: {0}")]
    SecretFormat(#[from] SecretFormatError),
}

/// Where the credential comes from.
pub enum CredentialSource {
    /// The env var names a secret whose JSON payload holds the credential
    /// under `field`.
    SecretStore {
        env: String,
        field: String,
        store: Arc<dyn SecretStore>,
    },
    /// The env var holds the credential itself.
    Environment { env: String },
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub struct CredentialResolver {
    source: Arc<CredentialSource>,
    connector: Arc<dyn Connector>,
    cache: Memoizer<Credential, CredentialError>,
    env: EnvLookup,
}

impl CredentialResolver {
    pub fn new(
        source: CredentialSource,
        connector: Arc<dyn Connector>,
        freshness: Duration,
        expiry: Duration,
    ) -> Self {
        CredentialResolver {
            source: Arc::new(source),
            connector,
            cache: Memoizer::new("credential", freshness, expiry),
            env: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    /// Replaces the process environment as the source of env vars.
    pub fn with_env<F>(mut self, env: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(env);
        self
    }

    /// Returns an authenticated client, loading the credential if it is not
    /// cached. Failures are cached as well and are not retried until the entry
    /// goes stale.
    pub async fn client(&self) -> Result<Arc<dyn OnCallApi>, CredentialError> {
        let source = self.source.clone();
        let env = self.env.clone();
        let credential = self
            .cache
            .memoize(CLIENT_KEY, move || load_credential(source, env))
            .await?;

        Ok(self.connector.connect(&credential))
    }
}

async fn load_credential(
    source: Arc<CredentialSource>,
    env: EnvLookup,
) -> Result<Credential, CredentialError> {
    match &*source {
        CredentialSource::SecretStore {
            env: env_key,
            field,
            store,
        } => {
            let secret_id = lookup_env(&env, env_key)?;
            tracing::info!(secret_id = %secret_id, "Retrieving PagerDuty key from secret store");

            let raw = store.secret_string(&secret_id).await.inspect_err(|e| {
                tracing::error!(error = %e, "Unable to retrieve secret");
            })?;
            let payload = parse_payload(&raw)?;
            let token = string_field(&payload, field).inspect_err(|e| {
                tracing::error!(secret_id = %secret_id, error = %e, "Secret payload is malformed");
            })?;

            Ok(Credential::new(token))
        }
        CredentialSource::Environment { env: env_key } => {
            let token = lookup_env(&env, env_key)?;
            Ok(Credential::new(token))
        }
    }
}

fn lookup_env(env: &EnvLookup, name: &str) -> Result<String, CredentialError> {
    env(name).ok_or_else(|| {
        tracing::error!(env_key = name, "Unable to find PagerDuty key setting in environment");
        CredentialError::Configuration(name.to_string())
    })
}
