use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_SECRET_ENV: &str = "PAGERDUTY_API_TOKEN";
const DEFAULT_KEY_ENV: &str = "PAGERDUTY_API_KEY";
const DEFAULT_SECRET_FIELD: &str = "PagerDutyApiKey";
const DEFAULT_PAGERDUTY_URL: &str = "https://api.pagerduty.com";

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Listener and admin listener use the same address {0}")]
    ListenerConflict(String),

    #[error("{0}: expiry must not be shorter than freshness")]
    InvalidCacheWindow(&'static str),

    #[error("{0} cannot be empty")]
    EmptySetting(&'static str),

    #[error("{0} must be greater than 0")]
    ZeroSetting(&'static str),
}

/// On-call service configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener answering on-call queries
    pub listener: Listener,
    /// Listener for health and readiness probes
    pub admin_listener: Listener,
    #[serde(default)]
    pub credential: CredentialConfig,
    /// Cache for on-call lookups, one entry per schedule
    #[serde(default = "CacheConfig::schedule_default")]
    pub cache: CacheConfig,
    /// Cache for the PagerDuty credential
    #[serde(default = "CacheConfig::credential_default")]
    pub credential_cache: CacheConfig,
    #[serde(default)]
    pub pagerduty: PagerDutyConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.listener == self.admin_listener {
            return Err(ValidationError::ListenerConflict(format!(
                "{}:{}",
                self.listener.host, self.listener.port
            )));
        }

        self.cache.validate("cache")?;
        self.credential_cache.validate("credential_cache")?;
        self.credential.validate()?;

        if self.pagerduty.base_url.is_empty() {
            return Err(ValidationError::EmptySetting("pagerduty.base_url"));
        }
        if self.pagerduty.timeout_secs == 0 {
            return Err(ValidationError::ZeroSetting("pagerduty.timeout_secs"));
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Where the PagerDuty credential is read from.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CredentialConfig {
    /// `env` holds the id of a Secrets Manager secret, whose JSON payload
    /// holds the credential under `field`.
    SecretsManager {
        #[serde(default = "default_secret_env")]
        env: String,
        #[serde(default = "default_secret_field")]
        field: String,
    },
    /// `env` holds the credential itself.
    Environment {
        #[serde(default = "default_key_env")]
        env: String,
    },
}

impl CredentialConfig {
    /// Name of the environment variable which must be set at startup.
    pub fn env(&self) -> &str {
        match self {
            CredentialConfig::SecretsManager { env, .. } => env,
            CredentialConfig::Environment { env } => env,
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.env().is_empty() {
            return Err(ValidationError::EmptySetting("credential.env"));
        }
        if let CredentialConfig::SecretsManager { field, .. } = self
            && field.is_empty()
        {
            return Err(ValidationError::EmptySetting("credential.field"));
        }
        Ok(())
    }
}

impl Default for CredentialConfig {
    fn default() -> Self {
        CredentialConfig::SecretsManager {
            env: default_secret_env(),
            field: default_secret_field(),
        }
    }
}

fn default_secret_env() -> String {
    DEFAULT_SECRET_ENV.into()
}

fn default_key_env() -> String {
    DEFAULT_KEY_ENV.into()
}

fn default_secret_field() -> String {
    DEFAULT_SECRET_FIELD.into()
}

/// Freshness window and hard expiry of a memoized cache, in seconds.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CacheConfig {
    pub freshness_secs: u64,
    pub expiry_secs: u64,
}

impl CacheConfig {
    fn schedule_default() -> Self {
        CacheConfig {
            freshness_secs: 90,
            expiry_secs: 600,
        }
    }

    fn credential_default() -> Self {
        CacheConfig {
            freshness_secs: 600,
            expiry_secs: 3600,
        }
    }

    pub fn freshness(&self) -> Duration {
        Duration::from_secs(self.freshness_secs)
    }

    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.expiry_secs)
    }

    fn validate(&self, name: &'static str) -> Result<(), ValidationError> {
        if self.expiry_secs < self.freshness_secs {
            return Err(ValidationError::InvalidCacheWindow(name));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PagerDutyConfig {
    #[serde(default = "default_pagerduty_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl PagerDutyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PagerDutyConfig {
    fn default() -> Self {
        PagerDutyConfig {
            base_url: default_pagerduty_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_pagerduty_url() -> String {
    DEFAULT_PAGERDUTY_URL.into()
}

fn default_timeout_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).expect("parse config")
    }

    const MINIMAL: &str = r#"
listener:
    host: "0.0.0.0"
    port: 3000
admin_listener:
    host: "127.0.0.1"
    port: 3001
"#;

    #[test]
    fn test_defaults() {
        let config = parse(MINIMAL);
        assert!(config.validate().is_ok());

        assert_eq!(
            config.credential,
            CredentialConfig::SecretsManager {
                env: "PAGERDUTY_API_TOKEN".into(),
                field: "PagerDutyApiKey".into(),
            }
        );
        assert_eq!(config.cache.freshness(), Duration::from_secs(90));
        assert_eq!(config.cache.expiry(), Duration::from_secs(600));
        assert_eq!(config.credential_cache.freshness(), Duration::from_secs(600));
        assert_eq!(config.pagerduty.base_url, "https://api.pagerduty.com");
        assert_eq!(config.pagerduty.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_environment_credential_without_caching() {
        let config = parse(&format!(
            "{MINIMAL}
credential:
    source: environment
cache:
    freshness_secs: 0
    expiry_secs: 0
"
        ));
        assert!(config.validate().is_ok());
        assert_eq!(config.credential.env(), "PAGERDUTY_API_KEY");
        assert_eq!(config.cache.freshness(), Duration::ZERO);
    }

    #[test]
    fn test_invalid_configs() {
        let mut config = parse(MINIMAL);
        config.listener.port = 0;
        assert_eq!(config.validate(), Err(ValidationError::InvalidPort));

        let mut config = parse(MINIMAL);
        config.admin_listener = config.listener.clone();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::ListenerConflict(_))
        ));

        let mut config = parse(MINIMAL);
        config.cache.expiry_secs = 10;
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidCacheWindow("cache"))
        );

        let mut config = parse(MINIMAL);
        config.credential = CredentialConfig::SecretsManager {
            env: "PAGERDUTY_API_TOKEN".into(),
            field: "".into(),
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::EmptySetting("credential.field"))
        );

        let mut config = parse(MINIMAL);
        config.pagerduty.timeout_secs = 0;
        assert_eq!(
            config.validate(),
            Err(ValidationError::ZeroSetting("pagerduty.timeout_secs"))
        );
    }

    #[test]
    fn test_unknown_credential_source() {
        let yaml = format!("{MINIMAL}\ncredential:\n    source: vault\n");
        assert!(serde_yaml::from_str::<Config>(&yaml).is_err());
    }
}
