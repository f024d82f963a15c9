//! Access to the secret store holding the PagerDuty credential.
use async_trait::async_trait;
use aws_sdk_secretsmanager::error::DisplayErrorContext;
use serde_json::{Map, Value};

const VERSION_STAGE: &str = "AWSCURRENT";

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SecretStoreError {
    #[error("unable to retrieve secret {secret_id}: {reason}")]
    Retrieve { secret_id: String, reason: String },
    #[error("secret {0} has no string value")]
    NoSecretString(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SecretFormatError {
    #[error("secret payload is not a JSON object: {0}")]
    NotAnObject(String),
    #[error("nested value under {0:?} is not a JSON object")]
    InvalidNested(String),
    #[error("secret payload has no field {0:?}")]
    MissingField(String),
    #[error("secret field {0:?} is not a string")]
    NotAString(String),
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Returns the raw string payload of the secret named `secret_id`.
    async fn secret_string(&self, secret_id: &str) -> Result<String, SecretStoreError>;
}

/// Secret store backed by AWS Secrets Manager. Credentials and region come
/// from the standard AWS environment.
pub struct AwsSecretsManager {
    client: aws_sdk_secretsmanager::Client,
}

impl AwsSecretsManager {
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        AwsSecretsManager {
            client: aws_sdk_secretsmanager::Client::new(&config),
        }
    }
}

#[async_trait]
impl SecretStore for AwsSecretsManager {
    async fn secret_string(&self, secret_id: &str) -> Result<String, SecretStoreError> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .version_stage(VERSION_STAGE)
            .send()
            .await
            .map_err(|e| SecretStoreError::Retrieve {
                secret_id: secret_id.to_string(),
                reason: DisplayErrorContext(e).to_string(),
            })?;

        output
            .secret_string()
            .map(String::from)
            .ok_or_else(|| SecretStoreError::NoSecretString(secret_id.to_string()))
    }
}

/// Parses a secret payload into a JSON object.
///
/// String values which themselves look like JSON objects (start with `{`) are
/// decoded in place, so secrets can carry nested configuration.
pub fn parse_payload(raw: &str) -> Result<Map<String, Value>, SecretFormatError> {
    let mut payload: Map<String, Value> =
        serde_json::from_str(raw).map_err(|e| SecretFormatError::NotAnObject(e.to_string()))?;

    for (key, value) in payload.iter_mut() {
        let nested = match value {
            Value::String(s) if s.starts_with('{') => serde_json::from_str::<Map<String, Value>>(s)
                .map_err(|_| SecretFormatError::InvalidNested(key.clone()))?,
            _ => continue,
        };
        *value = Value::Object(nested);
    }

    Ok(payload)
}

/// Extracts a top-level string field from a parsed payload.
pub fn string_field(payload: &Map<String, Value>, field: &str) -> Result<String, SecretFormatError> {
    match payload.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(SecretFormatError::NotAString(field.to_string())),
        None => Err(SecretFormatError::MissingField(field.to_string())),
    }
}
