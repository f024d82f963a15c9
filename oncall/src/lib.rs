pub mod api;
pub mod config;
pub mod credentials;
pub mod memoize;
pub mod metrics_defs;
pub mod pagerduty;
pub mod resolver;
pub mod schedule;
pub mod secrets;

#[cfg(test)]
mod testutils;

use api::{Handler, OnCallService, ServiceError};
use config::{Config, CredentialConfig, ValidationError};
use credentials::{CredentialResolver, CredentialSource};
use pagerduty::{ApiError, PagerDutyConnector};
use resolver::OnCallResolver;
use secrets::AwsSecretsManager;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ValidationError),
    #[error("required environment variable {0} is not set")]
    MissingEnvironment(String),
    #[error("PagerDuty client error: {0}")]
    PagerDuty(#[from] ApiError),
    #[error("service error: {0}")]
    Service(#[from] ServiceError),
}

/// Serves on-call queries and the admin endpoints until either listener fails.
///
/// The credential env var is checked up front so a misconfigured process
/// never starts serving.
pub async fn run(config: Config) -> Result<(), RunError> {
    config.validate()?;

    let env = config.credential.env();
    if std::env::var_os(env).is_none() {
        return Err(RunError::MissingEnvironment(env.to_string()));
    }

    shared::metrics_defs::describe_all(metrics_defs::ALL_METRICS);

    let handler = Arc::new(build_handler(&config).await?);

    let oncall_task = run_http_service(
        &config.listener.host,
        config.listener.port,
        OnCallService::new(handler),
    );
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        AdminService::<_, ServiceError>::new(|| true),
    );

    tokio::try_join!(oncall_task, admin_task)?;
    Ok(())
}

/// Wires the resolvers and the PagerDuty client together according to `config`.
pub async fn build_handler(config: &Config) -> Result<Handler, RunError> {
    let connector = PagerDutyConnector::new(&config.pagerduty.base_url, config.pagerduty.timeout())?;

    let source = match &config.credential {
        CredentialConfig::SecretsManager { env, field } => CredentialSource::SecretStore {
            env: env.clone(),
            field: field.clone(),
            store: Arc::new(AwsSecretsManager::from_env().await),
        },
        CredentialConfig::Environment { env } => CredentialSource::Environment { env: env.clone() },
    };

    let credentials = CredentialResolver::new(
        source,
        Arc::new(connector),
        config.credential_cache.freshness(),
        config.credential_cache.expiry(),
    );
    let resolver = OnCallResolver::new(credentials, config.cache.freshness(), config.cache.expiry());

    Ok(Handler::new(resolver))
}
