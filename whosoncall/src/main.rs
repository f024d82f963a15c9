use clap::Parser;
use metrics_exporter_statsd::{StatsdBuilder, StatsdError};
use std::path::PathBuf;
use std::process::ExitCode;

mod config;
mod logging;

const METRICS_PREFIX: &str = "whosoncall";

/// Answers "who is on call?" for PagerDuty schedules over HTTP.
#[derive(Parser)]
struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, default_value = "whosoncall.yaml")]
    config: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum MetricsError {
    #[error("could not build statsd exporter: {0}")]
    Statsd(#[from] StatsdError),
    #[error("a metrics recorder is already installed")]
    AlreadyInstalled,
}

fn init_metrics(config: &config::MetricsConfig) -> Result<(), MetricsError> {
    let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
        .build(Some(METRICS_PREFIX))?;
    metrics::set_global_recorder(recorder).map_err(|_| MetricsError::AlreadyInstalled)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match config::Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {e}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };

    let _sentry = logging::init(&config.common.logging);

    if let Some(metrics_config) = &config.common.metrics
        && let Err(e) = init_metrics(metrics_config)
    {
        tracing::error!(error = %e, "Failed to set up metrics");
        return ExitCode::FAILURE;
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("Starting whosoncall");
    match rt.block_on(oncall::run(config.oncall)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Exiting");
            ExitCode::FAILURE
        }
    }
}
