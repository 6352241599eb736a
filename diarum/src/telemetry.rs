//! Process-wide logging, error reporting and metrics setup.
use crate::config::{CommonConfig, LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use sentry::types::Dsn;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(thiserror::Error, Debug)]
pub enum TelemetryError {
    #[error("invalid log level: {0}")]
    LogLevel(#[from] tracing_subscriber::filter::ParseError),
    #[error("could not install logger: {0}")]
    Logger(#[from] tracing_subscriber::util::TryInitError),
    #[error("invalid Sentry DSN: {0}")]
    SentryDsn(#[from] sentry::types::ParseDsnError),
    #[error("could not set up statsd exporter: {0}")]
    Statsd(#[from] metrics_exporter_statsd::StatsdError),
    #[error("a metrics recorder is already installed")]
    RecorderInstalled,
}

/// Keeps Sentry flushing until the process exits.
pub struct TelemetryGuard {
    _sentry: Option<sentry::ClientInitGuard>,
}

pub fn init(config: &CommonConfig) -> Result<TelemetryGuard, TelemetryError> {
    let sentry = match &config.logging.sentry_dsn {
        Some(dsn) => Some(sentry::init(sentry_options(dsn)?)),
        None => None,
    };

    init_logging(&config.logging, sentry.is_some())?;

    if let Some(metrics_config) = &config.metrics {
        init_metrics(metrics_config)?;
    }

    Ok(TelemetryGuard { _sentry: sentry })
}

fn sentry_options(dsn: &str) -> Result<sentry::ClientOptions, TelemetryError> {
    Ok(sentry::ClientOptions {
        dsn: Some(dsn.parse::<Dsn>()?),
        release: sentry::release_name!(),
        ..Default::default()
    })
}

fn init_logging(config: &LoggingConfig, with_sentry: bool) -> Result<(), TelemetryError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)?,
    };

    let sentry_layer = with_sentry.then(sentry::integrations::tracing::layer);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(sentry_layer)
        .try_init()?;

    Ok(())
}

fn init_metrics(config: &MetricsConfig) -> Result<(), TelemetryError> {
    let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
        .build(Some(config.prefix.as_str()))?;
    metrics::set_global_recorder(recorder).map_err(|_| TelemetryError::RecorderInstalled)?;

    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "Sending metrics to statsd"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentry_dsn_validation() {
        let options = sentry_options("https://public@sentry.example.com/1").unwrap();
        assert_eq!(
            options.dsn.unwrap().host(),
            "sentry.example.com"
        );

        assert!(matches!(
            sentry_options("not a dsn"),
            Err(TelemetryError::SentryDsn(_))
        ));
    }
}
