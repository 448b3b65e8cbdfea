pub mod metrics;

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LoggingConfig, MetricsConfig};
use crate::domain::{OracleError, Result};

/// Installs the global tracing subscriber. `RUST_LOG` overrides
/// `logging.level` when present; `json` switches between human-readable
/// and structured output.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);

    if config.json {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()
            .map_err(|e| OracleError::internal(format!("failed to install tracing subscriber: {e}")))?;
    } else {
        registry
            .with(fmt::layer().with_target(false))
            .try_init()
            .map_err(|e| OracleError::internal(format!("failed to install tracing subscriber: {e}")))?;
    }

    Ok(())
}

/// Installs the Prometheus exporter and serves `/metrics` on `config.bind`.
/// A no-op when metrics are disabled, so the ambient stack never costs a
/// listening socket in deployments that don't want one.
pub fn init_metrics(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        tracing::info!("metrics collection disabled");
        return Ok(());
    }

    let addr: SocketAddr = config
        .bind
        .parse()
        .map_err(|e| OracleError::config(format!("invalid metrics bind address: {e}")))?;

    tracing::info!(%addr, "installing prometheus exporter");

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| OracleError::internal(format!("failed to install prometheus exporter: {e}")))?;

    ::metrics::counter!("price_oracle_info", 1);

    Ok(())
}
