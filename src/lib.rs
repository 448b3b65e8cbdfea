//! Price Oracle — rate-fusion, alerting, comparison, and forecasting
//! backend for an AI-agent price marketplace.

pub mod alerts;
pub mod api;
pub mod cli;
pub mod compare;
pub mod config;
pub mod crawl;
pub mod domain;
pub mod engine;
pub mod forecast;
pub mod notify;
pub mod observability;
pub mod scheduler;
pub mod storage;
pub mod ws;

pub use config::Config;
pub use domain::{OracleError, Result};
pub use engine::Engine;

/// Library version, taken from the crate's own `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Installs the global tracing subscriber from `config.logging` and the
/// Prometheus exporter from `config.metrics`. Call once at process start.
pub fn init(config: &Config) -> Result<()> {
    observability::init_tracing(&config.logging)?;
    observability::init_metrics(&config.metrics)?;
    Ok(())
}
