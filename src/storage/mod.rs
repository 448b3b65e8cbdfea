pub mod database;
pub mod models;
pub mod repository;

pub use database::{DatabaseConfig, DatabasePool, DatabaseType, PoolStats};
pub use repository::{
    AgentRepository, AgentServiceRepository, AlertRepository, AlertTriggerRepository,
    BudgetRepository, ForecastRepository, JoinedRateObservation, ProviderRepository,
    RateIngestRepository, RateRepository, RequestLogRepository, ServiceRepository,
    SqliteAgentRepository, SqliteAgentServiceRepository, SqliteAlertRepository,
    SqliteAlertTriggerRepository, SqliteBudgetRepository, SqliteForecastRepository,
    SqliteProviderRepository, SqliteRateIngestRepository, SqliteRateRepository,
    SqliteRequestLogRepository, SqliteServiceRepository,
};

use std::sync::Arc;

/// Bundles every repository behind the single connection pool the engine
/// is constructed with, so call sites take one handle instead of wiring
/// up each repository individually.
#[derive(Clone)]
pub struct Repositories {
    pub providers: Arc<dyn ProviderRepository>,
    pub services: Arc<dyn ServiceRepository>,
    pub rates: Arc<dyn RateRepository>,
    pub rate_ingest: Arc<dyn RateIngestRepository>,
    pub agent_services: Arc<dyn AgentServiceRepository>,
    pub agents: Arc<dyn AgentRepository>,
    pub budgets: Arc<dyn BudgetRepository>,
    pub request_log: Arc<dyn RequestLogRepository>,
    pub alerts: Arc<dyn AlertRepository>,
    pub alert_triggers: Arc<dyn AlertTriggerRepository>,
    pub forecasts: Arc<dyn ForecastRepository>,
}

impl Repositories {
    /// Build the full repository set from a sqlite-backed pool. Postgres
    /// support is exposed by [`DatabasePool`] for connection management
    /// but the repository layer currently targets sqlite only.
    pub fn from_sqlite_pool(pool: &DatabasePool) -> crate::domain::Result<Self> {
        let pool = pool.as_sqlite().ok_or_else(|| {
            crate::domain::OracleError::internal("repository layer requires a sqlite pool")
        })?;
        Ok(Self {
            providers: Arc::new(SqliteProviderRepository::new(pool.clone())),
            services: Arc::new(SqliteServiceRepository::new(pool.clone())),
            rates: Arc::new(SqliteRateRepository::new(pool.clone())),
            rate_ingest: Arc::new(SqliteRateIngestRepository::new(pool.clone())),
            agent_services: Arc::new(SqliteAgentServiceRepository::new(pool.clone())),
            agents: Arc::new(SqliteAgentRepository::new(pool.clone())),
            budgets: Arc::new(SqliteBudgetRepository::new(pool.clone())),
            request_log: Arc::new(SqliteRequestLogRepository::new(pool.clone())),
            alerts: Arc::new(SqliteAlertRepository::new(pool.clone())),
            alert_triggers: Arc::new(SqliteAlertTriggerRepository::new(pool.clone())),
            forecasts: Arc::new(SqliteForecastRepository::new(pool.clone())),
        })
    }
}
