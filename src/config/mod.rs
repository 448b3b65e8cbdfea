use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{OracleError, Result};
use crate::storage::{DatabaseConfig, DatabaseType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseSettings,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
    pub smtp: Option<SmtpConfig>,
    pub schedules: ScheduleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    #[serde(default)]
    pub postgres: bool,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

impl DatabaseSettings {
    pub fn to_database_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            database_type: if self.postgres {
                #[cfg(feature = "postgres")]
                {
                    DatabaseType::Postgres
                }
                #[cfg(not(feature = "postgres"))]
                {
                    DatabaseType::Sqlite
                }
            } else {
                DatabaseType::Sqlite
            },
            url: self.url.clone(),
            max_connections: self.pool_size,
            run_migrations: self.run_migrations,
            ..DatabaseConfig::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_bind")]
    pub bind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_crawl_cron")]
    pub crawl_cron: String,
    #[serde(default = "default_alert_cron")]
    pub alert_check_cron: String,
    #[serde(default = "default_forecast_cron")]
    pub forecast_cron: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_pool_size() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_bind() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Price Oracle".to_string()
}

fn default_crawl_cron() -> String {
    "0 */5 * * * *".to_string()
}

fn default_alert_cron() -> String {
    "0 */5 * * * *".to_string()
}

fn default_forecast_cron() -> String {
    "0 0 2 * * *".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseSettings {
                url: "sqlite://price-oracle.db".to_string(),
                postgres: false,
                pool_size: default_pool_size(),
                run_migrations: true,
            },
            api: ApiConfig {
                bind: default_bind(),
                port: default_port(),
            },
            logging: LoggingConfig {
                level: default_log_level(),
                json: false,
            },
            metrics: MetricsConfig {
                enabled: false,
                bind: default_metrics_bind(),
            },
            smtp: None,
            schedules: ScheduleConfig {
                crawl_cron: default_crawl_cron(),
                alert_check_cron: default_alert_cron(),
                forecast_cron: default_forecast_cron(),
                timezone: default_timezone(),
            },
        }
    }
}

impl Config {
    /// Layers defaults, an optional TOML file, then `ORACLE_`-prefixed
    /// environment overrides (e.g. `ORACLE_DATABASE__URL`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            if path.exists() {
                builder = builder.add_source(config::File::from(path));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("ORACLE")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| OracleError::config(format!("failed to load configuration: {e}")))
    }

    pub fn sqlite_memory() -> Self {
        let mut config = Self::default();
        config.database.url = "sqlite::memory:".to_string();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let config = Config::default();
        assert_eq!(config.database.pool_size, 10);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.api.port, 8080);
    }

    #[test]
    fn sqlite_memory_overrides_url_only() {
        let config = Config::sqlite_memory();
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.api.port, 8080);
    }
}
