use thiserror::Error;

pub type Result<T> = std::result::Result<T, OracleError>;

/// Error taxonomy for the engine.
///
/// Each variant maps to an HTTP status at the `api` boundary via
/// `api::error::ApiError`; leaf operations (store helpers, HTTP fetches)
/// return these directly, while crawl cycles, alert passes, and forecast
/// passes catch per-unit failures and accumulate them instead of bubbling up.
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("cross-agent access denied: {0}")]
    Forbidden(String),

    #[error("dependency unavailable: {0}")]
    Unavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl OracleError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        OracleError::Validation(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        OracleError::NotFound(msg.into())
    }

    pub fn budget_exceeded<S: Into<String>>(msg: S) -> Self {
        OracleError::BudgetExceeded(msg.into())
    }

    pub fn forbidden<S: Into<String>>(msg: S) -> Self {
        OracleError::Forbidden(msg.into())
    }

    pub fn unavailable<S: Into<String>>(msg: S) -> Self {
        OracleError::Unavailable(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        OracleError::Config(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        OracleError::Internal(msg.into())
    }
}
