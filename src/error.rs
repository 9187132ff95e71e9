use thiserror::Error;
use uuid::Uuid;

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(format!("JSON serialization error: {}", err))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(format!("Database error: {}", err))
    }
}

impl From<sqlx::migrate::MigrateError> for LedgerError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Database(format!("Migration error: {}", err))
    }
}

impl From<config::ConfigError> for LedgerError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Append conflict for tenant {tenant_id} after {attempts} attempts")]
    Conflict { tenant_id: Uuid, attempts: u32 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A stored row could not be decoded back into a ledger entry.
    #[error("Corrupt ledger row: {0}")]
    Corrupt(String),
}

impl LedgerError {
    pub fn nil_tenant() -> Self {
        Self::Validation("tenant id must be supplied explicitly and cannot be nil".to_string())
    }

    /// Storage faults are the only errors a fail-open caller may swallow.
    pub fn is_storage_fault(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Corrupt(_))
    }
}

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;
