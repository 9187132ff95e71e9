//! Service configuration
//!
//! Layered as defaults, then an optional TOML file, then `LEDGER__*`
//! environment variables.

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use tracing::info;

use crate::error::LedgerError;
use crate::ledger::entry::HashScheme;
use crate::ledger::policy::FailurePolicy;

pub const DEFAULT_CONFIG_PATH: &str = "ledger.toml";
pub const DEFAULT_RETENTION_DAYS: i64 = 2555;
pub const MAX_RETENTION_DAYS: i64 = 36_500;
pub const MAX_APPEND_RETRIES: u32 = 20;
pub const MAX_ARCHIVE_INTERVAL_HOURS: u64 = 8_760;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub ledger: LedgerSettings,
    pub retention: RetentionSchedule,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    pub retention_days: i64,
    pub max_append_retries: u32,
    pub hash_scheme: HashScheme,
    pub routine_failure_policy: FailurePolicy,
    pub security_failure_policy: FailurePolicy,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
            max_append_retries: 3,
            hash_scheme: HashScheme::Delimited,
            routine_failure_policy: FailurePolicy::FailOpen,
            security_failure_policy: FailurePolicy::FailClosed,
        }
    }
}

/// Background archival schedule run by the service binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionSchedule {
    pub enabled: bool,
    pub interval_hours: u64,
    pub archive_after_days: i64,
}

impl Default for RetentionSchedule {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_hours: 24,
            archive_after_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl AppConfig {
    /// Load configuration from `LEDGER_CONFIG` (or `ledger.toml`) and the environment
    pub fn load() -> Result<Self, LedgerError> {
        let path = env::var("LEDGER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> Result<Self, LedgerError> {
        let defaults = LedgerSettings::default();
        let schedule = RetentionSchedule::default();

        let settings = Config::builder()
            .set_default("database_url", "sqlite://audit-ledger.db")?
            .set_default("server_host", "0.0.0.0")?
            .set_default("server_port", 3000)?
            .set_default("ledger.retention_days", defaults.retention_days)?
            .set_default("ledger.max_append_retries", defaults.max_append_retries)?
            .set_default("ledger.hash_scheme", defaults.hash_scheme.as_str())?
            .set_default(
                "ledger.routine_failure_policy",
                defaults.routine_failure_policy.as_str(),
            )?
            .set_default(
                "ledger.security_failure_policy",
                defaults.security_failure_policy.as_str(),
            )?
            .set_default("retention.enabled", schedule.enabled)?
            .set_default("retention.interval_hours", schedule.interval_hours)?
            .set_default("retention.archive_after_days", schedule.archive_after_days)?
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix("LEDGER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;

        info!("Loaded configuration (source file: {:?})", path);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        self.ledger.validate()?;
        self.retention.validate()
    }
}

impl LedgerSettings {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if !(1..=MAX_RETENTION_DAYS).contains(&self.retention_days) {
            return Err(LedgerError::Config(format!(
                "ledger.retention_days must be between 1 and {}, got {}",
                MAX_RETENTION_DAYS, self.retention_days
            )));
        }

        if !(1..=MAX_APPEND_RETRIES).contains(&self.max_append_retries) {
            return Err(LedgerError::Config(format!(
                "ledger.max_append_retries must be between 1 and {}, got {}",
                MAX_APPEND_RETRIES, self.max_append_retries
            )));
        }

        Ok(())
    }
}

impl RetentionSchedule {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.enabled && !(1..=MAX_ARCHIVE_INTERVAL_HOURS).contains(&self.interval_hours) {
            return Err(LedgerError::Config(format!(
                "retention.interval_hours must be between 1 and {} when retention is enabled, got {}",
                MAX_ARCHIVE_INTERVAL_HOURS, self.interval_hours
            )));
        }

        if !(0..=MAX_RETENTION_DAYS).contains(&self.archive_after_days) {
            return Err(LedgerError::Config(format!(
                "retention.archive_after_days must be between 0 and {}, got {}",
                MAX_RETENTION_DAYS, self.archive_after_days
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_without_file() {
        let config = AppConfig::load_from(Path::new("/nonexistent/ledger.toml")).unwrap();
        assert_eq!(config.ledger.retention_days, 2555);
        assert_eq!(config.ledger.max_append_retries, 3);
        assert_eq!(config.ledger.hash_scheme, HashScheme::Delimited);
        assert_eq!(config.ledger.routine_failure_policy, FailurePolicy::FailOpen);
        assert_eq!(config.ledger.security_failure_policy, FailurePolicy::FailClosed);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
database_url = "sqlite://test.db"
server_port = 8080

[ledger]
retention_days = 3650
hash_scheme = "length_prefixed"
routine_failure_policy = "fail_closed"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.database_url, "sqlite://test.db");
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.ledger.retention_days, 3650);
        assert_eq!(config.ledger.hash_scheme, HashScheme::LengthPrefixed);
        assert_eq!(config.ledger.routine_failure_policy, FailurePolicy::FailClosed);
        assert_eq!(config.ledger.max_append_retries, 3);
    }

    #[test]
    fn test_rejects_non_positive_retention() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[ledger]\nretention_days = 0").unwrap();

        let result = AppConfig::load_from(file.path());
        assert!(matches!(result, Err(LedgerError::Config(_))));
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[ledger]\nretention_days = 9223372036854775807").unwrap();
        let result = AppConfig::load_from(file.path());
        assert!(matches!(result, Err(LedgerError::Config(_))));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[retention]\ninterval_hours = 18446744073709551615").unwrap();
        let result = AppConfig::load_from(file.path());
        assert!(result.is_err());

        let settings = LedgerSettings {
            max_append_retries: 1000,
            ..LedgerSettings::default()
        };
        assert!(settings.validate().is_err());
        assert!(LedgerSettings::default().validate().is_ok());
    }
}
