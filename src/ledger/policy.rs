//! Write-failure policy for callers whose business action emits an entry.

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the business action when its audit record cannot be written.
    FailClosed,
    /// Log the storage fault and let the business action continue.
    FailOpen,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::FailClosed => "fail_closed",
            FailurePolicy::FailOpen => "fail_open",
        }
    }

    /// Apply the policy to the outcome of an append.
    ///
    /// Only storage faults are ever swallowed. Conflicts and validation
    /// errors reach the caller under either policy.
    pub fn apply<T>(&self, result: Result<T, LedgerError>) -> Result<Option<T>, LedgerError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) if *self == FailurePolicy::FailOpen && err.is_storage_fault() => {
                error!("Audit write failed, continuing under fail-open policy: {}", err);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}
