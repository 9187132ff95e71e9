//! Retention Manager
//!
//! Moves entries past their retention expiry from `active` to `archived`.
//! Only the status column is written; hashed fields and chain links are
//! untouched and nothing is ever deleted.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::database::queries::LedgerQueries;
use crate::database::Database;
use crate::error::LedgerError;

#[derive(Clone)]
pub struct RetentionManager {
    db: Database,
}

impl RetentionManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Archive entries older than `cutoff` whose retention has expired
    pub async fn archive_expired(&self, cutoff: DateTime<Utc>) -> Result<u64, LedgerError> {
        self.archive_expired_at(cutoff, Utc::now()).await
    }

    /// As [`archive_expired`](Self::archive_expired) with an explicit clock reading.
    ///
    /// Entries whose `retention_expiry` is not before `now` stay active no
    /// matter how late `cutoff` is.
    pub async fn archive_expired_at(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, LedgerError> {
        let mut conn = self.db.pool().acquire().await?;
        let archived = LedgerQueries::archive_expired(&mut *conn, cutoff, now).await?;

        info!(
            "Archived {} ledger entries (cutoff {}, retention checked at {})",
            archived, cutoff, now
        );
        Ok(archived)
    }
}
