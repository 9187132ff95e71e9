use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use uuid::Uuid;

use crate::database::models::{
    entry_from_row, stored_entry_from_row, EntryFilter, StoredEntry, ENTRY_COLUMNS,
};
use crate::error::LedgerError;
use crate::ledger::entry::{format_timestamp, LedgerEntry};

pub struct LedgerQueries;

/// Stored timestamps carry microseconds, so a lower bound that falls
/// between two microseconds starts at the later one.
fn lower_bound(from: &DateTime<Utc>) -> String {
    let truncated = from.trunc_subsecs(6);
    let bound = if truncated < *from {
        truncated
            .checked_add_signed(TimeDelta::microseconds(1))
            .unwrap_or(truncated)
    } else {
        truncated
    };
    format_timestamp(&bound)
}

impl LedgerQueries {
    /// Sequence number and hash of the tenant's newest entry
    pub async fn chain_tail(
        conn: &mut SqliteConnection,
        tenant_id: Uuid,
    ) -> Result<Option<(i64, String)>, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT sequence_number, event_hash
            FROM ledger_entries
            WHERE tenant_id = ?
            ORDER BY sequence_number DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Ok(Some((row.try_get("sequence_number")?, row.try_get("event_hash")?))),
            None => Ok(None),
        }
    }

    pub async fn insert_entry(
        conn: &mut SqliteConnection,
        entry: &LedgerEntry,
    ) -> Result<(), sqlx::Error> {
        let compliance_flags = serde_json::to_string(&entry.compliance_flags)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

        sqlx::query(
            r#"
            INSERT INTO ledger_entries
            (id, tenant_id, actor_id, action, resource_type, resource_id, description,
             old_value, new_value, timestamp, ip_address, session_id, sequence_number,
             previous_event_hash, event_hash, hash_scheme, data_classification, risk_level,
             compliance_flags, status, retention_days, retention_expiry)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.tenant_id.to_string())
        .bind(entry.actor_id.to_string())
        .bind(&entry.action)
        .bind(&entry.resource_type)
        .bind(entry.resource_id.map(|id| id.to_string()))
        .bind(&entry.description)
        .bind(&entry.old_value)
        .bind(&entry.new_value)
        .bind(format_timestamp(&entry.timestamp))
        .bind(&entry.ip_address)
        .bind(&entry.session_id)
        .bind(entry.sequence_number)
        .bind(&entry.previous_event_hash)
        .bind(&entry.event_hash)
        .bind(entry.hash_scheme.as_str())
        .bind(entry.data_classification.as_str())
        .bind(entry.risk_level.as_str())
        .bind(compliance_flags)
        .bind(entry.status.as_str())
        .bind(entry.retention_days)
        .bind(format_timestamp(&entry.retention_expiry))
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Entries with `from <= timestamp <= to`, in chain order
    pub async fn entries_in_window(
        conn: &mut SqliteConnection,
        tenant_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredEntry>, LedgerError> {
        let sql = format!(
            "SELECT {} FROM ledger_entries \
             WHERE tenant_id = ? AND timestamp >= ? AND timestamp <= ? \
             ORDER BY sequence_number ASC",
            ENTRY_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .bind(tenant_id.to_string())
            .bind(lower_bound(&from))
            .bind(format_timestamp(&to))
            .fetch_all(&mut *conn)
            .await?;

        Ok(rows.iter().map(stored_entry_from_row).collect())
    }

    pub async fn all_entries(
        conn: &mut SqliteConnection,
        tenant_id: Uuid,
    ) -> Result<Vec<StoredEntry>, LedgerError> {
        let sql = format!(
            "SELECT {} FROM ledger_entries WHERE tenant_id = ? ORDER BY sequence_number ASC",
            ENTRY_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .bind(tenant_id.to_string())
            .fetch_all(&mut *conn)
            .await?;

        Ok(rows.iter().map(stored_entry_from_row).collect())
    }

    /// Closest surviving entry before `sequence_number`
    pub async fn predecessor_of(
        conn: &mut SqliteConnection,
        tenant_id: Uuid,
        sequence_number: i64,
    ) -> Result<Option<StoredEntry>, LedgerError> {
        let sql = format!(
            "SELECT {} FROM ledger_entries \
             WHERE tenant_id = ? AND sequence_number < ? \
             ORDER BY sequence_number DESC LIMIT 1",
            ENTRY_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(tenant_id.to_string())
            .bind(sequence_number)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(row.as_ref().map(stored_entry_from_row))
    }

    pub async fn filtered_entries(
        conn: &mut SqliteConnection,
        tenant_id: Uuid,
        filter: &EntryFilter,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM ledger_entries WHERE tenant_id = ", ENTRY_COLUMNS));
        builder.push_bind(tenant_id.to_string());

        if let Some(actor_id) = filter.actor_id {
            builder.push(" AND actor_id = ").push_bind(actor_id.to_string());
        }
        if let Some(action) = &filter.action {
            builder.push(" AND action = ").push_bind(action.clone());
        }
        if let Some(resource_type) = &filter.resource_type {
            builder.push(" AND resource_type = ").push_bind(resource_type.clone());
        }
        if let Some(from) = &filter.from {
            builder.push(" AND timestamp >= ").push_bind(lower_bound(from));
        }
        if let Some(to) = &filter.to {
            builder.push(" AND timestamp <= ").push_bind(format_timestamp(to));
        }

        builder.push(" ORDER BY sequence_number ASC");

        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ").push_bind(limit);
        }

        let rows = builder.build().fetch_all(&mut *conn).await?;
        rows.iter().map(entry_from_row).collect()
    }

    /// Flip eligible active entries to archived; returns the number changed
    pub async fn archive_expired(
        conn: &mut SqliteConnection,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE ledger_entries
            SET status = 'archived'
            WHERE status = 'active' AND timestamp < ? AND retention_expiry < ?
            "#,
        )
        .bind(format_timestamp(&cutoff))
        .bind(format_timestamp(&now))
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn count_entries(conn: &mut SqliteConnection) -> Result<i64, LedgerError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM ledger_entries")
            .fetch_one(&mut *conn)
            .await?;
        Ok(row.try_get("total")?)
    }
}
