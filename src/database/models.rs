use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite};
use std::collections::BTreeSet;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::LedgerError;
use crate::ledger::entry::{parse_timestamp, ComplianceFlag, LedgerEntry};

/// Optional filters for listing a tenant's entries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryFilter {
    pub actor_id: Option<Uuid>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

pub(crate) const ENTRY_COLUMNS: &str = "id, tenant_id, actor_id, action, resource_type, resource_id, \
     description, old_value, new_value, timestamp, ip_address, session_id, sequence_number, \
     previous_event_hash, event_hash, hash_scheme, data_classification, risk_level, \
     compliance_flags, status, retention_days, retention_expiry";

/// A column that no longer decodes into its ledger type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeFailure {
    pub column: String,
    pub reason: String,
}

impl DecodeFailure {
    fn new(column: &str, reason: impl std::fmt::Display) -> Self {
        DecodeFailure {
            column: column.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<DecodeFailure> for LedgerError {
    fn from(failure: DecodeFailure) -> Self {
        LedgerError::Corrupt(format!("invalid {}: {}", failure.column, failure.reason))
    }
}

/// A stored row as the verifier sees it.
///
/// The link columns are read as raw values, so a row whose other columns
/// fail to decode still holds its place in the chain.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub id: Option<String>,
    pub sequence_number: Option<i64>,
    pub previous_event_hash: Option<String>,
    pub event_hash: Option<String>,
    pub entry: Result<LedgerEntry, DecodeFailure>,
}

impl From<LedgerEntry> for StoredEntry {
    fn from(entry: LedgerEntry) -> Self {
        StoredEntry {
            id: Some(entry.id.to_string()),
            sequence_number: Some(entry.sequence_number),
            previous_event_hash: entry.previous_event_hash.clone(),
            event_hash: Some(entry.event_hash.clone()),
            entry: Ok(entry),
        }
    }
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, DecodeFailure>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name).map_err(|e| DecodeFailure::new(name, e))
}

/// Column text without a storage-type check; unreadable values become `None`
fn raw_text(row: &SqliteRow, name: &str) -> Option<String> {
    row.try_get_unchecked::<Option<String>, _>(name).ok().flatten()
}

fn parse_uuid(name: &str, value: &str) -> Result<Uuid, DecodeFailure> {
    Uuid::parse_str(value).map_err(|e| DecodeFailure::new(name, format!("{:?}: {}", value, e)))
}

fn parse_column<T>(name: &str, value: &str) -> Result<T, DecodeFailure>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e| DecodeFailure::new(name, e))
}

fn parse_time(name: &str, value: &str) -> Result<DateTime<Utc>, DecodeFailure> {
    parse_timestamp(value).map_err(|e| DecodeFailure::new(name, e))
}

fn decode_entry(row: &SqliteRow) -> Result<LedgerEntry, DecodeFailure> {
    let id: String = column(row, "id")?;
    let tenant_id: String = column(row, "tenant_id")?;
    let actor_id: String = column(row, "actor_id")?;
    let resource_id: Option<String> = column(row, "resource_id")?;
    let timestamp: String = column(row, "timestamp")?;
    let hash_scheme: String = column(row, "hash_scheme")?;
    let data_classification: String = column(row, "data_classification")?;
    let risk_level: String = column(row, "risk_level")?;
    let compliance_flags: String = column(row, "compliance_flags")?;
    let status: String = column(row, "status")?;
    let retention_expiry: String = column(row, "retention_expiry")?;

    let compliance_flags: BTreeSet<ComplianceFlag> = serde_json::from_str(&compliance_flags)
        .map_err(|e| DecodeFailure::new("compliance_flags", e))?;

    Ok(LedgerEntry {
        id: parse_uuid("id", &id)?,
        tenant_id: parse_uuid("tenant_id", &tenant_id)?,
        actor_id: parse_uuid("actor_id", &actor_id)?,
        action: column(row, "action")?,
        resource_type: column(row, "resource_type")?,
        resource_id: resource_id
            .as_deref()
            .map(|value| parse_uuid("resource_id", value))
            .transpose()?,
        description: column(row, "description")?,
        old_value: column(row, "old_value")?,
        new_value: column(row, "new_value")?,
        timestamp: parse_time("timestamp", &timestamp)?,
        ip_address: column(row, "ip_address")?,
        session_id: column(row, "session_id")?,
        sequence_number: column(row, "sequence_number")?,
        previous_event_hash: column(row, "previous_event_hash")?,
        event_hash: column(row, "event_hash")?,
        hash_scheme: parse_column("hash_scheme", &hash_scheme)?,
        data_classification: parse_column("data_classification", &data_classification)?,
        risk_level: parse_column("risk_level", &risk_level)?,
        compliance_flags,
        status: parse_column("status", &status)?,
        retention_days: column(row, "retention_days")?,
        retention_expiry: parse_time("retention_expiry", &retention_expiry)?,
    })
}

pub(crate) fn entry_from_row(row: &SqliteRow) -> Result<LedgerEntry, LedgerError> {
    Ok(decode_entry(row)?)
}

/// Never fails: decode problems are carried in `StoredEntry::entry`
pub(crate) fn stored_entry_from_row(row: &SqliteRow) -> StoredEntry {
    StoredEntry {
        id: raw_text(row, "id"),
        sequence_number: row.try_get("sequence_number").ok(),
        previous_event_hash: raw_text(row, "previous_event_hash"),
        event_hash: raw_text(row, "event_hash"),
        entry: decode_entry(row),
    }
}
