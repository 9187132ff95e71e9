#![allow(dead_code)]

use audit_ledger::config::LedgerSettings;
use audit_ledger::database::Database;
use audit_ledger::ledger::{AuditLedger, NewEvent};
use uuid::Uuid;

/// Ledger over a fresh in-memory database
pub async fn setup_ledger() -> AuditLedger {
    setup_ledger_with(LedgerSettings::default()).await
}

pub async fn setup_ledger_with(settings: LedgerSettings) -> AuditLedger {
    let db = Database::new_in_memory()
        .await
        .expect("Failed to create test database");
    AuditLedger::new(db, settings)
}

/// Append `actions` for one tenant against a single resource type
pub async fn record_actions(
    ledger: &AuditLedger,
    tenant_id: Uuid,
    resource_type: &str,
    actions: &[&str],
) {
    let actor = Uuid::new_v4();
    for action in actions {
        ledger
            .record_event(
                tenant_id,
                actor,
                NewEvent::new(*action, resource_type).resource_id(Uuid::new_v4()),
            )
            .await
            .expect("Failed to record event");
    }
}

/// Drop the storage-level append-only triggers, as an attacker with raw
/// database access would.
pub async fn drop_append_only_guards(db: &Database) {
    for trigger in [
        "ledger_entries_no_delete",
        "ledger_entries_status_only",
        "ledger_entries_no_unarchive",
    ] {
        sqlx::query(&format!("DROP TRIGGER IF EXISTS {}", trigger))
            .execute(db.pool())
            .await
            .expect("Failed to drop trigger");
    }
}

/// Run a statement binding `(tenant_id, sequence_number)`
pub async fn execute(db: &Database, sql: &str, tenant_id: Uuid, sequence_number: i64) {
    sqlx::query(sql)
        .bind(tenant_id.to_string())
        .bind(sequence_number)
        .execute(db.pool())
        .await
        .expect("Failed to execute tampering statement");
}
