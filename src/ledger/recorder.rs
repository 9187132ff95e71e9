//! Event Recorder
//!
//! Builds and appends one immutable entry per call, linking it to the
//! tenant's current chain tail. Appends for a tenant are serialized by an
//! in-process lock; the `(tenant_id, sequence_number)` uniqueness
//! constraint catches writers in other processes, and those collisions are
//! retried a bounded number of times.

use chrono::TimeDelta;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::LedgerSettings;
use crate::database::queries::LedgerQueries;
use crate::database::Database;
use crate::error::LedgerError;
use crate::ledger::classifier::{self, Assessment};
use crate::ledger::entry::{
    ledger_now, ComplianceFlag, DataClassification, EntryStatus, LedgerEntry, RiskLevel,
};

pub const SECURITY_EVENT_RESOURCE_TYPE: &str = "SecurityEvent";

/// Caller-supplied content of an event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewEvent {
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<Uuid>,
    pub description: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub ip_address: Option<String>,
    pub session_id: Option<String>,
}

impl NewEvent {
    pub fn new(action: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            resource_type: resource_type.into(),
            ..Self::default()
        }
    }

    pub fn resource_id(mut self, resource_id: Uuid) -> Self {
        self.resource_id = Some(resource_id);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn change(mut self, old_value: Option<String>, new_value: Option<String>) -> Self {
        self.old_value = old_value;
        self.new_value = new_value;
        self
    }

    pub fn provenance(mut self, ip_address: Option<String>, session_id: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.session_id = session_id;
        self
    }

    fn validate(&self) -> Result<(), LedgerError> {
        if self.action.trim().is_empty() {
            return Err(LedgerError::Validation("action must not be empty".to_string()));
        }
        if self.resource_type.trim().is_empty() {
            return Err(LedgerError::Validation(
                "resource type must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

enum AttemptError {
    Retryable(sqlx::Error),
    Fatal(LedgerError),
}

impl From<LedgerError> for AttemptError {
    fn from(err: LedgerError) -> Self {
        AttemptError::Fatal(err)
    }
}

impl From<sqlx::Error> for AttemptError {
    fn from(err: sqlx::Error) -> Self {
        if is_retryable(&err) {
            AttemptError::Retryable(err)
        } else {
            AttemptError::Fatal(err.into())
        }
    }
}

/// Sequence collisions and SQLite lock contention (`SQLITE_BUSY`,
/// `SQLITE_LOCKED`, `SQLITE_BUSY_SNAPSHOT`).
fn is_retryable(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation()
                || matches!(db_err.code().as_deref(), Some("5") | Some("6") | Some("517"))
        }
        _ => false,
    }
}

#[derive(Clone)]
pub struct EventRecorder {
    db: Database,
    settings: LedgerSettings,
    tenant_locks: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl EventRecorder {
    pub fn new(db: Database, settings: LedgerSettings) -> Self {
        Self {
            db,
            settings,
            tenant_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    /// Record an event whose classification and risk derive from its resource type and action
    pub async fn record_event(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        event: NewEvent,
    ) -> Result<LedgerEntry, LedgerError> {
        let assessment = classifier::assess(&event.action, &event.resource_type);
        self.append(tenant_id, actor_id, event, assessment).await
    }

    /// Record a security event with a caller-supplied risk level.
    ///
    /// The metadata map is stored as a JSON object in `description`.
    pub async fn record_security_event(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        event_type: &str,
        risk_level: RiskLevel,
        metadata: &BTreeMap<String, String>,
    ) -> Result<LedgerEntry, LedgerError> {
        let event = NewEvent::new(event_type, SECURITY_EVENT_RESOURCE_TYPE)
            .description(serde_json::to_string(metadata)?);

        let mut assessment = classifier::assess(event_type, SECURITY_EVENT_RESOURCE_TYPE);
        assessment.risk_level = risk_level;

        self.append(tenant_id, actor_id, event, assessment).await
    }

    /// Record a read of a resource whose classification the caller already knows
    pub async fn record_data_access(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        resource_type: &str,
        resource_id: Uuid,
        action: &str,
        classification: DataClassification,
    ) -> Result<LedgerEntry, LedgerError> {
        let event = NewEvent::new(action, resource_type).resource_id(resource_id);
        let assessment = Assessment {
            classification,
            risk_level: classifier::risk_level_for(action, classification),
            compliance_flags: classifier::compliance_flags_for(classification),
        };

        self.append(tenant_id, actor_id, event, assessment).await
    }

    async fn tenant_lock(&self, tenant_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.tenant_locks.lock().await;
        locks.entry(tenant_id).or_default().clone()
    }

    async fn append(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        event: NewEvent,
        assessment: Assessment,
    ) -> Result<LedgerEntry, LedgerError> {
        if tenant_id.is_nil() {
            return Err(LedgerError::nil_tenant());
        }
        event.validate()?;

        let lock = self.tenant_lock(tenant_id).await;
        let result = {
            let _writer = lock.lock().await;
            self.append_with_retries(tenant_id, actor_id, &event, &assessment)
                .await
        };
        drop(lock);
        self.release_tenant_lock(tenant_id).await;

        result
    }

    /// Forget a tenant's lock once no append holds or waits on it
    async fn release_tenant_lock(&self, tenant_id: Uuid) {
        let mut locks = self.tenant_locks.lock().await;
        if locks
            .get(&tenant_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&tenant_id);
        }
    }

    async fn append_with_retries(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        event: &NewEvent,
        assessment: &Assessment,
    ) -> Result<LedgerEntry, LedgerError> {
        let attempts = self.settings.max_append_retries.max(1);
        for attempt in 1..=attempts {
            match self.try_append(tenant_id, actor_id, event, assessment).await {
                Ok(entry) => {
                    info!(
                        "Recorded ledger entry {} for tenant {}",
                        entry.summary(),
                        tenant_id
                    );
                    return Ok(entry);
                }
                Err(AttemptError::Retryable(err)) => {
                    warn!(
                        "Append attempt {}/{} for tenant {} conflicted: {}",
                        attempt, attempts, tenant_id, err
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(10 * attempt as u64)).await;
                }
                Err(AttemptError::Fatal(err)) => return Err(err),
            }
        }

        Err(LedgerError::Conflict {
            tenant_id,
            attempts,
        })
    }

    async fn try_append(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        event: &NewEvent,
        assessment: &Assessment,
    ) -> Result<LedgerEntry, AttemptError> {
        // Take the write lock up front so the tail read and the insert
        // see the same chain state.
        let mut tx = self.db.pool().begin_with("BEGIN IMMEDIATE").await?;

        let tail = LedgerQueries::chain_tail(&mut *tx, tenant_id).await?;
        let (sequence_number, previous_event_hash) = match tail {
            Some((sequence, hash)) => (sequence + 1, Some(hash)),
            None => (1, None),
        };

        let entry = self.build_entry(
            tenant_id,
            actor_id,
            event,
            assessment,
            sequence_number,
            previous_event_hash,
        )?;

        LedgerQueries::insert_entry(&mut *tx, &entry).await?;
        tx.commit().await?;

        debug!("Committed sequence {} for tenant {}", sequence_number, tenant_id);
        Ok(entry)
    }

    fn build_entry(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        event: &NewEvent,
        assessment: &Assessment,
        sequence_number: i64,
        previous_event_hash: Option<String>,
    ) -> Result<LedgerEntry, LedgerError> {
        let timestamp = ledger_now();
        let retention_expiry = TimeDelta::try_days(self.settings.retention_days)
            .and_then(|retention| timestamp.checked_add_signed(retention))
            .ok_or_else(|| {
                LedgerError::Validation(format!(
                    "retention of {} days is out of range",
                    self.settings.retention_days
                ))
            })?;
        let compliance_flags: BTreeSet<ComplianceFlag> = assessment.compliance_flags.clone();

        let mut entry = LedgerEntry {
            id: Uuid::new_v4(),
            tenant_id,
            actor_id,
            action: event.action.clone(),
            resource_type: event.resource_type.clone(),
            resource_id: event.resource_id,
            description: event.description.clone(),
            old_value: event.old_value.clone(),
            new_value: event.new_value.clone(),
            timestamp,
            ip_address: event.ip_address.clone(),
            session_id: event.session_id.clone(),
            sequence_number,
            previous_event_hash,
            event_hash: String::new(),
            hash_scheme: self.settings.hash_scheme,
            data_classification: assessment.classification,
            risk_level: assessment.risk_level,
            compliance_flags,
            status: EntryStatus::Active,
            retention_days: self.settings.retention_days,
            retention_expiry,
        };

        entry.event_hash = entry.calculate_hash();
        Ok(entry)
    }
}
