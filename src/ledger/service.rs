//! Audit Ledger
//!
//! The surface collaborators call into: recording, querying, verification,
//! tamper detection, compliance reporting and retention.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::config::LedgerSettings;
use crate::database::models::EntryFilter;
use crate::database::queries::LedgerQueries;
use crate::database::Database;
use crate::error::LedgerError;
use crate::ledger::compliance::{ComplianceReport, ComplianceReporter};
use crate::ledger::entry::{DataClassification, LedgerEntry, RiskLevel};
use crate::ledger::recorder::{EventRecorder, NewEvent};
use crate::ledger::retention::RetentionManager;
use crate::ledger::verify::{ChainVerifier, IntegrityReport, TamperDetector, TamperFinding};

#[derive(Clone)]
pub struct AuditLedger {
    db: Database,
    recorder: EventRecorder,
    verifier: ChainVerifier,
    detector: TamperDetector,
    retention: RetentionManager,
    reporter: ComplianceReporter,
}

impl AuditLedger {
    pub fn new(db: Database, settings: LedgerSettings) -> Self {
        Self {
            recorder: EventRecorder::new(db.clone(), settings),
            verifier: ChainVerifier::new(db.clone()),
            detector: TamperDetector::new(db.clone()),
            retention: RetentionManager::new(db.clone()),
            reporter: ComplianceReporter::new(db.clone()),
            db,
        }
    }

    pub fn settings(&self) -> &LedgerSettings {
        self.recorder.settings()
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn record_event(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        event: NewEvent,
    ) -> Result<LedgerEntry, LedgerError> {
        self.recorder.record_event(tenant_id, actor_id, event).await
    }

    pub async fn record_security_event(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        event_type: &str,
        risk_level: RiskLevel,
        metadata: &BTreeMap<String, String>,
    ) -> Result<LedgerEntry, LedgerError> {
        self.recorder
            .record_security_event(tenant_id, actor_id, event_type, risk_level, metadata)
            .await
    }

    pub async fn record_data_access(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        resource_type: &str,
        resource_id: Uuid,
        action: &str,
        classification: DataClassification,
    ) -> Result<LedgerEntry, LedgerError> {
        self.recorder
            .record_data_access(tenant_id, actor_id, resource_type, resource_id, action, classification)
            .await
    }

    /// Record a routine event under the configured routine failure policy.
    ///
    /// Returns `Ok(None)` when a storage fault was logged and swallowed.
    pub async fn audit_event(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        event: NewEvent,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        let result = self.record_event(tenant_id, actor_id, event).await;
        self.settings().routine_failure_policy.apply(result)
    }

    /// Record a security event under the configured security failure policy
    pub async fn audit_security_event(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        event_type: &str,
        risk_level: RiskLevel,
        metadata: &BTreeMap<String, String>,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        let result = self
            .record_security_event(tenant_id, actor_id, event_type, risk_level, metadata)
            .await;
        self.settings().security_failure_policy.apply(result)
    }

    pub async fn audit_data_access(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        resource_type: &str,
        resource_id: Uuid,
        action: &str,
        classification: DataClassification,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        let result = self
            .record_data_access(tenant_id, actor_id, resource_type, resource_id, action, classification)
            .await;
        self.settings().routine_failure_policy.apply(result)
    }

    pub async fn get_entries(
        &self,
        tenant_id: Uuid,
        filter: &EntryFilter,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        if tenant_id.is_nil() {
            return Err(LedgerError::nil_tenant());
        }
        let mut conn = self.db.pool().acquire().await?;
        LedgerQueries::filtered_entries(&mut *conn, tenant_id, filter).await
    }

    pub async fn verify_integrity(
        &self,
        tenant_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        self.verifier.verify_integrity(tenant_id, from, to).await
    }

    pub async fn verify_integrity_report(
        &self,
        tenant_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<IntegrityReport, LedgerError> {
        self.verifier.verify_integrity_report(tenant_id, from, to).await
    }

    pub async fn detect_tampering(&self, tenant_id: Uuid) -> Result<Vec<TamperFinding>, LedgerError> {
        self.detector.detect_tampering(tenant_id).await
    }

    pub async fn generate_compliance_report(
        &self,
        tenant_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        compliance_tag: &str,
    ) -> Result<BTreeMap<String, u64>, LedgerError> {
        Ok(self
            .compliance_report(tenant_id, from, to, compliance_tag)
            .await?
            .counters())
    }

    pub async fn compliance_report(
        &self,
        tenant_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        compliance_tag: &str,
    ) -> Result<ComplianceReport, LedgerError> {
        self.reporter
            .generate_report(tenant_id, from, to, compliance_tag)
            .await
    }

    pub async fn archive_expired(&self, cutoff: DateTime<Utc>) -> Result<u64, LedgerError> {
        self.retention.archive_expired(cutoff).await
    }

    pub async fn archive_expired_at(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, LedgerError> {
        self.retention.archive_expired_at(cutoff, now).await
    }

    pub async fn entry_count(&self) -> Result<i64, LedgerError> {
        let mut conn = self.db.pool().acquire().await?;
        LedgerQueries::count_entries(&mut *conn).await
    }
}
