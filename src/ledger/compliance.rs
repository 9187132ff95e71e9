//! Compliance Reporting
//!
//! Aggregates a tenant's entries for one compliance regime into named
//! counters. Read-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::queries::LedgerQueries;
use crate::database::Database;
use crate::error::LedgerError;
use crate::ledger::entry::{DataClassification, LedgerEntry};
use crate::ledger::recorder::SECURITY_EVENT_RESOURCE_TYPE;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub compliance_tag: String,
    pub total_events: u64,
    pub data_access_events: u64,
    pub data_modification_events: u64,
    pub security_events: u64,
    pub high_risk_events: u64,
    pub phi_access: u64,
    pub permission_changes: u64,
    pub configuration_changes: u64,
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

impl ComplianceReport {
    /// Count the entries carrying `compliance_tag`; others are ignored
    pub fn from_entries<'a>(
        compliance_tag: &str,
        entries: impl IntoIterator<Item = &'a LedgerEntry>,
    ) -> Self {
        let mut report = ComplianceReport {
            compliance_tag: compliance_tag.to_string(),
            ..Self::default()
        };

        let tagged = entries.into_iter().filter(|entry| {
            entry
                .compliance_flags
                .iter()
                .any(|flag| flag.as_str() == compliance_tag)
        });

        for entry in tagged {
            report.total_events += 1;

            if contains_any(&entry.action, &["View", "Read"]) {
                report.data_access_events += 1;
            }
            if contains_any(&entry.action, &["Create", "Update", "Delete"]) {
                report.data_modification_events += 1;
            }
            if entry.resource_type == SECURITY_EVENT_RESOURCE_TYPE {
                report.security_events += 1;
            }
            if entry.risk_level.is_high_risk() {
                report.high_risk_events += 1;
            }
            if entry.data_classification == DataClassification::Phi {
                report.phi_access += 1;
            }
            if entry.action == "PermissionChange" || entry.resource_type.contains("Permission") {
                report.permission_changes += 1;
            }
            if entry.resource_type.contains("Configuration") {
                report.configuration_changes += 1;
            }
        }

        report
    }

    pub fn counters(&self) -> BTreeMap<String, u64> {
        [
            ("TotalEvents", self.total_events),
            ("DataAccessEvents", self.data_access_events),
            ("DataModificationEvents", self.data_modification_events),
            ("SecurityEvents", self.security_events),
            ("HighRiskEvents", self.high_risk_events),
            ("PHIAccess", self.phi_access),
            ("PermissionChanges", self.permission_changes),
            ("ConfigurationChanges", self.configuration_changes),
        ]
        .into_iter()
        .map(|(name, count)| (name.to_string(), count))
        .collect()
    }
}

#[derive(Clone)]
pub struct ComplianceReporter {
    db: Database,
}

impl ComplianceReporter {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn generate_report(
        &self,
        tenant_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        compliance_tag: &str,
    ) -> Result<ComplianceReport, LedgerError> {
        if tenant_id.is_nil() {
            return Err(LedgerError::nil_tenant());
        }

        let mut conn = self.db.pool().acquire().await?;
        let rows = LedgerQueries::entries_in_window(&mut *conn, tenant_id, start, end).await?;

        // Undecodable rows are a tampering concern; they carry no countable fields.
        let entries: Vec<LedgerEntry> = rows
            .into_iter()
            .filter_map(|row| match row.entry {
                Ok(entry) => Some(entry),
                Err(failure) => {
                    warn!(
                        "Skipping undecodable entry {:?} for tenant {} in {} report: {} ({})",
                        row.sequence_number, tenant_id, compliance_tag, failure.column, failure.reason
                    );
                    None
                }
            })
            .collect();
        let report = ComplianceReport::from_entries(compliance_tag, &entries);

        info!(
            "{} report for tenant {}: {} of {} entries in scope",
            compliance_tag,
            tenant_id,
            report.total_events,
            entries.len()
        );
        Ok(report)
    }
}
