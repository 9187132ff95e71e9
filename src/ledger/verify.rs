//! Chain Verification
//!
//! Recomputes entry hashes and checks link and sequence continuity.
//! Integrity violations are findings, never errors: every entry in scope
//! is inspected regardless of where the first failure occurs, and nothing
//! is repaired. A row whose columns no longer decode is itself a finding
//! and still takes part in the link checks through its raw hash columns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::models::StoredEntry;
use crate::database::queries::LedgerQueries;
use crate::database::Database;
use crate::error::LedgerError;
use crate::ledger::entry::LedgerEntry;

/// A single failed check on an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum Violation {
    /// Stored hash no longer matches the hash recomputed from stored fields.
    HashMismatch { expected: String, stored: String },
    /// `previous_event_hash` does not match the preceding entry's hash.
    ChainBreak {
        expected: Option<String>,
        found: Option<String>,
    },
    /// Sequence number does not directly follow the preceding entry.
    SequenceGap { expected: i64, found: i64 },
    /// A stored column no longer decodes, so the hash cannot be recomputed.
    Undecodable { column: String, reason: String },
}

impl Violation {
    pub fn description(&self) -> String {
        match self {
            Violation::HashMismatch { .. } => "content hash mismatch".to_string(),
            Violation::ChainBreak { .. } => "previous hash does not link to predecessor".to_string(),
            Violation::SequenceGap { expected, found } => {
                format!("sequence gap: expected {}, found {}", expected, found)
            }
            Violation::Undecodable { column, reason } => {
                format!("column {} does not decode: {}", column, reason)
            }
        }
    }
}

/// A flagged row. `entry` is absent when the row no longer decodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TamperFinding {
    pub sequence_number: Option<i64>,
    pub entry_id: Option<String>,
    pub entry: Option<LedgerEntry>,
    pub violations: Vec<Violation>,
}

impl TamperFinding {
    pub fn summary(&self) -> String {
        let checks: Vec<String> = self.violations.iter().map(Violation::description).collect();
        let position = self
            .sequence_number
            .map_or_else(|| "?".to_string(), |sequence| sequence.to_string());
        format!(
            "entry #{} ({}): {}",
            position,
            self.entry_id.as_deref().unwrap_or("unreadable id"),
            checks.join("; ")
        )
    }
}

/// Check `rows` (in chain order) against each other and against the row
/// that precedes the first of them, if any.
pub fn inspect_chain(rows: &[StoredEntry], predecessor: Option<&StoredEntry>) -> Vec<TamperFinding> {
    let mut findings = Vec::new();
    let mut previous = predecessor;

    for row in rows {
        let mut violations = Vec::new();

        match &row.entry {
            Ok(entry) => {
                let recomputed = entry.calculate_hash();
                if recomputed != entry.event_hash {
                    violations.push(Violation::HashMismatch {
                        expected: recomputed,
                        stored: entry.event_hash.clone(),
                    });
                }
            }
            Err(failure) => violations.push(Violation::Undecodable {
                column: failure.column.clone(),
                reason: failure.reason.clone(),
            }),
        }

        match previous {
            Some(prev) => {
                if row.previous_event_hash != prev.event_hash {
                    violations.push(Violation::ChainBreak {
                        expected: prev.event_hash.clone(),
                        found: row.previous_event_hash.clone(),
                    });
                }
                // An unreadable sequence number on either side leaves nothing to compare.
                if let (Some(prev_sequence), Some(sequence)) =
                    (prev.sequence_number, row.sequence_number)
                {
                    if sequence != prev_sequence + 1 {
                        violations.push(Violation::SequenceGap {
                            expected: prev_sequence + 1,
                            found: sequence,
                        });
                    }
                }
            }
            None => match row.sequence_number {
                Some(1) => {
                    if row.previous_event_hash.is_some() {
                        violations.push(Violation::ChainBreak {
                            expected: None,
                            found: row.previous_event_hash.clone(),
                        });
                    }
                }
                Some(sequence) => violations.push(Violation::SequenceGap {
                    expected: 1,
                    found: sequence,
                }),
                None => {}
            },
        }

        if !violations.is_empty() {
            findings.push(TamperFinding {
                sequence_number: row.sequence_number,
                entry_id: row.id.clone(),
                entry: row.entry.as_ref().ok().cloned(),
                violations,
            });
        }

        previous = Some(row);
    }

    findings
}

/// Verification outcome over one window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub tenant_id: Uuid,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub entries_checked: usize,
    pub first_sequence: Option<i64>,
    pub last_sequence: Option<i64>,
    pub findings: Vec<TamperFinding>,
}

impl IntegrityReport {
    pub fn is_valid(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn summary(&self) -> String {
        if self.is_valid() {
            format!("Ledger window is intact ({} entries)", self.entries_checked)
        } else {
            format!(
                "Ledger window failed verification: {} of {} entries flagged",
                self.findings.len(),
                self.entries_checked
            )
        }
    }
}

#[derive(Clone)]
pub struct ChainVerifier {
    db: Database,
}

impl ChainVerifier {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn verify_integrity(
        &self,
        tenant_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        Ok(self.verify_integrity_report(tenant_id, from, to).await?.is_valid())
    }

    /// Verify every entry whose timestamp falls in `[from, to]`.
    ///
    /// The first entry of the window is linked against its stored
    /// predecessor, so a deletion just before the window is also caught.
    pub async fn verify_integrity_report(
        &self,
        tenant_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<IntegrityReport, LedgerError> {
        if tenant_id.is_nil() {
            return Err(LedgerError::nil_tenant());
        }

        let mut tx = self.db.pool().begin().await?;
        let rows = LedgerQueries::entries_in_window(&mut *tx, tenant_id, from, to).await?;
        let predecessor = match rows.first().and_then(|first| first.sequence_number) {
            Some(first_sequence) if first_sequence > 1 => {
                LedgerQueries::predecessor_of(&mut *tx, tenant_id, first_sequence).await?
            }
            _ => None,
        };
        tx.commit().await?;

        debug!(
            "Verifying {} entries for tenant {} between {} and {}",
            rows.len(),
            tenant_id,
            from,
            to
        );

        let findings = inspect_chain(&rows, predecessor.as_ref());
        let report = IntegrityReport {
            tenant_id,
            from,
            to,
            entries_checked: rows.len(),
            first_sequence: rows.first().and_then(|row| row.sequence_number),
            last_sequence: rows.last().and_then(|row| row.sequence_number),
            findings,
        };

        if report.is_valid() {
            info!("Tenant {}: {}", tenant_id, report.summary());
        } else {
            warn!("Tenant {}: {}", tenant_id, report.summary());
        }

        Ok(report)
    }
}

#[derive(Clone)]
pub struct TamperDetector {
    db: Database,
}

impl TamperDetector {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Every entry in the tenant's full history that fails a check
    pub async fn detect_tampering(&self, tenant_id: Uuid) -> Result<Vec<TamperFinding>, LedgerError> {
        if tenant_id.is_nil() {
            return Err(LedgerError::nil_tenant());
        }

        let mut conn = self.db.pool().acquire().await?;
        let rows = LedgerQueries::all_entries(&mut *conn, tenant_id).await?;
        let findings = inspect_chain(&rows, None);

        for finding in &findings {
            warn!("Tamper finding for tenant {}: {}", tenant_id, finding.summary());
        }
        info!(
            "Scanned {} entries for tenant {}: {} flagged",
            rows.len(),
            tenant_id,
            findings.len()
        );

        Ok(findings)
    }
}
