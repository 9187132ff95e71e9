//! Audit Ledger
//!
//! Tamper-evident, per-tenant hash-chained record of security and
//! compliance relevant actions.

pub mod classifier;
pub mod compliance;
pub mod entry;
pub mod policy;
pub mod recorder;
pub mod retention;
pub mod service;
pub mod verify;

pub use compliance::{ComplianceReport, ComplianceReporter};
pub use entry::{
    ComplianceFlag, DataClassification, EntryStatus, HashScheme, LedgerEntry, RiskLevel,
};
pub use policy::FailurePolicy;
pub use recorder::{EventRecorder, NewEvent, SECURITY_EVENT_RESOURCE_TYPE};
pub use retention::RetentionManager;
pub use service::AuditLedger;
pub use verify::{inspect_chain, ChainVerifier, IntegrityReport, TamperDetector, TamperFinding, Violation};
