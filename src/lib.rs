pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod ledger;

pub use error::LedgerError;
pub use ledger::AuditLedger;
