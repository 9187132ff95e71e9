//! Offline ledger verification
//!
//! Verifies a tenant's hash chain directly against the ledger database and
//! lists every entry that fails a check.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use std::collections::BTreeMap;
use tracing::{error, info, warn};
use uuid::Uuid;

use audit_ledger::config::LedgerSettings;
use audit_ledger::database::Database;
use audit_ledger::ledger::{AuditLedger, LedgerEntry};

#[derive(Parser)]
#[command(name = "verify-ledger")]
#[command(about = "Verify audit ledger hash chain integrity for a tenant")]
struct Cli {
    /// Ledger database URL
    #[arg(short, long, default_value = "sqlite://audit-ledger.db")]
    database_url: String,

    /// Tenant whose chain to verify
    #[arg(short, long)]
    tenant: Uuid,

    /// Start of the verification window (RFC 3339); defaults to the full history
    #[arg(long)]
    from: Option<DateTime<Utc>>,

    /// End of the verification window (RFC 3339); defaults to now
    #[arg(long)]
    to: Option<DateTime<Utc>>,

    /// Print chain statistics
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    match verify(&cli).await {
        Ok(()) => {
            println!("✓ Ledger verification completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Ledger verification failed: {}", e);
            std::process::exit(1);
        }
    }
}

async fn verify(cli: &Cli) -> Result<()> {
    let database = Database::open_read_only(&cli.database_url).await?;
    let ledger = AuditLedger::new(database, LedgerSettings::default());

    let findings = match (cli.from, cli.to) {
        (None, None) => {
            info!("Scanning full history for tenant {}", cli.tenant);
            ledger.detect_tampering(cli.tenant).await?
        }
        (from, to) => {
            let from = from.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
            let to = to.unwrap_or_else(Utc::now);
            let report = ledger.verify_integrity_report(cli.tenant, from, to).await?;
            println!("{}", report.summary());
            report.findings
        }
    };

    if cli.verbose {
        match ledger.get_entries(cli.tenant, &Default::default()).await {
            Ok(entries) => print_statistics(&entries),
            Err(e) => warn!("Statistics unavailable: {}", e),
        }
    }

    if findings.is_empty() {
        return Ok(());
    }

    println!("Found {} tampered entries:", findings.len());
    for finding in &findings {
        println!("  ✗ {}", finding.summary());
    }

    Err(anyhow!(
        "{} entries failed verification for tenant {}",
        findings.len(),
        cli.tenant
    ))
}

fn print_statistics(entries: &[LedgerEntry]) {
    println!("\nLedger Summary:");
    println!("  Total entries: {}", entries.len());

    if let (Some(first), Some(last)) = (entries.first(), entries.last()) {
        println!("  First entry: #{} at {}", first.sequence_number, first.timestamp);
        println!("  Last entry: #{} at {}", last.sequence_number, last.timestamp);
        println!("  Head hash: {}", last.event_hash);
    }

    let archived = entries.iter().filter(|e| e.is_archived()).count();
    println!("  Archived: {}", archived);

    let mut by_risk: BTreeMap<&str, usize> = BTreeMap::new();
    for entry in entries {
        *by_risk.entry(entry.risk_level.as_str()).or_insert(0) += 1;
    }

    println!("\nRisk distribution:");
    for (risk, count) in by_risk {
        println!("  {}: {}", risk, count);
    }
}
