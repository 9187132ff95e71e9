use anyhow::anyhow;
use chrono::{TimeDelta, Utc};
use std::net::SocketAddr;
use tokio::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audit_ledger::api;
use audit_ledger::config::AppConfig;
use audit_ledger::database::Database;
use audit_ledger::ledger::AuditLedger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audit_ledger=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting audit ledger service");

    let config = AppConfig::load()?;
    info!("Configuration loaded");

    let database = Database::new(&config.database_url).await?;
    database.run_migrations().await?;
    info!("Database migrations completed");

    let ledger = AuditLedger::new(database, config.ledger.clone());

    // Retention archival task
    if config.retention.enabled {
        let archiver = ledger.clone();
        let archive_after = TimeDelta::try_days(config.retention.archive_after_days)
            .ok_or_else(|| anyhow!("retention.archive_after_days is out of range"))?;
        let interval_period = config
            .retention
            .interval_hours
            .checked_mul(3600)
            .map(Duration::from_secs)
            .ok_or_else(|| anyhow!("retention.interval_hours is out of range"))?;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval_period);
            loop {
                interval.tick().await;
                let Some(cutoff) = Utc::now().checked_sub_signed(archive_after) else {
                    error!("Retention cutoff underflowed; skipping archival run");
                    continue;
                };
                if let Err(e) = archiver.archive_expired(cutoff).await {
                    error!("Retention archival failed: {}", e);
                }
            }
        });
        info!(
            "Retention archival scheduled every {} hours",
            config.retention.interval_hours
        );
    }

    let app = api::router(ledger);

    let host: std::net::IpAddr = config.server_host.parse()?;
    let addr = SocketAddr::from((host, config.server_port));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
