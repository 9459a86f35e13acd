//! One-shot stuck-purpose scan, meant for cron.
//!
//! Exits 0 when the scan completed, whatever it flagged.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;

use calculaud_infra::{AppConfig, InMemoryStore, PostgresStore, ProcurementStore, run_stuck_scan};
use calculaud_purposes::StuckPolicy;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    calculaud_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let store: Arc<dyn ProcurementStore> = match &config.database_url {
        Some(url) => Arc::new(
            PostgresStore::connect(url, 2)
                .await
                .context("failed to connect to the database")?,
        ),
        None => {
            tracing::warn!("DATABASE_URL not set, scanning an empty in-memory store");
            Arc::new(InMemoryStore::new())
        }
    };

    let policy = StuckPolicy::new(config.stuck_threshold_days);
    let report = run_stuck_scan(store.as_ref(), policy, Utc::now()).await?;
    tracing::info!(
        checked = report.checked,
        flagged = report.flagged,
        threshold_days = report.threshold_days,
        "stuck purpose job completed"
    );
    Ok(())
}
