//! `cem run-reconciler` / `cem audit` — the operator-invoked counterparts
//! to `cem-daemon::scheduler`'s hourly sweep (spec §4.12).

use std::sync::Arc;

use anyhow::{Context, Result};
use cem_daemon::capabilities::HttpSecondaryStoreAdapter;

use super::load_config;

pub async fn run_once() -> Result<()> {
    let config = load_config()?;
    let pool = cem_db::connect_from_env().await.context("connecting to primary store")?;
    let store = HttpSecondaryStoreAdapter::new(
        config.secondary_store_url.clone().unwrap_or_else(|| "http://localhost:8090".to_string()),
    );

    let report = cem_reconcile::run(&pool, &store).await?;
    println!(
        "records_checked={} mismatches_found={} auto_repaired={} failed_repairs={} status={:?}",
        report.records_checked, report.mismatches_found, report.auto_repaired, report.failed_repairs, report.status
    );
    Ok(())
}

pub async fn run_audit(lookback_hours: i64) -> Result<()> {
    let config = load_config()?;
    let pool = cem_db::connect_from_env().await.context("connecting to primary store")?;
    let store: Arc<dyn cem_capabilities::SecondaryStoreAdapter> = Arc::new(HttpSecondaryStoreAdapter::new(
        config.secondary_store_url.clone().unwrap_or_else(|| "http://localhost:8090".to_string()),
    ));

    let report = cem_reconcile::audit::run(&pool, store.as_ref(), lookback_hours).await?;
    println!(
        "checked={} issues={} health_score={:.4} stalled={}",
        report.checked,
        report.issues,
        report.health_score,
        report.stalled_message_ids.len()
    );
    for id in &report.stalled_message_ids {
        println!("stalled_message_id={id}");
    }
    Ok(())
}
