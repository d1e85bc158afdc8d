//! Background scheduler (§4.12, §6): an hourly reconciliation sweep and a
//! once-a-day metrics rollup, both `tokio::time::interval` loops spawned
//! from `main`, suppressed in the `testing` environment so integration
//! tests don't race a background sweep against fixture data.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::state::AppState;

const RECONCILE_INTERVAL: Duration = Duration::from_secs(3600);
const METRICS_ROLLUP_INTERVAL: Duration = Duration::from_secs(86_400);

/// Spawns both scheduled loops unless `state.config.environment` suppresses
/// them (§6 "Configuration" `environment` field).
pub fn spawn_all(state: Arc<AppState>) {
    if state.config.environment.suppresses_scheduler() {
        info!(environment = %state.config.environment, "scheduler_suppressed");
        return;
    }

    spawn_reconciler(Arc::clone(&state));
    spawn_metrics_rollup(state);
}

fn spawn_reconciler(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RECONCILE_INTERVAL);
        loop {
            ticker.tick().await;
            match cem_reconcile::run(&state.pool, state.secondary_store.as_ref()).await {
                Ok(report) => info!(
                    records_checked = report.records_checked,
                    mismatches_found = report.mismatches_found,
                    auto_repaired = report.auto_repaired,
                    failed_repairs = report.failed_repairs,
                    "scheduled_reconciliation_complete"
                ),
                Err(err) => error!(error = %err, "scheduled_reconciliation_failed"),
            }
        }
    });
}

fn spawn_metrics_rollup(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(METRICS_ROLLUP_INTERVAL);
        loop {
            ticker.tick().await;
            match cem_metrics::run_daily(&state.pool).await {
                Ok(report) => info!(
                    rollup_rows_written = report.rollup_rows_written,
                    raw_samples_deleted = report.raw_samples_deleted,
                    "scheduled_metrics_rollup_complete"
                ),
                Err(err) => error!(error = %err, "scheduled_metrics_rollup_failed"),
            }
        }
    });
}
