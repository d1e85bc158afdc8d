//! Hourly reconciler and operator-invoked auditor (§4.12). Four steps per
//! scheduled run: retry the outbox, scan for drift against the secondary
//! store, clean up expired/old rows, and persist a summary report.

pub mod audit;
pub mod drift;

use anyhow::Result;
use cem_capabilities::SecondaryStoreAdapter;
use cem_schemas::report::{DriftKind, ReconciliationReport};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

const OUTBOX_RETENTION_DAYS: i64 = 30;

#[cfg(feature = "runtime-claim")]
const OUTBOX_BATCH_SIZE: i64 = 50;

/// Probes the secondary store with a cheap lookup to decide whether the
/// drift scan should run at all (§4.12: "when secondary is reachable").
async fn is_secondary_reachable(store: &dyn SecondaryStoreAdapter) -> bool {
    !matches!(
        store.get_client_by_ticket("__reconciler_reachability_probe__").await,
        Err(cem_capabilities::SecondaryStoreError::Unavailable)
    )
}

/// One scheduled reconciliation pass (§4.12). Persists a
/// [`ReconciliationReport`] row regardless of outcome.
pub async fn run(pool: &PgPool, store: &dyn SecondaryStoreAdapter) -> Result<ReconciliationReport> {
    let id = Uuid::new_v4();
    cem_db::reconcile::start_run(pool, id).await?;

    match run_inner(pool, store).await {
        Ok((records_checked, mismatches_found, auto_repaired, failed_repairs, details)) => {
            cem_db::reconcile::complete_run(pool, id, records_checked, mismatches_found, auto_repaired, failed_repairs, details).await?;
        }
        Err(err) => {
            cem_db::reconcile::fail_run(pool, id, &err.to_string()).await?;
            return Err(err);
        }
    }

    cem_db::reconcile::latest(pool)
        .await?
        .ok_or_else(|| anyhow::anyhow!("run: just-completed report not found"))
}

#[cfg(feature = "runtime-claim")]
async fn retry_outbox(pool: &PgPool, store: &dyn SecondaryStoreAdapter) -> Result<usize> {
    cem_outbox::drain_batch(pool, store, OUTBOX_BATCH_SIZE, "reconciler").await
}

#[cfg(not(feature = "runtime-claim"))]
async fn retry_outbox(_pool: &PgPool, _store: &dyn SecondaryStoreAdapter) -> Result<usize> {
    Ok(0)
}

async fn run_inner(pool: &PgPool, store: &dyn SecondaryStoreAdapter) -> Result<(i64, i64, i64, i64, serde_json::Value)> {
    let outbox_retried = retry_outbox(pool, store).await?;

    let mut mismatches_found = 0i64;
    let mut auto_repaired = 0i64;
    let mut failed_repairs = 0i64;
    let mut drift_details = Vec::new();

    if is_secondary_reachable(store).await {
        for finding in drift::scan(pool, store).await? {
            if finding.kind != DriftKind::Consistent {
                mismatches_found += 1;
                if finding.repaired {
                    auto_repaired += 1;
                } else {
                    failed_repairs += 1;
                }
                drift_details.push(json!({
                    "message_id": finding.message_id,
                    "kind": finding.kind,
                    "repaired": finding.repaired,
                    "detail": finding.detail,
                }));
            }
        }
    }

    let expired_keys = cem_db::idempotency::cleanup_expired(pool).await?;
    let stale_outbox = cem_db::outbox::cleanup_processed_older_than(pool, OUTBOX_RETENTION_DAYS).await?;

    let records_checked = mismatches_found + outbox_retried as i64;
    let details = json!({
        "outbox_retried": outbox_retried,
        "idempotency_keys_cleaned": expired_keys,
        "outbox_rows_cleaned": stale_outbox,
        "drift_findings": drift_details,
    });

    Ok((records_checked, mismatches_found, auto_repaired, failed_repairs, details))
}
