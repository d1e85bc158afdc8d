//! Operator-invoked auditor (§4.12): same drift-scan structure as the
//! scheduled reconciler but over a caller-chosen lookback window, plus a
//! health score and the stalled-status rule. Never mutates anything — pure
//! reporting, no repairs.

use anyhow::Result;
use cem_capabilities::SecondaryStoreAdapter;
use cem_schemas::report::DriftKind;
use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

const STALLED_AFTER_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct AuditReport {
    pub checked: i64,
    pub issues: i64,
    pub health_score: f64,
    pub stalled_message_ids: Vec<Uuid>,
    pub findings: Vec<(Uuid, DriftKind)>,
}

/// Runs a read-only drift scan over `lookback_hours` and the stalled-status
/// rule. `health_score = (checked - issues) / checked`; a window with zero
/// checked messages reports a perfect score rather than dividing by zero.
pub async fn run(pool: &PgPool, store: &dyn SecondaryStoreAdapter, lookback_hours: i64) -> Result<AuditReport> {
    let since = Utc::now() - Duration::hours(lookback_hours);
    let all_findings = crate::drift::scan_window(pool, store, since).await?;
    let checked = all_findings.len() as i64;

    let findings: Vec<(Uuid, DriftKind)> = all_findings
        .into_iter()
        .filter(|f| f.kind != DriftKind::Consistent)
        .map(|f| (f.message_id, f.kind))
        .collect();
    let issues = findings.len() as i64;

    let health_score = if checked == 0 { 1.0 } else { (checked - issues) as f64 / checked as f64 };

    let stalled = cem_db::messages::list_stalled(pool, STALLED_AFTER_SECS).await?;

    Ok(AuditReport {
        checked,
        issues,
        health_score,
        stalled_message_ids: stalled.into_iter().map(|row| row.id).collect(),
        findings,
    })
}
