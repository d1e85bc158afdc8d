//! Daily rollup and raw-sample retention (§4.13). Raw
//! `operational_metric_samples` rows are kept 30 days; rollups are kept
//! forever.

use anyhow::Result;
use chrono::{Duration, Utc};
use sqlx::PgPool;

const RAW_SAMPLE_RETENTION_DAYS: i64 = 30;

pub struct HousekeepingReport {
    pub rollup_rows_written: i64,
    pub raw_samples_deleted: i64,
}

/// Rolls up yesterday's raw samples into `metric_rollups`, then deletes raw
/// samples past the retention window. Run once a day, after midnight UTC, so
/// "yesterday" is a closed day by the time it runs.
pub async fn run_daily(pool: &PgPool) -> Result<HousekeepingReport> {
    let yesterday = Utc::now().date_naive() - Duration::days(1);
    let rollup_rows_written = cem_db::metrics::rollup_day(pool, yesterday).await?;
    let raw_samples_deleted = cem_db::metrics::cleanup_raw_samples_older_than(pool, RAW_SAMPLE_RETENTION_DAYS).await?;
    Ok(HousekeepingReport { rollup_rows_written, raw_samples_deleted })
}
