use anyhow::{Context, Result};
use cem_schemas::calibration::{CalibrationSample, ConfidenceBucket, MetricRollup, OperationalMetricSample};
use chrono::{NaiveDate, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub async fn record_sample(pool: &PgPool, sample: &OperationalMetricSample) -> Result<()> {
    sqlx::query(
        r#"
        insert into operational_metric_samples (id, metric_type, value, labels, recorded_at)
        values ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(sample.id)
    .bind(&sample.metric_type)
    .bind(sample.value)
    .bind(&sample.labels)
    .bind(sample.recorded_at)
    .execute(pool)
    .await
    .context("metrics::record_sample failed")?;
    Ok(())
}

pub async fn record_calibration_sample(pool: &PgPool, sample: &CalibrationSample) -> Result<()> {
    sqlx::query(
        r#"
        insert into calibration_samples (
            id, message_id, review_item_id, was_correct, correction_type, document_type,
            predicted_confidence, confidence_bucket
        ) values ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(sample.id)
    .bind(sample.message_id)
    .bind(sample.review_item_id)
    .bind(sample.was_correct)
    .bind(&sample.correction_type)
    .bind(&sample.document_type)
    .bind(sample.predicted_confidence)
    .bind(confidence_bucket_str(sample.confidence_bucket))
    .execute(pool)
    .await
    .context("metrics::record_calibration_sample failed")?;
    Ok(())
}

fn confidence_bucket_str(b: ConfidenceBucket) -> &'static str {
    match b {
        ConfidenceBucket::High => "HIGH",
        ConfidenceBucket::Medium => "MEDIUM",
        ConfidenceBucket::Low => "LOW",
    }
}

/// Rolls up yesterday's (or any given day's) raw samples into
/// `metric_rollups`, grouped by `(metric_type, labels as text)`. Called by
/// the reconciler's daily housekeeping pass (§4.13).
pub async fn rollup_day(pool: &PgPool, day: NaiveDate) -> Result<i64> {
    let rows = sqlx::query(
        r#"
        select metric_type, labels::text as labels_key, value
        from operational_metric_samples
        where recorded_at >= $1 and recorded_at < $1 + interval '1 day'
        order by metric_type, labels::text, value
        "#,
    )
    .bind(day)
    .fetch_all(pool)
    .await
    .context("metrics::rollup_day select failed")?;

    use std::collections::BTreeMap;
    let mut groups: BTreeMap<(String, String), Vec<f64>> = BTreeMap::new();
    for row in &rows {
        let metric_type: String = row.try_get("metric_type")?;
        let labels_key: String = row.try_get("labels_key")?;
        let value: f64 = row.try_get("value")?;
        groups.entry((metric_type, labels_key)).or_default().push(value);
    }

    let mut written = 0i64;
    for ((metric_type, labels_key), mut values) in groups {
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let rollup = MetricRollup::from_sorted_values(&metric_type, day, &labels_key, &values);
        upsert_rollup(pool, &rollup).await?;
        written += 1;
    }

    Ok(written)
}

async fn upsert_rollup(pool: &PgPool, rollup: &MetricRollup) -> Result<()> {
    sqlx::query(
        r#"
        insert into metric_rollups (metric_type, date, labels_key, sample_count, sum, avg, min, max, p95)
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        on conflict (metric_type, date, labels_key)
        do update set sample_count = excluded.sample_count, sum = excluded.sum, avg = excluded.avg,
                      min = excluded.min, max = excluded.max, p95 = excluded.p95
        "#,
    )
    .bind(&rollup.metric_type)
    .bind(rollup.date)
    .bind(&rollup.labels_key)
    .bind(rollup.sample_count)
    .bind(rollup.sum)
    .bind(rollup.avg)
    .bind(rollup.min)
    .bind(rollup.max)
    .bind(rollup.p95)
    .execute(pool)
    .await
    .context("metrics::upsert_rollup failed")?;
    Ok(())
}

/// Deletes raw samples older than 30 days, now that they're rolled up
/// (§4.13 retention rule).
pub async fn cleanup_raw_samples_older_than(pool: &PgPool, days: i64) -> Result<i64> {
    let rows = sqlx::query(
        "delete from operational_metric_samples where recorded_at < now() - ($1 || ' days')::interval returning id",
    )
    .bind(days)
    .fetch_all(pool)
    .await
    .context("metrics::cleanup_raw_samples_older_than failed")?;
    Ok(rows.len() as i64)
}

pub async fn rollups_for_metric(pool: &PgPool, metric_type: &str, since: NaiveDate) -> Result<Vec<MetricRollup>> {
    let rows = sqlx::query(
        "select metric_type, date, labels_key, sample_count, sum, avg, min, max, p95 from metric_rollups where metric_type = $1 and date >= $2 order by date asc",
    )
    .bind(metric_type)
    .bind(since)
    .fetch_all(pool)
    .await
    .context("metrics::rollups_for_metric failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(MetricRollup {
            metric_type: row.try_get("metric_type")?,
            date: row.try_get("date")?,
            labels_key: row.try_get("labels_key")?,
            sample_count: row.try_get("sample_count")?,
            sum: row.try_get("sum")?,
            avg: row.try_get("avg")?,
            min: row.try_get("min")?,
            max: row.try_get("max")?,
            p95: row.try_get("p95")?,
        });
    }
    Ok(out)
}

pub fn new_sample_id() -> Uuid {
    Uuid::new_v4()
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}
