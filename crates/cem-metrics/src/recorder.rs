//! Typed recording helpers over `cem_db::metrics::record_sample` (§4.13).

use anyhow::Result;
use cem_schemas::calibration::OperationalMetricSample;
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

async fn record(pool: &PgPool, metric_type: &str, value: f64, labels: Value) -> Result<()> {
    let sample = OperationalMetricSample {
        id: Uuid::new_v4(),
        metric_type: metric_type.to_string(),
        value,
        labels,
        recorded_at: Utc::now(),
    };
    cem_db::metrics::record_sample(pool, &sample).await
}

pub async fn record_queue_depth(pool: &PgPool, queue: &str, depth: i64) -> Result<()> {
    record(pool, crate::kinds::QUEUE_DEPTH, depth as f64, json!({"queue": queue})).await
}

pub async fn record_stage_duration(pool: &PgPool, stage: &str, duration_ms: u64) -> Result<()> {
    record(pool, crate::kinds::STAGE_DURATION_MS, duration_ms as f64, json!({"stage": stage})).await
}

pub async fn record_error(pool: &PgPool, stage: &str, error_kind: &str) -> Result<()> {
    record(pool, crate::kinds::ERROR_COUNT, 1.0, json!({"stage": stage, "error_kind": error_kind})).await
}

pub async fn record_token_usage(pool: &PgPool, model: &str, tokens: u32) -> Result<()> {
    record(pool, crate::kinds::TOKEN_USAGE, tokens as f64, json!({"model": model})).await
}

pub async fn record_confidence(pool: &PgPool, bucket: &str, score: f64) -> Result<()> {
    record(pool, crate::kinds::CONFIDENCE_SCORE, score, json!({"bucket": bucket})).await
}
