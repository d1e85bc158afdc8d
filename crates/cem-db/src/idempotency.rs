use anyhow::{Context, Result};
use cem_schemas::idempotency::{build_key, DEFAULT_TTL_HOURS};
use chrono::{Duration, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};

/// Checks whether `(operation, aggregate_id, payload)` has already been
/// executed. Returns the previously stored result if so; otherwise reserves
/// the key so a concurrent caller sees it as already in-flight (§4.2).
///
/// Matches the outbox/OMS idempotency pattern the teacher enforces at the
/// database layer via `on conflict (idempotency_key) do nothing`.
pub async fn check_and_reserve(
    pool: &PgPool,
    operation: &str,
    aggregate_id: &str,
    payload: &Value,
) -> Result<IdempotencyOutcome> {
    let key = build_key(operation, aggregate_id, payload);
    let expires_at = Utc::now() + Duration::hours(DEFAULT_TTL_HOURS);

    let existing = sqlx::query("select result from idempotency_keys where key = $1 and expires_at > now()")
        .bind(&key)
        .fetch_optional(pool)
        .await
        .context("idempotency::check_and_reserve lookup failed")?;

    if let Some(row) = existing {
        let result: Option<Value> = row.try_get("result")?;
        return Ok(IdempotencyOutcome::AlreadyProcessed { key, result });
    }

    let inserted: Option<(String,)> = sqlx::query_as(
        r#"
        insert into idempotency_keys (key, operation, aggregate_id, expires_at)
        values ($1, $2, $3, $4)
        on conflict (key) do nothing
        returning key
        "#,
    )
    .bind(&key)
    .bind(operation)
    .bind(aggregate_id)
    .bind(expires_at)
    .fetch_optional(pool)
    .await
    .context("idempotency::check_and_reserve insert failed")?;

    if inserted.is_some() {
        Ok(IdempotencyOutcome::Reserved { key })
    } else {
        // Lost the race against a concurrent reserver; treat the same as
        // a cache hit with no result recorded yet.
        Ok(IdempotencyOutcome::AlreadyProcessed { key, result: None })
    }
}

#[derive(Debug, Clone)]
pub enum IdempotencyOutcome {
    Reserved { key: String },
    AlreadyProcessed { key: String, result: Option<Value> },
}

pub async fn store_result(pool: &PgPool, key: &str, result: &Value) -> Result<()> {
    sqlx::query("update idempotency_keys set result = $2 where key = $1")
        .bind(key)
        .bind(result)
        .execute(pool)
        .await
        .context("idempotency::store_result failed")?;
    Ok(())
}

/// Deletes expired keys; invoked hourly by the reconciler (§4.12 step 3).
pub async fn cleanup_expired(pool: &PgPool) -> Result<i64> {
    let rows = sqlx::query("delete from idempotency_keys where expires_at <= now() returning key")
        .fetch_all(pool)
        .await
        .context("idempotency::cleanup_expired failed")?;
    Ok(rows.len() as i64)
}
