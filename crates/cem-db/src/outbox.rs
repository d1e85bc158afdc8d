use anyhow::{Context, Result};
use cem_schemas::outbox::OutboxMessage;
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

const SELECT_COLUMNS: &str = r#"
    id, aggregate_type, aggregate_id, operation, payload, idempotency_key,
    created_at, processed_at, retry_count, max_retries, last_error
"#;

fn row_to_outbox(row: sqlx::postgres::PgRow) -> Result<OutboxMessage> {
    Ok(OutboxMessage {
        id: row.try_get("id")?,
        aggregate_type: row.try_get("aggregate_type")?,
        aggregate_id: row.try_get("aggregate_id")?,
        operation: row.try_get("operation")?,
        payload: row.try_get("payload")?,
        idempotency_key: row.try_get("idempotency_key")?,
        created_at: row.try_get("created_at")?,
        processed_at: row.try_get("processed_at")?,
        retry_count: row.try_get("retry_count")?,
        max_retries: row.try_get("max_retries")?,
        last_error: row.try_get("last_error")?,
    })
}

/// Inserts a pending outbox row. Callers must do this INSIDE the same
/// transaction as the primary-store write it represents (§4.10 Phase A) —
/// this function alone does not guarantee atomicity.
#[allow(clippy::too_many_arguments)]
pub async fn enqueue_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
    aggregate_type: &str,
    aggregate_id: &str,
    operation: &str,
    payload: &Value,
    idempotency_key: &str,
    max_retries: i32,
) -> Result<bool> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        insert into outbox_messages (
            id, aggregate_type, aggregate_id, operation, payload, idempotency_key, max_retries
        ) values ($1, $2, $3, $4, $5, $6, $7)
        on conflict (idempotency_key) do nothing
        returning id
        "#,
    )
    .bind(id)
    .bind(aggregate_type)
    .bind(aggregate_id)
    .bind(operation)
    .bind(payload)
    .bind(idempotency_key)
    .bind(max_retries)
    .fetch_optional(&mut **tx)
    .await
    .context("outbox::enqueue_tx failed")?;

    Ok(row.is_some())
}

pub async fn get_by_idempotency_key(pool: &PgPool, key: &str) -> Result<Option<OutboxMessage>> {
    let row = sqlx::query(&format!("select {SELECT_COLUMNS} from outbox_messages where idempotency_key = $1"))
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("outbox::get_by_idempotency_key failed")?;
    row.map(row_to_outbox).transpose()
}

/// Claims up to `batch_size` unprocessed rows whose `retry_count <
/// max_retries` for exclusive dispatch (§4.10 Phase B, §4.12 retry sweep).
/// Uses `FOR UPDATE SKIP LOCKED` so the reconciler and any worker-side
/// drainer never double-send the same update.
#[cfg(feature = "runtime-claim")]
pub async fn claim_batch(pool: &PgPool, batch_size: i64, claimant_id: &str) -> Result<Vec<OutboxMessage>> {
    let rows = sqlx::query(&format!(
        r#"
        with to_claim as (
            select id
            from outbox_messages
            where processed_at is null
              and retry_count < max_retries
              and (claimed_at is null or claimed_at < now() - interval '5 minutes')
            order by created_at asc
            limit $1
            for update skip locked
        )
        update outbox_messages
           set claimed_at = now(), claimed_by = $2
         where id in (select id from to_claim)
        returning {SELECT_COLUMNS}
        "#
    ))
    .bind(batch_size)
    .bind(claimant_id)
    .fetch_all(pool)
    .await
    .context("outbox::claim_batch failed")?;

    rows.into_iter().map(row_to_outbox).collect()
}

pub async fn mark_processed(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query("update outbox_messages set processed_at = now(), claimed_at = null, claimed_by = null where id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("outbox::mark_processed failed")?;
    Ok(())
}

pub async fn mark_failed(pool: &PgPool, id: Uuid, error: &str) -> Result<()> {
    sqlx::query(
        r#"
        update outbox_messages
           set retry_count = retry_count + 1,
               last_error = $2,
               claimed_at = null,
               claimed_by = null
         where id = $1
        "#,
    )
    .bind(id)
    .bind(error)
    .execute(pool)
    .await
    .context("outbox::mark_failed failed")?;
    Ok(())
}

pub async fn list_exhausted(pool: &PgPool) -> Result<Vec<OutboxMessage>> {
    let rows = sqlx::query(&format!(
        "select {SELECT_COLUMNS} from outbox_messages where processed_at is null and retry_count >= max_retries order by created_at asc"
    ))
    .fetch_all(pool)
    .await
    .context("outbox::list_exhausted failed")?;

    rows.into_iter().map(row_to_outbox).collect()
}

/// Deletes processed rows older than `days` (§4.12 cleanup step).
pub async fn cleanup_processed_older_than(pool: &PgPool, days: i64) -> Result<i64> {
    let rows = sqlx::query(
        "delete from outbox_messages where processed_at is not null and created_at < now() - ($1 || ' days')::interval returning id",
    )
    .bind(days)
    .fetch_all(pool)
    .await
    .context("outbox::cleanup_processed_older_than failed")?;
    Ok(rows.len() as i64)
}

pub async fn count_unprocessed(pool: &PgPool) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as("select count(*)::bigint from outbox_messages where processed_at is null")
        .fetch_one(pool)
        .await
        .context("outbox::count_unprocessed failed")?;
    Ok(n)
}
