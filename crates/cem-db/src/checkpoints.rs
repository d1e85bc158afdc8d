use anyhow::{Context, Result};
use cem_schemas::checkpoint::{Checkpoint, ValidationStatus};
use serde_json::Value;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

/// Saves or overwrites a stage checkpoint. Agents call this after each stage
/// so a worker crash mid-job can skip already-validated work on replay
/// (§4.6, §9 "checkpoint-based replay").
pub async fn save(
    pool: &PgPool,
    message_id: Uuid,
    stage: &str,
    checkpoint: &Checkpoint,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into checkpoints (message_id, stage, payload, validation_status, recorded_at)
        values ($1, $2, $3, $4, $5)
        on conflict (message_id, stage)
        do update set payload = excluded.payload,
                      validation_status = excluded.validation_status,
                      recorded_at = excluded.recorded_at
        "#,
    )
    .bind(message_id)
    .bind(stage)
    .bind(&checkpoint.payload)
    .bind(checkpoint.validation_status.as_str())
    .bind(checkpoint.timestamp)
    .execute(pool)
    .await
    .context("checkpoints::save failed")?;

    Ok(())
}

pub async fn get(pool: &PgPool, message_id: Uuid, stage: &str) -> Result<Option<Checkpoint>> {
    let row = sqlx::query(
        "select payload, validation_status, recorded_at from checkpoints where message_id = $1 and stage = $2",
    )
    .bind(message_id)
    .bind(stage)
    .fetch_optional(pool)
    .await
    .context("checkpoints::get failed")?;

    row.map(row_to_checkpoint).transpose()
}

pub async fn get_all(pool: &PgPool, message_id: Uuid) -> Result<std::collections::HashMap<String, Checkpoint>> {
    let rows = sqlx::query(
        "select stage, payload, validation_status, recorded_at from checkpoints where message_id = $1",
    )
    .bind(message_id)
    .fetch_all(pool)
    .await
    .context("checkpoints::get_all failed")?;

    let mut out = std::collections::HashMap::new();
    for row in rows {
        let stage: String = row.try_get("stage")?;
        out.insert(stage, row_to_checkpoint(row)?);
    }
    Ok(out)
}

/// Whether a checkpoint exists for `stage` and is not flagged as
/// `Failed`, meaning the agent stage for it can be skipped on replay.
pub async fn has_valid(pool: &PgPool, message_id: Uuid, stage: &str) -> Result<bool> {
    Ok(get(pool, message_id, stage)
        .await?
        .map(|c| c.is_replay_skippable())
        .unwrap_or(false))
}

fn row_to_checkpoint(row: sqlx::postgres::PgRow) -> Result<Checkpoint> {
    let payload: Value = row.try_get("payload")?;
    let validation_status: String = row.try_get("validation_status")?;
    Ok(Checkpoint {
        payload,
        timestamp: row.try_get("recorded_at")?,
        validation_status: ValidationStatus::from_str(&validation_status)
            .map_err(|e| anyhow::anyhow!(e))?,
    })
}
