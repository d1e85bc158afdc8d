use anyhow::{Context, Result};
use cem_schemas::prompt::{PromptMetricSample, PromptTemplate};
use sqlx::{PgPool, Row};
use uuid::Uuid;

fn row_to_template(row: sqlx::postgres::PgRow) -> Result<PromptTemplate> {
    Ok(PromptTemplate {
        id: row.try_get("id")?,
        task_type: row.try_get("task_type")?,
        name: row.try_get("name")?,
        version: row.try_get("version")?,
        active: row.try_get("active")?,
        template_text: row.try_get("template_text")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Fetches the single active prompt for `(task_type, name)`, relying on
/// the partial unique index to guarantee there's at most one.
pub async fn get_active(pool: &PgPool, task_type: &str, name: &str) -> Result<Option<PromptTemplate>> {
    let row = sqlx::query(
        r#"
        select id, task_type, name, version, active, template_text, created_at
        from prompt_templates
        where task_type = $1 and name = $2 and active
        "#,
    )
    .bind(task_type)
    .bind(name)
    .fetch_optional(pool)
    .await
    .context("prompts::get_active failed")?;

    row.map(row_to_template).transpose()
}

/// Publishes a new version as active, deactivating the prior one in the
/// same transaction (so the partial unique index is never violated).
pub async fn publish_new_version(
    pool: &PgPool,
    id: Uuid,
    task_type: &str,
    name: &str,
    template_text: &str,
) -> Result<i32> {
    let mut tx = pool.begin().await.context("prompts::publish_new_version begin tx failed")?;

    let (next_version,): (i32,) = sqlx::query_as(
        "select coalesce(max(version), 0) + 1 from prompt_templates where task_type = $1 and name = $2",
    )
    .bind(task_type)
    .bind(name)
    .fetch_one(&mut *tx)
    .await
    .context("prompts::publish_new_version next_version query failed")?;

    sqlx::query("update prompt_templates set active = false where task_type = $1 and name = $2 and active")
        .bind(task_type)
        .bind(name)
        .execute(&mut *tx)
        .await
        .context("prompts::publish_new_version deactivate failed")?;

    sqlx::query(
        r#"
        insert into prompt_templates (id, task_type, name, version, active, template_text)
        values ($1, $2, $3, $4, true, $5)
        "#,
    )
    .bind(id)
    .bind(task_type)
    .bind(name)
    .bind(next_version)
    .bind(template_text)
    .execute(&mut *tx)
    .await
    .context("prompts::publish_new_version insert failed")?;

    tx.commit().await.context("prompts::publish_new_version commit failed")?;
    Ok(next_version)
}

pub async fn record_sample(pool: &PgPool, sample: &PromptMetricSample) -> Result<()> {
    sqlx::query(
        r#"
        insert into prompt_metric_samples (
            id, task_type, name, tokens_in, tokens_out, cost_usd, latency_ms, success, sampled_at
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(sample.id)
    .bind(&sample.task_type)
    .bind(&sample.name)
    .bind(sample.tokens_in)
    .bind(sample.tokens_out)
    .bind(sample.cost_usd)
    .bind(sample.latency_ms)
    .bind(sample.success)
    .bind(sample.sampled_at)
    .execute(pool)
    .await
    .context("prompts::record_sample failed")?;
    Ok(())
}
