use anyhow::{Context, Result};
use cem_schemas::report::ProcessingReport;
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub async fn insert(pool: &PgPool, report: &ProcessingReport) -> Result<()> {
    sqlx::query(
        r#"
        insert into processing_reports (
            id, message_id, stage_durations_ms, tokens_used, estimated_cost_usd, final_status
        ) values ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(report.id)
    .bind(report.message_id)
    .bind(&report.stage_durations_ms)
    .bind(report.tokens_used)
    .bind(report.estimated_cost_usd)
    .bind(&report.final_status)
    .execute(pool)
    .await
    .context("reports::insert failed")?;
    Ok(())
}

pub async fn get_for_message(pool: &PgPool, message_id: Uuid) -> Result<Option<ProcessingReport>> {
    let row = sqlx::query(
        r#"
        select id, message_id, stage_durations_ms, tokens_used, estimated_cost_usd, final_status, created_at
        from processing_reports
        where message_id = $1
        order by created_at desc
        limit 1
        "#,
    )
    .bind(message_id)
    .fetch_optional(pool)
    .await
    .context("reports::get_for_message failed")?;

    row.map(|row| {
        Ok(ProcessingReport {
            id: row.try_get("id")?,
            message_id: row.try_get("message_id")?,
            stage_durations_ms: row.try_get("stage_durations_ms")?,
            tokens_used: row.try_get("tokens_used")?,
            estimated_cost_usd: row.try_get("estimated_cost_usd")?,
            final_status: row.try_get("final_status")?,
            created_at: row.try_get("created_at")?,
        })
    })
    .transpose()
}
