use anyhow::{Context, Result};
use cem_schemas::report::{ReconciliationReport, ReconciliationStatus};
use sqlx::{PgPool, Row};
use uuid::Uuid;

fn row_to_report(row: sqlx::postgres::PgRow) -> Result<ReconciliationReport> {
    let status: String = row.try_get("status")?;
    Ok(ReconciliationReport {
        id: row.try_get("id")?,
        run_at: row.try_get("run_at")?,
        completed_at: row.try_get("completed_at")?,
        records_checked: row.try_get("records_checked")?,
        mismatches_found: row.try_get("mismatches_found")?,
        auto_repaired: row.try_get("auto_repaired")?,
        failed_repairs: row.try_get("failed_repairs")?,
        details: row.try_get("details")?,
        status: match status.as_str() {
            "running" => ReconciliationStatus::Running,
            "completed" => ReconciliationStatus::Completed,
            "failed" => ReconciliationStatus::Failed,
            other => anyhow::bail!("unknown reconciliation status: {other}"),
        },
        error_message: row.try_get("error_message")?,
    })
}

pub async fn start_run(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query("insert into reconciliation_reports (id, status) values ($1, 'running')")
        .bind(id)
        .execute(pool)
        .await
        .context("reconcile::start_run failed")?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn complete_run(
    pool: &PgPool,
    id: Uuid,
    records_checked: i64,
    mismatches_found: i64,
    auto_repaired: i64,
    failed_repairs: i64,
    details: serde_json::Value,
) -> Result<()> {
    sqlx::query(
        r#"
        update reconciliation_reports
           set completed_at = now(),
               records_checked = $2,
               mismatches_found = $3,
               auto_repaired = $4,
               failed_repairs = $5,
               details = $6,
               status = 'completed'
         where id = $1
        "#,
    )
    .bind(id)
    .bind(records_checked)
    .bind(mismatches_found)
    .bind(auto_repaired)
    .bind(failed_repairs)
    .bind(details)
    .execute(pool)
    .await
    .context("reconcile::complete_run failed")?;
    Ok(())
}

pub async fn fail_run(pool: &PgPool, id: Uuid, error_message: &str) -> Result<()> {
    sqlx::query(
        "update reconciliation_reports set completed_at = now(), status = 'failed', error_message = $2 where id = $1",
    )
    .bind(id)
    .bind(error_message)
    .execute(pool)
    .await
    .context("reconcile::fail_run failed")?;
    Ok(())
}

pub async fn latest(pool: &PgPool) -> Result<Option<ReconciliationReport>> {
    let row = sqlx::query(
        r#"
        select id, run_at, completed_at, records_checked, mismatches_found, auto_repaired,
               failed_repairs, details, status, error_message
        from reconciliation_reports
        order by run_at desc
        limit 1
        "#,
    )
    .fetch_optional(pool)
    .await
    .context("reconcile::latest failed")?;

    row.map(row_to_report).transpose()
}
