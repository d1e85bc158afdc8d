use anyhow::{Context, Result};
use cem_schemas::inquiry::OutboundInquiry;
use chrono::{Duration, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

const SELECT_COLUMNS: &str = r#"
    id, client_name, client_name_normalized, creditor_name, creditor_name_normalized,
    creditor_address, creditor_email, debt_amount, reference_number, external_ticket_id,
    external_side_conversation_id, external_email_provider_id, sent_at, status
"#;

fn row_to_inquiry(row: sqlx::postgres::PgRow) -> Result<OutboundInquiry> {
    Ok(OutboundInquiry {
        id: row.try_get("id")?,
        client_name: row.try_get("client_name")?,
        client_name_normalized: row.try_get("client_name_normalized")?,
        creditor_name: row.try_get("creditor_name")?,
        creditor_name_normalized: row.try_get("creditor_name_normalized")?,
        creditor_address: row.try_get("creditor_address")?,
        creditor_email: row.try_get("creditor_email")?,
        debt_amount: row.try_get("debt_amount")?,
        reference_number: row.try_get("reference_number")?,
        external_ticket_id: row.try_get("external_ticket_id")?,
        external_side_conversation_id: row.try_get("external_side_conversation_id")?,
        external_email_provider_id: row.try_get("external_email_provider_id")?,
        sent_at: row.try_get("sent_at")?,
        status: row.try_get("status")?,
    })
}

#[allow(clippy::too_many_arguments)]
pub async fn insert(pool: &PgPool, inquiry: &OutboundInquiry) -> Result<()> {
    sqlx::query(
        r#"
        insert into outbound_inquiries (
            id, client_name, client_name_normalized, creditor_name, creditor_name_normalized,
            creditor_address, creditor_email, debt_amount, reference_number,
            external_ticket_id, external_side_conversation_id, external_email_provider_id,
            sent_at, status
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(inquiry.id)
    .bind(&inquiry.client_name)
    .bind(&inquiry.client_name_normalized)
    .bind(&inquiry.creditor_name)
    .bind(&inquiry.creditor_name_normalized)
    .bind(&inquiry.creditor_address)
    .bind(&inquiry.creditor_email)
    .bind(inquiry.debt_amount)
    .bind(&inquiry.reference_number)
    .bind(&inquiry.external_ticket_id)
    .bind(&inquiry.external_side_conversation_id)
    .bind(&inquiry.external_email_provider_id)
    .bind(inquiry.sent_at)
    .bind(&inquiry.status)
    .execute(pool)
    .await
    .context("inquiries::insert failed")?;

    Ok(())
}

/// Inserts an inquiry unless one already exists for the same
/// `(client_name_normalized, creditor_email)` pair, or the same
/// `external_email_provider_id` when the caller supplies one (§6
/// outbound-inquiry ingest dedup rule). Returns `Ok(false)` without
/// inserting on a dedup hit.
pub async fn insert_if_new(pool: &PgPool, inquiry: &OutboundInquiry) -> Result<bool> {
    let existing: Option<(Uuid,)> = if let Some(provider_id) = &inquiry.external_email_provider_id {
        sqlx::query_as(
            r#"
            select id from outbound_inquiries
            where external_email_provider_id = $1
               or (client_name_normalized = $2 and creditor_email = $3)
            limit 1
            "#,
        )
        .bind(provider_id)
        .bind(&inquiry.client_name_normalized)
        .bind(&inquiry.creditor_email)
        .fetch_optional(pool)
        .await
    } else {
        sqlx::query_as(
            "select id from outbound_inquiries where client_name_normalized = $1 and creditor_email = $2 limit 1",
        )
        .bind(&inquiry.client_name_normalized)
        .bind(&inquiry.creditor_email)
        .fetch_optional(pool)
        .await
    }
    .context("inquiries::insert_if_new dedup check failed")?;

    if existing.is_some() {
        return Ok(false);
    }

    insert(pool, inquiry).await?;
    Ok(true)
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<OutboundInquiry>> {
    let row = sqlx::query(&format!("select {SELECT_COLUMNS} from outbound_inquiries where id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("inquiries::get failed")?;
    row.map(row_to_inquiry).transpose()
}

/// Candidate pool for matching: all inquiries sent within `lookback_days` of
/// `reference_time` (§4.7 "no recent inquiry" rule).
pub async fn candidates_within_lookback(
    pool: &PgPool,
    reference_time: chrono::DateTime<Utc>,
    lookback_days: i64,
) -> Result<Vec<OutboundInquiry>> {
    let cutoff = reference_time - Duration::days(lookback_days);
    let rows = sqlx::query(&format!(
        "select {SELECT_COLUMNS} from outbound_inquiries where sent_at >= $1 and sent_at <= $2 order by sent_at desc"
    ))
    .bind(cutoff)
    .bind(reference_time)
    .fetch_all(pool)
    .await
    .context("inquiries::candidates_within_lookback failed")?;

    rows.into_iter().map(row_to_inquiry).collect()
}

pub async fn find_by_reference_number(pool: &PgPool, reference_number: &str) -> Result<Vec<OutboundInquiry>> {
    let rows = sqlx::query(&format!(
        "select {SELECT_COLUMNS} from outbound_inquiries where reference_number = $1"
    ))
    .bind(reference_number)
    .fetch_all(pool)
    .await
    .context("inquiries::find_by_reference_number failed")?;

    rows.into_iter().map(row_to_inquiry).collect()
}

pub async fn set_status(pool: &PgPool, id: Uuid, status: &str) -> Result<()> {
    sqlx::query("update outbound_inquiries set status = $2 where id = $1")
        .bind(id)
        .bind(status)
        .execute(pool)
        .await
        .context("inquiries::set_status failed")?;
    Ok(())
}
