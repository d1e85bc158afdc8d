use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cem_schemas::message::{
    AttachmentDescriptor, ConfidenceDimensions, ExtractedData, InboundMessage, MatchOutcome,
    MatchStatus, ProcessingStatus, SyncStatus,
};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

fn row_to_message(row: sqlx::postgres::PgRow) -> Result<InboundMessage> {
    let processing_status: String = row.try_get("processing_status")?;
    let sync_status: String = row.try_get("sync_status")?;
    let match_status: Option<String> = row.try_get("match_status")?;
    let attachments_json: serde_json::Value = row.try_get("attachments")?;
    let extracted_data_json: Option<serde_json::Value> = row.try_get("extracted_data")?;

    Ok(InboundMessage {
        id: row.try_get("id")?,
        external_webhook_id: row.try_get("external_webhook_id")?,
        sender_address: row.try_get("sender_address")?,
        subject: row.try_get("subject")?,
        raw_html_body: row.try_get("raw_html_body")?,
        raw_text_body: row.try_get("raw_text_body")?,
        cleaned_body: row.try_get("cleaned_body")?,
        tokens_before_cleaning: row
            .try_get::<Option<i32>, _>("tokens_before_cleaning")?
            .map(|v| v as u32),
        tokens_after_cleaning: row
            .try_get::<Option<i32>, _>("tokens_after_cleaning")?
            .map(|v| v as u32),
        attachments: serde_json::from_value(attachments_json).unwrap_or_default(),
        processing_status: ProcessingStatus::from_str(&processing_status)
            .map_err(|e| anyhow::anyhow!(e))?,
        received_at: row.try_get("received_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        processed_at: row.try_get("processed_at")?,
        retry_count: row.try_get("retry_count")?,
        error_message: row.try_get("error_message")?,
        extracted_data: extracted_data_json
            .map(|v| serde_json::from_value::<ExtractedData>(v))
            .transpose()
            .context("extracted_data column did not match ExtractedData shape")?,
        checkpoints: HashMap::new(),
        match_outcome: MatchOutcome {
            matched_inquiry_id: row.try_get("matched_inquiry_id")?,
            match_confidence_pct: row.try_get("match_confidence_pct")?,
            match_status: match_status
                .map(|s| match s.as_str() {
                    "auto_matched" => Ok(MatchStatus::AutoMatched),
                    "needs_review" => Ok(MatchStatus::NeedsReview),
                    "no_match" => Ok(MatchStatus::NoMatch),
                    other => Err(anyhow::anyhow!("unknown match_status: {other}")),
                })
                .transpose()?,
        },
        confidence: ConfidenceDimensions {
            extraction: row.try_get("confidence_extraction")?,
            overall: row.try_get("confidence_overall")?,
            route_label: row.try_get("route_label")?,
        },
        sync_status: match sync_status.as_str() {
            "pending" => SyncStatus::Pending,
            "synced" => SyncStatus::Synced,
            "failed" => SyncStatus::Failed,
            _ => SyncStatus::NotApplicable,
        },
        idempotency_key: row.try_get("idempotency_key")?,
    })
}

const SELECT_COLUMNS: &str = r#"
    id, external_webhook_id, sender_address, subject, raw_html_body, raw_text_body,
    cleaned_body, tokens_before_cleaning, tokens_after_cleaning, attachments,
    processing_status, received_at, started_at, completed_at, processed_at, retry_count,
    error_message, extracted_data, matched_inquiry_id, match_confidence_pct, match_status,
    confidence_extraction, confidence_overall, route_label, sync_status, idempotency_key
"#;

/// Inserts a freshly received message. Returns `Ok(false)` without creating a
/// second row if `external_webhook_id` already exists (webhook retries must
/// not fan out into duplicate jobs — spec §4.1).
pub async fn insert_if_new(pool: &PgPool, msg: &InboundMessage) -> Result<bool> {
    let attachments_json = serde_json::to_value(&msg.attachments)?;
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        insert into inbound_messages (
            id, external_webhook_id, sender_address, subject, raw_html_body, raw_text_body,
            attachments, processing_status, received_at
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        on conflict (external_webhook_id) do nothing
        returning id
        "#,
    )
    .bind(msg.id)
    .bind(&msg.external_webhook_id)
    .bind(&msg.sender_address)
    .bind(&msg.subject)
    .bind(&msg.raw_html_body)
    .bind(&msg.raw_text_body)
    .bind(attachments_json)
    .bind(msg.processing_status.to_string())
    .bind(msg.received_at)
    .fetch_optional(pool)
    .await
    .context("insert_if_new failed")?;

    Ok(row.is_some())
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<InboundMessage>> {
    let row = sqlx::query(&format!(
        "select {SELECT_COLUMNS} from inbound_messages where id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("messages::get failed")?;

    row.map(row_to_message).transpose()
}

pub async fn get_by_webhook_id(pool: &PgPool, external_webhook_id: &str) -> Result<Option<InboundMessage>> {
    let row = sqlx::query(&format!(
        "select {SELECT_COLUMNS} from inbound_messages where external_webhook_id = $1"
    ))
    .bind(external_webhook_id)
    .fetch_optional(pool)
    .await
    .context("messages::get_by_webhook_id failed")?;

    row.map(row_to_message).transpose()
}

pub async fn list(pool: &PgPool, status: Option<ProcessingStatus>, limit: i64) -> Result<Vec<InboundMessage>> {
    let rows = if let Some(status) = status {
        sqlx::query(&format!(
            "select {SELECT_COLUMNS} from inbound_messages where processing_status = $1 order by received_at desc limit $2"
        ))
        .bind(status.to_string())
        .bind(limit)
        .fetch_all(pool)
        .await
    } else {
        sqlx::query(&format!(
            "select {SELECT_COLUMNS} from inbound_messages order by received_at desc limit $1"
        ))
        .bind(limit)
        .fetch_all(pool)
        .await
    }
    .context("messages::list failed")?;

    rows.into_iter().map(row_to_message).collect()
}

/// Advances `processing_status`, refreshing `started_at`/`completed_at` at
/// the right edges of the state machine (§4.9).
pub async fn update_status(
    pool: &PgPool,
    id: Uuid,
    status: ProcessingStatus,
    error_message: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        update inbound_messages
           set processing_status = $2,
               error_message = $3,
               started_at = coalesce(started_at, case when $2 = 'processing' then now() else null end),
               completed_at = case when $2 in ('completed', 'failed', 'not_creditor_reply') then now() else completed_at end,
               updated_at = now()
         where id = $1
        "#,
    )
    .bind(id)
    .bind(status.to_string())
    .bind(error_message)
    .execute(pool)
    .await
    .context("messages::update_status failed")?;

    Ok(())
}

/// `POST /jobs/{id}/retry` (§6): resets a failed job back to `queued`,
/// clears the error, and bumps `retry_count` so the next dispatch pass
/// picks it up again. Returns `Ok(false)` if the row isn't currently
/// `failed` — retry only makes sense from that state.
pub async fn retry_failed(pool: &PgPool, id: Uuid) -> Result<bool> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        update inbound_messages
           set processing_status = 'queued',
               error_message = null,
               retry_count = retry_count + 1,
               claimed_at = null,
               claimed_by = null,
               updated_at = now()
         where id = $1 and processing_status = 'failed'
        returning id
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("messages::retry_failed failed")?;

    Ok(row.is_some())
}

pub async fn increment_retry(pool: &PgPool, id: Uuid) -> Result<i32> {
    let (retry_count,): (i32,) = sqlx::query_as(
        "update inbound_messages set retry_count = retry_count + 1, updated_at = now() where id = $1 returning retry_count",
    )
    .bind(id)
    .fetch_one(pool)
    .await
    .context("messages::increment_retry failed")?;

    Ok(retry_count)
}

/// Stamps the cleaned body and its before/after token estimates (§4.9
/// pipeline step 2).
pub async fn save_cleaned_body(
    pool: &PgPool,
    id: Uuid,
    cleaned_body: &str,
    tokens_before: u32,
    tokens_after: u32,
) -> Result<()> {
    sqlx::query(
        r#"
        update inbound_messages
           set cleaned_body = $2,
               tokens_before_cleaning = $3,
               tokens_after_cleaning = $4,
               updated_at = now()
         where id = $1
        "#,
    )
    .bind(id)
    .bind(cleaned_body)
    .bind(tokens_before as i32)
    .bind(tokens_after as i32)
    .execute(pool)
    .await
    .context("messages::save_cleaned_body failed")?;
    Ok(())
}

pub async fn save_extracted_data(pool: &PgPool, id: Uuid, data: &ExtractedData) -> Result<()> {
    let json = serde_json::to_value(data)?;
    sqlx::query("update inbound_messages set extracted_data = $2, updated_at = now() where id = $1")
        .bind(id)
        .bind(json)
        .execute(pool)
        .await
        .context("messages::save_extracted_data failed")?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn save_match_outcome(
    pool: &PgPool,
    id: Uuid,
    matched_inquiry_id: Option<Uuid>,
    match_confidence_pct: Option<f64>,
    match_status: Option<MatchStatus>,
) -> Result<()> {
    sqlx::query(
        r#"
        update inbound_messages
           set matched_inquiry_id = $2,
               match_confidence_pct = $3,
               match_status = $4,
               updated_at = now()
         where id = $1
        "#,
    )
    .bind(id)
    .bind(matched_inquiry_id)
    .bind(match_confidence_pct)
    .bind(match_status.map(|s| s.to_string()))
    .execute(pool)
    .await
    .context("messages::save_match_outcome failed")?;
    Ok(())
}

pub async fn save_confidence(
    pool: &PgPool,
    id: Uuid,
    confidence: &ConfidenceDimensions,
) -> Result<()> {
    sqlx::query(
        r#"
        update inbound_messages
           set confidence_extraction = $2,
               confidence_overall = $3,
               route_label = $4,
               updated_at = now()
         where id = $1
        "#,
    )
    .bind(id)
    .bind(confidence.extraction)
    .bind(confidence.overall)
    .bind(&confidence.route_label)
    .execute(pool)
    .await
    .context("messages::save_confidence failed")?;
    Ok(())
}

pub async fn set_sync_status(pool: &PgPool, id: Uuid, status: SyncStatus) -> Result<()> {
    sqlx::query("update inbound_messages set sync_status = $2, updated_at = now() where id = $1")
        .bind(id)
        .bind(status.to_string())
        .execute(pool)
        .await
        .context("messages::set_sync_status failed")?;
    Ok(())
}

pub async fn set_sync_status_tx(tx: &mut sqlx::Transaction<'_, sqlx::Postgres>, id: Uuid, status: SyncStatus) -> Result<()> {
    sqlx::query("update inbound_messages set sync_status = $2, updated_at = now() where id = $1")
        .bind(id)
        .bind(status.to_string())
        .execute(&mut **tx)
        .await
        .context("messages::set_sync_status_tx failed")?;
    Ok(())
}

/// Stamps the idempotency key chosen for a message's dual-store write
/// (§4.10 Phase A step iii). `sync_status` is set to `pending` by the same
/// transaction via [`set_sync_status`].
pub async fn set_idempotency_key_tx(tx: &mut sqlx::Transaction<'_, sqlx::Postgres>, id: Uuid, idempotency_key: &str) -> Result<()> {
    sqlx::query("update inbound_messages set idempotency_key = $2, updated_at = now() where id = $1")
        .bind(id)
        .bind(idempotency_key)
        .execute(&mut **tx)
        .await
        .context("messages::set_idempotency_key_tx failed")?;
    Ok(())
}

pub async fn release_claim(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query("update inbound_messages set claimed_at = null, claimed_by = null where id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("messages::release_claim failed")?;
    Ok(())
}

#[cfg(feature = "runtime-claim")]
pub async fn claim_next_batch(
    pool: &PgPool,
    batch_size: i64,
    worker_id: &str,
) -> Result<Vec<InboundMessage>> {
    let rows = sqlx::query(&format!(
        r#"
        with to_claim as (
            select id
            from inbound_messages
            where processing_status not in ('completed', 'failed', 'not_creditor_reply')
              and claimed_at is null
            order by received_at asc
            limit $1
            for update skip locked
        )
        update inbound_messages
           set claimed_at = now(),
               claimed_by = $2
         where id in (select id from to_claim)
        returning {SELECT_COLUMNS}
        "#
    ))
    .bind(batch_size)
    .bind(worker_id)
    .fetch_all(pool)
    .await
    .context("messages::claim_next_batch failed")?;

    rows.into_iter().map(row_to_message).collect()
}

/// Reclaims messages whose claim is stale (worker crashed mid-job), per the
/// reconciler's sweep (§4.12).
#[cfg(feature = "runtime-claim")]
pub async fn reclaim_stale(pool: &PgPool, stale_after_secs: i64) -> Result<i64> {
    let rows = sqlx::query(
        r#"
        update inbound_messages
           set claimed_at = null, claimed_by = null
         where claimed_at is not null
           and claimed_at < now() - ($1 || ' seconds')::interval
           and processing_status not in ('completed', 'failed', 'not_creditor_reply')
        returning id
        "#,
    )
    .bind(stale_after_secs)
    .fetch_all(pool)
    .await
    .context("messages::reclaim_stale failed")?;

    Ok(rows.len() as i64)
}

/// Messages synced to the secondary store within the last `since` window
/// that carry an extracted amount, the drift scan's candidate set
/// (§4.12 step 2).
pub async fn list_synced_since(pool: &PgPool, since: DateTime<Utc>) -> Result<Vec<InboundMessage>> {
    let rows = sqlx::query(&format!(
        r#"
        select {SELECT_COLUMNS} from inbound_messages
        where sync_status = 'synced' and created_at >= $1 and extracted_data is not null
        order by created_at asc
        "#
    ))
    .bind(since)
    .fetch_all(pool)
    .await
    .context("messages::list_synced_since failed")?;

    rows.into_iter().map(row_to_message).collect()
}

/// Messages stuck in a non-terminal `processing_status` older than
/// `stale_after_secs`, for the auditor's stalled-status rule (§4.12).
pub async fn list_stalled(pool: &PgPool, stale_after_secs: i64) -> Result<Vec<MessageAgeRow>> {
    let rows = sqlx::query(
        r#"
        select id, received_at from inbound_messages
        where processing_status not in ('completed', 'failed', 'not_creditor_reply')
          and received_at < now() - ($1 || ' seconds')::interval
        order by received_at asc
        "#,
    )
    .bind(stale_after_secs)
    .fetch_all(pool)
    .await
    .context("messages::list_stalled failed")?;

    rows.into_iter()
        .map(|row| -> Result<MessageAgeRow> {
            Ok(MessageAgeRow {
                id: row.try_get("id")?,
                received_at: row.try_get("received_at")?,
            })
        })
        .collect()
}

pub async fn count_by_status(pool: &PgPool) -> Result<HashMap<String, i64>> {
    let rows = sqlx::query("select processing_status, count(*)::bigint as n from inbound_messages group by processing_status")
        .fetch_all(pool)
        .await
        .context("messages::count_by_status failed")?;

    let mut out = HashMap::new();
    for row in rows {
        let status: String = row.try_get("processing_status")?;
        let n: i64 = row.try_get("n")?;
        out.insert(status, n);
    }
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct MessageAgeRow {
    pub id: Uuid,
    pub received_at: DateTime<Utc>,
}
