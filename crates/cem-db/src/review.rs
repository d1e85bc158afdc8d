use anyhow::{Context, Result};
use cem_schemas::review::{ReviewItem, ReviewReason, ReviewResolution};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

const SELECT_COLUMNS: &str = r#"
    id, message_id, reason, details, priority, claimed_at, claimed_by,
    resolved_at, resolution, notes, created_at, expires_at
"#;

fn row_to_review(row: sqlx::postgres::PgRow) -> Result<ReviewItem> {
    let reason: String = row.try_get("reason")?;
    let resolution: Option<String> = row.try_get("resolution")?;
    Ok(ReviewItem {
        id: row.try_get("id")?,
        message_id: row.try_get("message_id")?,
        reason: ReviewReason::from_str(&reason).map_err(|e| anyhow::anyhow!(e))?,
        details: row.try_get("details")?,
        priority: row.try_get("priority")?,
        claimed_at: row.try_get("claimed_at")?,
        claimed_by: row.try_get("claimed_by")?,
        resolved_at: row.try_get("resolved_at")?,
        resolution: resolution
            .map(|r| match r.as_str() {
                "approved" => Ok(ReviewResolution::Approved),
                "rejected" => Ok(ReviewResolution::Rejected),
                "corrected" => Ok(ReviewResolution::Corrected),
                "escalated" => Ok(ReviewResolution::Escalated),
                "spam" => Ok(ReviewResolution::Spam),
                other => Err(anyhow::anyhow!("unknown resolution: {other}")),
            })
            .transpose()?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

/// Creates a review item unless the message already has one unresolved
/// (invariant in §4.11: at most one open review item per message).
/// `expires_at` is the caller's computed expiry (§4.11 default is 7 days);
/// `None` leaves the item open indefinitely.
pub async fn create_if_absent(
    pool: &PgPool,
    id: Uuid,
    message_id: Uuid,
    reason: ReviewReason,
    details: serde_json::Value,
    expires_at: Option<DateTime<Utc>>,
) -> Result<bool> {
    let existing: Option<(Uuid,)> = sqlx::query_as(
        "select id from review_items where message_id = $1 and resolved_at is null",
    )
    .bind(message_id)
    .fetch_optional(pool)
    .await
    .context("review::create_if_absent existence check failed")?;

    if existing.is_some() {
        return Ok(false);
    }

    sqlx::query(
        r#"
        insert into review_items (id, message_id, reason, details, priority, expires_at)
        values ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(message_id)
    .bind(reason.as_str())
    .bind(details)
    .bind(reason.default_priority())
    .bind(expires_at)
    .execute(pool)
    .await
    .context("review::create_if_absent insert failed")?;

    Ok(true)
}

/// Lists unresolved, unclaimed items whose `expires_at` has passed, for the
/// reconciler's expiry sweep (§4.11, §4.12).
pub async fn list_expired(pool: &PgPool) -> Result<Vec<ReviewItem>> {
    let rows = sqlx::query(&format!(
        "select {SELECT_COLUMNS} from review_items where resolved_at is null and expires_at is not null and expires_at <= now()"
    ))
    .fetch_all(pool)
    .await
    .context("review::list_expired failed")?;

    rows.into_iter().map(row_to_review).collect()
}

/// Fetches the single unresolved item for a message, if any (§4.11
/// `enqueue`'s "returns the existing one" contract).
pub async fn get_unresolved_for_message(pool: &PgPool, message_id: Uuid) -> Result<Option<ReviewItem>> {
    let row = sqlx::query(&format!(
        "select {SELECT_COLUMNS} from review_items where message_id = $1 and resolved_at is null"
    ))
    .bind(message_id)
    .fetch_optional(pool)
    .await
    .context("review::get_unresolved_for_message failed")?;
    row.map(row_to_review).transpose()
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<ReviewItem>> {
    let row = sqlx::query(&format!("select {SELECT_COLUMNS} from review_items where id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("review::get failed")?;
    row.map(row_to_review).transpose()
}

pub async fn list_unresolved(pool: &PgPool, limit: i64) -> Result<Vec<ReviewItem>> {
    let rows = sqlx::query(&format!(
        "select {SELECT_COLUMNS} from review_items where resolved_at is null order by priority asc, created_at asc limit $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("review::list_unresolved failed")?;

    rows.into_iter().map(row_to_review).collect()
}

/// Claims a specific item by id (§4.11 `claim(id, reviewer)`). Refuses if
/// already claimed or resolved by racing against the same
/// skip-locked predicate `claim_next` uses.
#[cfg(feature = "runtime-claim")]
pub async fn claim(pool: &PgPool, id: Uuid, claimant_id: &str) -> Result<Option<ReviewItem>> {
    let row = sqlx::query(&format!(
        r#"
        with to_claim as (
            select id
            from review_items
            where id = $1 and resolved_at is null and claimed_at is null
            for update skip locked
        )
        update review_items
           set claimed_at = now(), claimed_by = $2
         where id in (select id from to_claim)
        returning {SELECT_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(claimant_id)
    .fetch_optional(pool)
    .await
    .context("review::claim failed")?;

    row.map(row_to_review).transpose()
}

/// Claims the single highest-priority unclaimed, unresolved item for
/// `claimant_id` (§4.11). Uses `FOR UPDATE SKIP LOCKED` so two reviewers
/// hitting "next" concurrently never get the same item.
#[cfg(feature = "runtime-claim")]
pub async fn claim_next(pool: &PgPool, claimant_id: &str, priority_max: Option<i16>) -> Result<Option<ReviewItem>> {
    let row = sqlx::query(&format!(
        r#"
        with to_claim as (
            select id
            from review_items
            where resolved_at is null and claimed_at is null
              and ($2::smallint is null or priority <= $2)
            order by priority asc, created_at asc
            limit 1
            for update skip locked
        )
        update review_items
           set claimed_at = now(), claimed_by = $1
         where id in (select id from to_claim)
        returning {SELECT_COLUMNS}
        "#
    ))
    .bind(claimant_id)
    .bind(priority_max)
    .fetch_optional(pool)
    .await
    .context("review::claim_next failed")?;

    row.map(row_to_review).transpose()
}

pub async fn resolve(
    pool: &PgPool,
    id: Uuid,
    resolution: ReviewResolution,
    notes: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        update review_items
           set resolved_at = now(), resolution = $2, notes = $3
         where id = $1
        "#,
    )
    .bind(id)
    .bind(resolution.as_str())
    .bind(notes)
    .execute(pool)
    .await
    .context("review::resolve failed")?;
    Ok(())
}

pub async fn release_claim(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query("update review_items set claimed_at = null, claimed_by = null where id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("review::release_claim failed")?;
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct ReviewStats {
    pub total_unresolved: i64,
    pub total_claimed: i64,
    pub by_reason: std::collections::HashMap<String, i64>,
    pub avg_resolution_minutes: Option<f64>,
}

pub async fn stats(pool: &PgPool) -> Result<ReviewStats> {
    let (total_unresolved,): (i64,) =
        sqlx::query_as("select count(*)::bigint from review_items where resolved_at is null")
            .fetch_one(pool)
            .await
            .context("review::stats total_unresolved failed")?;

    let (total_claimed,): (i64,) = sqlx::query_as(
        "select count(*)::bigint from review_items where resolved_at is null and claimed_at is not null",
    )
    .fetch_one(pool)
    .await
    .context("review::stats total_claimed failed")?;

    let reason_rows = sqlx::query(
        "select reason, count(*)::bigint as n from review_items where resolved_at is null group by reason",
    )
    .fetch_all(pool)
    .await
    .context("review::stats by_reason failed")?;

    let mut by_reason = std::collections::HashMap::new();
    for row in reason_rows {
        let reason: String = row.try_get("reason")?;
        let n: i64 = row.try_get("n")?;
        by_reason.insert(reason, n);
    }

    let avg_row = sqlx::query(
        "select avg(extract(epoch from resolved_at - created_at) / 60.0) as avg_minutes from review_items where resolved_at is not null",
    )
    .fetch_one(pool)
    .await
    .context("review::stats avg_resolution failed")?;
    let avg_resolution_minutes: Option<f64> = avg_row.try_get("avg_minutes")?;

    Ok(ReviewStats {
        total_unresolved,
        total_claimed,
        by_reason,
        avg_resolution_minutes,
    })
}
