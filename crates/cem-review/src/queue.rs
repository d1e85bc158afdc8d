//! Priority queue operations (§4.11). Thin orchestration over
//! `cem_db::review` — the claim-and-lock SQL already lives there; this
//! module adds the "return the existing item instead of erroring" and
//! default-expiry business rules.

use anyhow::Result;
use cem_schemas::review::{ReviewItem, ReviewReason};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

/// Enqueues a review item, or returns the message's existing unresolved
/// one untouched (§4.11 `enqueue`). `expiration_days` overrides the
/// reason's compiled-in default (`low_confidence` → 7 days, else none).
pub async fn enqueue(
    pool: &PgPool,
    message_id: Uuid,
    reason: ReviewReason,
    details: Value,
    expiration_days: Option<i64>,
) -> Result<ReviewItem> {
    if let Some(existing) = cem_db::review::get_unresolved_for_message(pool, message_id).await? {
        return Ok(existing);
    }

    let expiration_days = expiration_days.or_else(|| reason.default_expiration_days());
    let expires_at: Option<DateTime<Utc>> = expiration_days.map(|days| Utc::now() + chrono::Duration::days(days));

    let id = Uuid::new_v4();
    let created = cem_db::review::create_if_absent(pool, id, message_id, reason, details, expires_at).await?;

    if created {
        cem_db::review::get(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("enqueue: just-inserted review item {id} not found"))
    } else {
        // Lost a race against a concurrent enqueue for the same message.
        cem_db::review::get_unresolved_for_message(pool, message_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("enqueue: race lost but no unresolved item found for message {message_id}"))
    }
}

pub async fn list_unresolved(pool: &PgPool, limit: i64) -> Result<Vec<ReviewItem>> {
    cem_db::review::list_unresolved(pool, limit).await
}

pub async fn stats(pool: &PgPool) -> Result<cem_db::review::ReviewStats> {
    cem_db::review::stats(pool).await
}

#[cfg(feature = "runtime-claim")]
pub async fn claim(pool: &PgPool, id: Uuid, reviewer: &str) -> Result<Option<ReviewItem>> {
    cem_db::review::claim(pool, id, reviewer).await
}

#[cfg(feature = "runtime-claim")]
pub async fn claim_next(pool: &PgPool, reviewer: &str, priority_max: Option<i16>) -> Result<Option<ReviewItem>> {
    cem_db::review::claim_next(pool, reviewer, priority_max).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_confidence_gets_seven_day_default_when_unspecified() {
        assert_eq!(ReviewReason::LowConfidence.default_expiration_days(), Some(7));
        assert_eq!(ReviewReason::ConflictDetected.default_expiration_days(), None);
    }
}
