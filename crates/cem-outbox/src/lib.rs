//! Two-phase dual-store writer (§4.10). Phase A is atomic to the primary
//! store and never touches the secondary store; Phase B is a separate,
//! compensatable post-commit step. The two must never collapse into one
//! function — that's the saga's whole point (spec §9).

use anyhow::{Context, Result};
use cem_capabilities::{ClientSelector, CreditorSelector, DebtUpdate, SecondaryStoreAdapter};
use cem_schemas::message::SyncStatus;
use cem_schemas::outbox::{CreditorDebtUpdatePayload, DEFAULT_MAX_RETRIES};
use sqlx::PgPool;
use uuid::Uuid;

const AGGREGATE_TYPE: &str = "creditor_debt_update";

pub enum PhaseAOutcome {
    /// A fresh outbox row was enqueued; the caller commits the transaction
    /// that's already open and Phase B can run afterward.
    Enqueued { outbox_id: Uuid, idempotency_key: String },
    /// This exact operation already ran (or is in flight) under the same
    /// idempotency key; nothing further to do.
    AlreadyProcessed { idempotency_key: String },
}

/// Phase A (§4.10): idempotency check, outbox insert, and the
/// `inbound_messages.sync_status = pending` stamp, all inside the caller's
/// open transaction. The caller commits; it must NOT call Phase B inside
/// the same transaction.
///
/// The idempotency check and the outbox insert are the same operation: the
/// `outbox_messages.idempotency_key` column is unique, and `enqueue_tx`'s
/// `on conflict (idempotency_key) do nothing` is the reservation. A
/// separate `idempotency_keys` lookup would just be a second, racier check
/// of the same fact.
pub async fn phase_a(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    message_id: Uuid,
    aggregate_id: &str,
    payload: &CreditorDebtUpdatePayload,
) -> Result<PhaseAOutcome> {
    let payload_value = serde_json::to_value(payload).context("phase_a: payload serialization failed")?;
    let idempotency_key = cem_schemas::idempotency::build_key(AGGREGATE_TYPE, aggregate_id, &payload_value);

    let outbox_id = Uuid::new_v4();
    let enqueued = cem_db::outbox::enqueue_tx(
        tx,
        outbox_id,
        AGGREGATE_TYPE,
        aggregate_id,
        "UPDATE",
        &payload_value,
        &idempotency_key,
        DEFAULT_MAX_RETRIES,
    )
    .await
    .context("phase_a: outbox enqueue failed")?;

    if !enqueued {
        return Ok(PhaseAOutcome::AlreadyProcessed { idempotency_key });
    }

    cem_db::messages::set_idempotency_key_tx(tx, message_id, &idempotency_key).await?;
    cem_db::messages::set_sync_status_tx(tx, message_id, SyncStatus::Pending).await?;

    Ok(PhaseAOutcome::Enqueued { outbox_id, idempotency_key })
}

/// Builds the selectors and update the secondary-store adapter needs from
/// a Phase A payload.
fn build_update(payload: &CreditorDebtUpdatePayload) -> (ClientSelector, CreditorSelector, DebtUpdate) {
    let selector = match &payload.client_case_number {
        Some(az) => ClientSelector::CaseNumber(az.clone()),
        None => {
            let mut parts = payload.client_name.split_whitespace();
            let first = parts.next().unwrap_or_default().to_string();
            let last = parts.last().unwrap_or_default().to_string();
            ClientSelector::Name { first, last }
        }
    };
    let creditor = CreditorSelector {
        creditor_name: payload.creditor_name.clone(),
        creditor_email: payload.creditor_email.clone(),
    };
    let update = DebtUpdate {
        amount: payload.new_debt_amount,
        source: "email_reply",
        response_timestamp: payload.response_timestamp,
        response_text: payload.response_text.clone(),
        reference_numbers: payload.reference_numbers.clone(),
        extraction_confidence: payload.extraction_confidence,
    };
    (selector, creditor, update)
}

/// Phase B (§4.10): reads back one outbox row, invokes the secondary
/// store, and records the outcome. Takes only a `PgPool` and a trait
/// object — never a transaction handle, so it can never be fused into
/// Phase A's atomic block. Looked up by idempotency key since that's the
/// only unique handle `phase_a` hands back.
pub async fn phase_b(pool: &PgPool, store: &dyn SecondaryStoreAdapter, message_id: Uuid, idempotency_key: &str) -> Result<bool> {
    let Some(outbox_row) = cem_db::outbox::get_by_idempotency_key(pool, idempotency_key).await? else {
        anyhow::bail!("phase_b: outbox row not found for key {idempotency_key}");
    };

    let payload: CreditorDebtUpdatePayload =
        serde_json::from_value(outbox_row.payload.clone()).context("phase_b: payload deserialization failed")?;
    let (selector, creditor, update) = build_update(&payload);

    match store.update_creditor_debt(selector, creditor, update).await {
        Ok(_applied) => {
            cem_db::outbox::mark_processed(pool, outbox_row.id).await?;
            cem_db::messages::set_sync_status(pool, message_id, SyncStatus::Synced).await?;
            cem_db::idempotency::store_result(pool, idempotency_key, &serde_json::json!({"status": "synced"})).await?;
            Ok(true)
        }
        Err(err) => {
            tracing::warn!(error = %err, outbox_id = %outbox_row.id, "phase_b_secondary_store_write_failed");
            cem_db::outbox::mark_failed(pool, outbox_row.id, &err.to_string()).await?;
            cem_db::messages::set_sync_status(pool, message_id, SyncStatus::Failed).await?;
            Ok(false)
        }
    }
}

#[cfg(feature = "runtime-claim")]
/// Drains up to `batch_size` claimable outbox rows (§4.10 "retried by the
/// reconciler"), used by both `cem-reconcile`'s hourly sweep and an
/// at-least-once retry path.
pub async fn drain_batch(pool: &PgPool, store: &dyn SecondaryStoreAdapter, batch_size: i64, claimant_id: &str) -> Result<usize> {
    let claimed = cem_db::outbox::claim_batch(pool, batch_size, claimant_id).await?;
    let mut succeeded = 0;
    for row in claimed {
        let payload: CreditorDebtUpdatePayload = match serde_json::from_value(row.payload.clone()) {
            Ok(p) => p,
            Err(err) => {
                cem_db::outbox::mark_failed(pool, row.id, &format!("payload_deserialize_failed: {err}")).await?;
                continue;
            }
        };
        let (selector, creditor, update) = build_update(&payload);
        match store.update_creditor_debt(selector, creditor, update).await {
            Ok(_) => {
                cem_db::outbox::mark_processed(pool, row.id).await?;
                cem_db::idempotency::store_result(pool, &row.idempotency_key, &serde_json::json!({"status": "synced"})).await?;
                succeeded += 1;
            }
            Err(err) => {
                cem_db::outbox::mark_failed(pool, row.id, &err.to_string()).await?;
            }
        }
    }
    Ok(succeeded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn payload(case_number: Option<&str>) -> CreditorDebtUpdatePayload {
        CreditorDebtUpdatePayload {
            client_name: "Max Mustermann".to_string(),
            client_case_number: case_number.map(str::to_string),
            creditor_email: "forderung@inkasso.de".to_string(),
            creditor_name: "Inkasso GmbH".to_string(),
            new_debt_amount: Decimal::from_str("500.00").unwrap(),
            response_text: Some("Restschuld 500,00 EUR".to_string()),
            reference_numbers: vec!["AZ-123".to_string()],
            extraction_confidence: Some(0.9),
            response_timestamp: Utc::now(),
        }
    }

    #[test]
    fn build_update_prefers_case_number_selector_when_present() {
        let (selector, creditor, update) = build_update(&payload(Some("AZ-999")));
        match selector {
            ClientSelector::CaseNumber(az) => assert_eq!(az, "AZ-999"),
            other => panic!("expected CaseNumber selector, got {other:?}"),
        }
        assert_eq!(creditor.creditor_name, "Inkasso GmbH");
        assert_eq!(update.amount, Decimal::from_str("500.00").unwrap());
    }

    #[test]
    fn build_update_falls_back_to_name_selector_without_case_number() {
        let (selector, _creditor, _update) = build_update(&payload(None));
        match selector {
            ClientSelector::Name { first, last } => {
                assert_eq!(first, "Max");
                assert_eq!(last, "Mustermann");
            }
            other => panic!("expected Name selector, got {other:?}"),
        }
    }

    #[test]
    fn build_update_carries_reference_numbers_through() {
        let (_selector, _creditor, update) = build_update(&payload(None));
        assert_eq!(update.reference_numbers, vec!["AZ-123".to_string()]);
        assert_eq!(update.source, "email_reply");
    }
}
