//! Drift scan (§4.12 step 2): for recently-synced messages, check that the
//! secondary store still agrees with what the primary store recorded.

use anyhow::Result;
use cem_capabilities::{ClientSelector, CreditorSelector, DebtUpdate, SecondaryStoreAdapter};
use cem_schemas::message::InboundMessage;
use cem_schemas::report::DriftKind;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sqlx::PgPool;

const DRIFT_WINDOW_HOURS: i64 = 48;

fn amount_mismatch_tolerance() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

pub struct DriftFinding {
    pub message_id: uuid::Uuid,
    pub kind: DriftKind,
    pub repaired: bool,
    pub detail: Value,
}

/// Runs the drift scan over messages synced in the default 48h window
/// (§4.12 step 2). Skipped entirely by the caller when the secondary store
/// is unreachable.
pub async fn scan(pool: &PgPool, store: &dyn SecondaryStoreAdapter) -> Result<Vec<DriftFinding>> {
    scan_window(pool, store, Utc::now() - Duration::hours(DRIFT_WINDOW_HOURS)).await
}

/// Same scan, over a caller-chosen `since` cutoff (the auditor's
/// configurable lookback window).
pub async fn scan_window(pool: &PgPool, store: &dyn SecondaryStoreAdapter, since: chrono::DateTime<Utc>) -> Result<Vec<DriftFinding>> {
    let messages = cem_db::messages::list_synced_since(pool, since).await?;

    let mut findings = Vec::with_capacity(messages.len());
    for message in messages {
        findings.push(check_one(store, &message).await);
    }
    Ok(findings)
}

async fn check_one(store: &dyn SecondaryStoreAdapter, message: &InboundMessage) -> DriftFinding {
    let Some(extracted) = message.extracted_data.as_ref() else {
        return DriftFinding {
            message_id: message.id,
            kind: DriftKind::Consistent,
            repaired: false,
            detail: json!({"reason": "no_extracted_data"}),
        };
    };

    let client = match lookup_client(store, extracted.client_name.as_deref()).await {
        Some(c) => c,
        None => {
            return DriftFinding {
                message_id: message.id,
                kind: DriftKind::MissingInSecondary,
                repaired: false,
                detail: json!({"client_name": extracted.client_name}),
            }
        }
    };

    let creditor_name = extracted.creditor_name.as_deref().unwrap_or("");
    let matching_creditor = find_matching_creditor(&client, creditor_name);

    let Some(matched) = matching_creditor else {
        return DriftFinding {
            message_id: message.id,
            kind: DriftKind::MissingCreditorInSecondary,
            repaired: attempt_repair(store, &client, extracted, creditor_name).await,
            detail: json!({"creditor_name": creditor_name}),
        };
    };

    let primary_amount = extracted.gesamtforderung.unwrap_or_default();
    let secondary_amount = matched.claim_amount.unwrap_or_default();
    if (primary_amount - secondary_amount).abs() > amount_mismatch_tolerance() {
        return DriftFinding {
            message_id: message.id,
            kind: DriftKind::DataMismatch,
            repaired: attempt_repair(store, &client, extracted, creditor_name).await,
            detail: json!({"primary_amount": primary_amount.to_string(), "secondary_amount": secondary_amount.to_string()}),
        };
    }

    DriftFinding {
        message_id: message.id,
        kind: DriftKind::Consistent,
        repaired: false,
        detail: Value::Null,
    }
}

async fn lookup_client(store: &dyn SecondaryStoreAdapter, client_name: Option<&str>) -> Option<cem_capabilities::SecondaryClient> {
    let name = client_name?;
    let mut parts = name.split_whitespace();
    let first = parts.next()?.to_string();
    let last = parts.last().unwrap_or(&first).to_string();
    store.get_client_by_name(&first, &last).await.ok().flatten()
}

fn find_matching_creditor<'a>(client: &'a cem_capabilities::SecondaryClient, creditor_name: &str) -> Option<&'a cem_capabilities::SecondaryCreditorRecord> {
    let search_name = creditor_name.to_lowercase();
    let search_name = search_name.trim();
    if search_name.is_empty() {
        return None;
    }
    client.creditors.iter().find(|cred| {
        let cred_name = cred.sender_name.to_lowercase();
        let cred_name = cred_name.trim();
        !cred_name.is_empty() && (search_name.contains(cred_name) || cred_name.contains(search_name))
    })
}

async fn attempt_repair(
    store: &dyn SecondaryStoreAdapter,
    client: &cem_capabilities::SecondaryClient,
    extracted: &cem_schemas::message::ExtractedData,
    creditor_name: &str,
) -> bool {
    let Some(amount) = extracted.gesamtforderung else {
        return false;
    };
    let selector = match &client.case_number {
        Some(az) => ClientSelector::CaseNumber(az.clone()),
        None => ClientSelector::Name { first: client.first_name.clone(), last: client.last_name.clone() },
    };
    let creditor_email = client
        .creditors
        .iter()
        .find(|c| c.sender_name.eq_ignore_ascii_case(creditor_name))
        .map(|c| c.sender_email.clone())
        .unwrap_or_default();
    let creditor = CreditorSelector { creditor_name: creditor_name.to_string(), creditor_email };
    let update = DebtUpdate {
        amount,
        source: "reconciler_repair",
        response_timestamp: Utc::now(),
        response_text: None,
        reference_numbers: Vec::new(),
        extraction_confidence: None,
    };
    store.update_creditor_debt(selector, creditor, update).await.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cem_capabilities::SecondaryCreditorRecord;

    fn client_with_creditor(name: &str) -> cem_capabilities::SecondaryClient {
        cem_capabilities::SecondaryClient {
            id: "c1".to_string(),
            first_name: "Max".to_string(),
            last_name: "Mustermann".to_string(),
            case_number: None,
            creditors: vec![SecondaryCreditorRecord {
                sender_name: name.to_string(),
                sender_email: "forderung@inkasso.de".to_string(),
                claim_amount: Some(Decimal::new(10000, 2)),
            }],
        }
    }

    #[test]
    fn finds_creditor_by_name_substring() {
        let client = client_with_creditor("Inkasso GmbH");
        assert!(find_matching_creditor(&client, "inkasso gmbh rechtsabteilung").is_some());
    }

    #[test]
    fn no_match_when_no_creditor_overlaps() {
        let client = client_with_creditor("Inkasso GmbH");
        assert!(find_matching_creditor(&client, "Anwaltskanzlei Schmidt").is_none());
    }

    #[test]
    fn amount_mismatch_tolerance_is_one_cent() {
        assert_eq!(amount_mismatch_tolerance(), Decimal::new(1, 2));
    }
}
