//! Agent 3 — consolidation (§4.6), grounded in `original_source/app/actors/
//! consolidation_agent.py` and `original_source/app/services/validation/
//! conflict_detector.py`. Compares Agent 2's consolidated extraction against
//! the secondary store's view of the client/creditor and flags conflicts
//! rather than blocking the pipeline on them. The original matches the
//! creditor record by email; this crate's extraction engine only recovers a
//! creditor name, so the match is by name substring instead.

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use cem_capabilities::{SecondaryClient, SecondaryStoreAdapter, SecondaryStoreError};
use cem_schemas::calibration::ConfidenceBucket;
use cem_schemas::checkpoint::{stage, Checkpoint, ValidationStatus};
use serde::{Deserialize, Serialize};

use crate::extraction::Agent2Result;

/// `|extracted - existing| / existing > 0.10` (§4.6).
pub const AMOUNT_CONFLICT_THRESHOLD: f64 = 0.10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub field: String,
    pub extracted_value: String,
    pub existing_value: String,
    pub difference_percent: Option<f64>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent3Result {
    pub final_amount: Decimal,
    pub client_name: Option<String>,
    pub creditor_name: Option<String>,
    pub conflicts: Vec<Conflict>,
    pub confidence: f64,
    pub needs_review: bool,
    pub sources_processed: u32,
    pub total_tokens_used: u32,
}

/// `consolidation_agent.py`'s string-to-float confidence mapping; unknown
/// buckets (there are none in the enum, but this mirrors the Python
/// default) fall back to 0.7.
fn confidence_bucket_to_score(bucket: ConfidenceBucket) -> f64 {
    match bucket {
        ConfidenceBucket::High => 0.9,
        ConfidenceBucket::Medium => 0.7,
        ConfidenceBucket::Low => 0.5,
    }
}

struct ExistingData {
    debt_amount: Option<Decimal>,
    client_name: Option<String>,
    creditor_name: Option<String>,
}

/// Finds the creditor record whose name either contains, or is contained
/// by, the extracted creditor name — mirrors the substring match
/// `consolidation_agent.py` does on `sender_email`, adapted to `sender_name`
/// since this crate's extraction engine doesn't recover a creditor email
/// address, only a name (§4.4/§4.5).
fn find_matching_creditor<'a>(client: &'a SecondaryClient, creditor_name: &str) -> Option<&'a cem_capabilities::SecondaryCreditorRecord> {
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

fn detect_conflicts(extracted_amount: Decimal, extracted_client: Option<&str>, extracted_creditor: Option<&str>, existing: &ExistingData) -> Vec<Conflict> {
    let mut conflicts = Vec::new();

    if let Some(existing_amount) = existing.debt_amount {
        if existing_amount > Decimal::ZERO {
            let diff_percent = ((extracted_amount - existing_amount).abs() / existing_amount)
                .to_string()
                .parse::<f64>()
                .unwrap_or(0.0);
            if diff_percent > AMOUNT_CONFLICT_THRESHOLD {
                conflicts.push(Conflict {
                    field: "gesamtforderung".to_string(),
                    extracted_value: extracted_amount.to_string(),
                    existing_value: existing_amount.to_string(),
                    difference_percent: Some((diff_percent * 100.0 * 100.0).round() / 100.0),
                    reason: format!("Amount differs by more than {}%", (AMOUNT_CONFLICT_THRESHOLD * 100.0) as i64),
                });
            }
        }
    }

    if let (Some(extracted), Some(existing_name)) = (extracted_client, existing.client_name.as_deref()) {
        if extracted.to_lowercase().trim() != existing_name.to_lowercase().trim() {
            conflicts.push(Conflict {
                field: "client_name".to_string(),
                extracted_value: extracted.to_string(),
                existing_value: existing_name.to_string(),
                difference_percent: None,
                reason: "Client names do not match".to_string(),
            });
        }
    }

    if let (Some(extracted), Some(existing_name)) = (extracted_creditor, existing.creditor_name.as_deref()) {
        if extracted.to_lowercase().trim() != existing_name.to_lowercase().trim() {
            conflicts.push(Conflict {
                field: "creditor_name".to_string(),
                extracted_value: extracted.to_string(),
                existing_value: existing_name.to_string(),
                difference_percent: None,
                reason: "Creditor names do not match".to_string(),
            });
        }
    }

    conflicts
}

async fn lookup_client(
    store: &dyn SecondaryStoreAdapter,
    ticket_id: Option<&str>,
    client_name: Option<&str>,
) -> Result<Option<SecondaryClient>, SecondaryStoreError> {
    if let Some(ticket_id) = ticket_id {
        if let Some(client) = store.get_client_by_ticket(ticket_id).await? {
            return Ok(Some(client));
        }
    }
    if let Some(full_name) = client_name {
        let mut parts = full_name.split_whitespace();
        if let (Some(first), Some(last)) = (parts.next(), parts.last()) {
            return store.get_client_by_name(first, last).await;
        }
    }
    Ok(None)
}

/// Idempotent entry point: returns the cached checkpoint result on replay,
/// otherwise compares Agent 2's output against the secondary store and
/// persists a fresh checkpoint.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    pool: &PgPool,
    store: &dyn SecondaryStoreAdapter,
    message_id: Uuid,
    ticket_id: Option<&str>,
    agent2: &Agent2Result,
) -> anyhow::Result<Agent3Result> {
    if let Some(checkpoint) = cem_db::checkpoints::get(pool, message_id, stage::AGENT_3_CONSOLIDATION).await? {
        if checkpoint.is_replay_skippable() {
            return Ok(serde_json::from_value(checkpoint.payload)?);
        }
    }

    let extracted_amount = agent2.consolidated.gesamtforderung.value;
    let extracted_client = agent2.consolidated.client_name.as_deref();
    let extracted_creditor = agent2.consolidated.creditor_name.as_deref();

    let client = match lookup_client(store, ticket_id, extracted_client).await {
        Ok(client) => client,
        Err(err) => {
            tracing::warn!(error = %err, "secondary_store_lookup_failed");
            None
        }
    };

    let existing = match &client {
        Some(client) => {
            let matching_creditor = extracted_creditor.and_then(|name| find_matching_creditor(client, name));
            ExistingData {
                debt_amount: matching_creditor.and_then(|c| c.claim_amount),
                client_name: Some(format!("{} {}", client.first_name, client.last_name)),
                creditor_name: matching_creditor.map(|c| c.sender_name.clone()),
            }
        }
        None => ExistingData { debt_amount: None, client_name: None, creditor_name: None },
    };

    let conflicts = detect_conflicts(extracted_amount, extracted_client, extracted_creditor, &existing);

    let confidence = confidence_bucket_to_score(agent2.consolidated.confidence);
    let confidence_needs_review = confidence < crate::intent::INTENT_CONFIDENCE_THRESHOLD;
    let needs_review = !conflicts.is_empty() || confidence_needs_review || agent2.needs_review;

    let result = Agent3Result {
        final_amount: extracted_amount,
        client_name: extracted_client.map(str::to_string).or(existing.client_name),
        creditor_name: extracted_creditor.map(str::to_string).or(existing.creditor_name),
        conflicts,
        confidence,
        needs_review,
        sources_processed: agent2.consolidated.sources_processed,
        total_tokens_used: agent2.consolidated.total_tokens_used,
    };

    let validation_status = if result.needs_review { ValidationStatus::NeedsReview } else { ValidationStatus::Passed };
    let checkpoint = Checkpoint::new(serde_json::to_value(&result)?, validation_status);
    cem_db::checkpoints::save(pool, message_id, stage::AGENT_3_CONSOLIDATION, &checkpoint).await?;

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn existing(amount: &str, client: &str, creditor: &str) -> ExistingData {
        ExistingData {
            debt_amount: Some(amount.parse().unwrap()),
            client_name: Some(client.to_string()),
            creditor_name: Some(creditor.to_string()),
        }
    }

    #[test]
    fn amount_conflict_detected_past_ten_percent() {
        let existing = existing("100.00", "Max Mustermann", "Inkasso GmbH");
        let conflicts = detect_conflicts("150.00".parse().unwrap(), Some("Max Mustermann"), Some("Inkasso GmbH"), &existing);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].field, "gesamtforderung");
    }

    #[test]
    fn amount_within_tolerance_has_no_conflict() {
        let existing = existing("100.00", "Max Mustermann", "Inkasso GmbH");
        let conflicts = detect_conflicts("105.00".parse().unwrap(), Some("Max Mustermann"), Some("Inkasso GmbH"), &existing);
        assert!(conflicts.is_empty());
    }

    #[test]
    fn client_name_mismatch_is_case_and_whitespace_insensitive() {
        let existing = existing("100.00", "Max Mustermann", "Inkasso GmbH");
        let conflicts = detect_conflicts("100.00".parse().unwrap(), Some(" max mustermann "), Some("Inkasso GmbH"), &existing);
        assert!(conflicts.is_empty());
    }

    #[test]
    fn creditor_name_conflict_detected() {
        let existing = existing("100.00", "Max Mustermann", "Inkasso GmbH");
        let conflicts = detect_conflicts("100.00".parse().unwrap(), Some("Max Mustermann"), Some("Andere Firma"), &existing);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].field, "creditor_name");
    }

    #[test]
    fn confidence_bucket_mapping_matches_original() {
        assert_eq!(confidence_bucket_to_score(ConfidenceBucket::High), 0.9);
        assert_eq!(confidence_bucket_to_score(ConfidenceBucket::Medium), 0.7);
        assert_eq!(confidence_bucket_to_score(ConfidenceBucket::Low), 0.5);
    }

    #[test]
    fn matching_creditor_found_by_name_substring() {
        let client = SecondaryClient {
            id: "1".to_string(),
            first_name: "Max".to_string(),
            last_name: "Mustermann".to_string(),
            case_number: None,
            creditors: vec![cem_capabilities::SecondaryCreditorRecord {
                sender_name: "Inkasso GmbH".to_string(),
                sender_email: "forderung@inkasso-gmbh.de".to_string(),
                claim_amount: Some("250.00".parse().unwrap()),
            }],
        };
        let found = find_matching_creditor(&client, "Andere Firma");
        assert!(found.is_none());
        let found = find_matching_creditor(&client, "Inkasso GmbH Rechtsabteilung");
        assert!(found.is_some());
    }
}
