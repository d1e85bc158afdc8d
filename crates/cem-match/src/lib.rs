//! Matching engine (§4.7): ranks outbound inquiries sent in the lookback
//! window against one inbound message's extracted signals, and produces the
//! persisted `MatchResult` rows plus the top decision.

pub mod decision;
pub mod explain;
pub mod signals;
pub mod strategies;
pub mod thresholds;

use anyhow::Result;
use chrono::{DateTime, Utc};
use cem_schemas::matching::{MatchDecisionStatus, MatchResult, MATCH_LOOKBACK_DAYS};
use sqlx::PgPool;
use uuid::Uuid;

use decision::ScoredCandidate;
use explain::SignalDetail;

pub struct MatchOutcome {
    pub status: MatchDecisionStatus,
    pub gap: f64,
    pub selected_inquiry_id: Option<Uuid>,
    pub top_score: Option<f64>,
    pub results: Vec<MatchResult>,
}

/// Simple score-to-tier label for the per-candidate `confidence_tier`
/// column; the message-level routing decision is `cem-confidence`'s job,
/// this only labels individual rows for operator readability.
fn tier_label(score: f64) -> &'static str {
    if score >= 0.85 {
        "high"
    } else if score >= 0.60 {
        "medium"
    } else {
        "low"
    }
}

#[allow(clippy::too_many_arguments)]
fn build_match_result(message_id: Uuid, candidate: &ScoredCandidate<'_>, rank: i32, selected: bool, gap: Option<f64>, extracted_name: &str, extracted_references: &[String], weights: &strategies::Weights) -> MatchResult {
    let reference_extracted = extracted_references.first().map(String::as_str).unwrap_or("");
    let detail_name = SignalDetail {
        score: candidate.name_score,
        weighted_score: candidate.name_score * weights.client_name,
        inquiry_value: &candidate.inquiry.client_name,
        extracted_value: extracted_name,
        algorithm: "max(token_sort, partial, token_set)",
    };
    let detail_reference = SignalDetail {
        score: candidate.reference_score,
        weighted_score: candidate.reference_score * weights.reference_number,
        inquiry_value: candidate.inquiry.reference_number.as_deref().unwrap_or(""),
        extracted_value: reference_extracted,
        algorithm: "exact_or_max(partial, token_sort)",
    };

    let scoring_details = explain::build(
        "scored",
        candidate.total_score,
        gap.unwrap_or(0.0),
        0.0,
        &detail_name,
        &detail_reference,
        weights,
        candidate.inquiry.id,
        candidate.inquiry.sent_at,
    );

    let component_scores = serde_json::json!({
        "client_name": candidate.name_score,
        "reference_number": candidate.reference_score,
        "overridden": candidate.overridden,
    });

    MatchResult {
        id: Uuid::new_v4(),
        message_id,
        inquiry_id: candidate.inquiry.id,
        total_score: candidate.total_score,
        confidence_tier: tier_label(candidate.total_score).to_string(),
        component_scores,
        scoring_details,
        ambiguity_gap: gap,
        rank,
        selected,
        selection_method: "combined".to_string(),
    }
}

/// Runs the matching pass for one message and persists the ranked
/// candidate list. Returns the top-line outcome for the caller (worker/
/// confidence scorer) to act on.
pub async fn match_message(
    pool: &PgPool,
    message_id: Uuid,
    sender_email: &str,
    received_at: DateTime<Utc>,
    extracted_name: &str,
    extracted_references: &[String],
    category: &str,
) -> Result<MatchOutcome> {
    let candidates = cem_db::inquiries::candidates_within_lookback(pool, received_at, MATCH_LOOKBACK_DAYS).await?;
    if candidates.is_empty() {
        return Ok(MatchOutcome {
            status: MatchDecisionStatus::NoRecentInquiry,
            gap: 0.0,
            selected_inquiry_id: None,
            top_score: None,
            results: Vec::new(),
        });
    }

    let resolved = thresholds::resolve(pool, category).await?;
    let outcome = decision::decide(&candidates, sender_email, extracted_name, extracted_references, &resolved);

    let top3: Vec<&ScoredCandidate<'_>> = outcome.ranked.iter().take(3).collect();
    let selected_inquiry_id = if outcome.status == MatchDecisionStatus::AutoMatched {
        outcome.ranked.first().map(|c| c.inquiry.id)
    } else {
        None
    };
    let top_score = outcome.ranked.first().map(|c| c.total_score);

    let results: Vec<MatchResult> = top3
        .iter()
        .enumerate()
        .map(|(idx, candidate)| {
            let rank = idx as i32 + 1;
            let selected = selected_inquiry_id == Some(candidate.inquiry.id);
            let gap = if idx == 0 { Some(outcome.gap) } else { None };
            build_match_result(message_id, candidate, rank, selected, gap, extracted_name, extracted_references, &resolved.weights)
        })
        .collect();

    cem_db::matching::insert_batch(pool, &results).await?;

    Ok(MatchOutcome { status: outcome.status, gap: outcome.gap, selected_inquiry_id, top_score, results })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_label_thresholds_match_router_defaults() {
        assert_eq!(tier_label(0.9), "high");
        assert_eq!(tier_label(0.7), "medium");
        assert_eq!(tier_label(0.3), "low");
    }
}
