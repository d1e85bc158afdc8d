//! Candidate selection, scoring, ranking, and decision logic (§4.7). Pure
//! functions over an already-fetched candidate pool; `cem-match`'s `lib.rs`
//! owns the DB fetch and persistence.

use cem_schemas::inquiry::OutboundInquiry;
use cem_schemas::matching::{MatchDecisionStatus, NAME_ONLY_OVERRIDE_PENALTY, NAME_ONLY_OVERRIDE_THRESHOLD};

use crate::signals::{name_score, reference_score};
use crate::strategies::{score as strategy_score, Strategy};
use crate::thresholds::ResolvedThresholds;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionTier {
    ExactEmail,
    Domain,
    All,
}

fn domain_of(email: &str) -> Option<String> {
    email.split('@').nth(1).map(|d| d.to_lowercase())
}

/// Selection priority (§4.7): exact `creditor_email` match, then domain
/// match, then every candidate in the lookback window.
pub fn select_pool<'a>(candidates: &'a [OutboundInquiry], sender_email: &str) -> (Vec<&'a OutboundInquiry>, SelectionTier) {
    let sender_email = sender_email.trim().to_lowercase();

    let exact: Vec<&OutboundInquiry> = candidates
        .iter()
        .filter(|c| c.creditor_email.trim().to_lowercase() == sender_email)
        .collect();
    if !exact.is_empty() {
        return (exact, SelectionTier::ExactEmail);
    }

    if let Some(sender_domain) = domain_of(&sender_email) {
        let domain_matches: Vec<&OutboundInquiry> = candidates
            .iter()
            .filter(|c| domain_of(&c.creditor_email).as_deref() == Some(sender_domain.as_str()))
            .collect();
        if !domain_matches.is_empty() {
            return (domain_matches, SelectionTier::Domain);
        }
    }

    (candidates.iter().collect(), SelectionTier::All)
}

#[derive(Debug, Clone)]
pub struct ScoredCandidate<'a> {
    pub inquiry: &'a OutboundInquiry,
    pub total_score: f64,
    pub name_score: f64,
    pub reference_score: f64,
    pub overridden: bool,
}

fn score_pool<'a>(pool: &[&'a OutboundInquiry], extracted_name: &str, extracted_references: &[String], weights: &ResolvedThresholds) -> Vec<ScoredCandidate<'a>> {
    pool.iter()
        .map(|inquiry| {
            let name = name_score(extracted_name, &inquiry.client_name);
            let reference = reference_score(extracted_references, inquiry.reference_number.as_deref());
            let total = strategy_score(
                Strategy::Combined,
                name,
                reference,
                &weights.weights,
                NAME_ONLY_OVERRIDE_THRESHOLD,
                NAME_ONLY_OVERRIDE_PENALTY,
            );
            ScoredCandidate { inquiry, total_score: total, name_score: name, reference_score: reference, overridden: false }
        })
        .collect()
}

pub struct Decision<'a> {
    pub status: MatchDecisionStatus,
    pub ranked: Vec<ScoredCandidate<'a>>,
    pub gap: f64,
}

/// Full decision pipeline over a non-empty lookback-window candidate list
/// (§4.7 steps 1-5). The caller is responsible for the empty-window
/// `no_recent_inquiry` case, since that doesn't require scoring at all.
pub fn decide<'a>(
    candidates: &'a [OutboundInquiry],
    sender_email: &str,
    extracted_name: &str,
    extracted_references: &[String],
    thresholds: &ResolvedThresholds,
) -> Decision<'a> {
    let (pool, tier) = select_pool(candidates, sender_email);
    let mut ranked = score_pool(&pool, extracted_name, extracted_references, thresholds);

    // Single-candidate override: an exact-email-matched lone candidate that
    // otherwise scores zero still has the email match as evidence.
    if ranked.len() == 1 && tier == SelectionTier::ExactEmail && ranked[0].total_score == 0.0 {
        ranked[0].total_score = 0.90;
        ranked[0].overridden = true;
    }

    ranked.sort_by(|a, b| b.total_score.partial_cmp(&a.total_score).unwrap_or(std::cmp::Ordering::Equal));

    let top = &ranked[0];
    if top.total_score < thresholds.min_match {
        return Decision { status: MatchDecisionStatus::BelowThreshold, gap: 0.0, ranked };
    }

    if ranked.len() == 1 {
        return Decision { status: MatchDecisionStatus::AutoMatched, gap: 1.0, ranked };
    }

    let top_creditor_email = ranked[0].inquiry.creditor_email.trim().to_lowercase();
    let next_distinct = ranked.iter().skip(1).find(|c| c.inquiry.creditor_email.trim().to_lowercase() != top_creditor_email);

    let (gap, status) = match next_distinct {
        None => (1.0, MatchDecisionStatus::AutoMatched),
        Some(next) => {
            let gap = ranked[0].total_score - next.total_score;
            if gap >= thresholds.gap_threshold {
                (gap, MatchDecisionStatus::AutoMatched)
            } else {
                (gap, MatchDecisionStatus::Ambiguous)
            }
        }
    };

    Decision { status, gap, ranked }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use uuid::Uuid;

    fn inquiry(creditor_email: &str, client_name: &str, reference: Option<&str>) -> OutboundInquiry {
        OutboundInquiry {
            id: Uuid::new_v4(),
            client_name: client_name.to_string(),
            client_name_normalized: client_name.to_lowercase(),
            creditor_name: "Creditor".to_string(),
            creditor_name_normalized: "creditor".to_string(),
            creditor_address: None,
            creditor_email: creditor_email.to_string(),
            debt_amount: Decimal::from_str("100.00").unwrap(),
            reference_number: reference.map(str::to_string),
            external_ticket_id: None,
            external_side_conversation_id: None,
            external_email_provider_id: None,
            sent_at: Utc::now(),
            status: "sent".to_string(),
        }
    }

    fn thresholds() -> ResolvedThresholds {
        ResolvedThresholds {
            min_match: 0.70,
            gap_threshold: 0.15,
            weights: crate::strategies::Weights { client_name: 0.40, reference_number: 0.60 },
        }
    }

    #[test]
    fn exact_name_and_reference_auto_matches() {
        let candidates = vec![inquiry("creditor@firma.de", "Max Mustermann", Some("AB-123"))];
        let decision = decide(&candidates, "creditor@firma.de", "Max Mustermann", &["AB-123".to_string()], &thresholds());
        assert_eq!(decision.status, MatchDecisionStatus::AutoMatched);
    }

    #[test]
    fn lone_exact_email_candidate_with_no_other_signal_is_overridden() {
        let candidates = vec![inquiry("creditor@firma.de", "Someone Else", None)];
        let decision = decide(&candidates, "creditor@firma.de", "Max Mustermann", &[], &thresholds());
        assert!(decision.ranked[0].overridden);
        assert_eq!(decision.status, MatchDecisionStatus::AutoMatched);
    }

    #[test]
    fn below_threshold_when_top_score_too_low() {
        let candidates = vec![inquiry("other@firma.de", "Someone Else", None)];
        let decision = decide(&candidates, "creditor@firma.de", "Max Mustermann", &[], &thresholds());
        assert_eq!(decision.status, MatchDecisionStatus::BelowThreshold);
    }

    #[test]
    fn close_competing_candidates_are_ambiguous() {
        let candidates = vec![
            inquiry("a@firma.de", "Max Mustermann", None),
            inquiry("b@firma.de", "Max Mustermnn", None),
        ];
        let decision = decide(&candidates, "unknown@other.de", "Max Mustermann", &[], &thresholds());
        assert_eq!(decision.status, MatchDecisionStatus::Ambiguous);
    }

    #[test]
    fn repeated_inquiries_for_same_creditor_are_deduped_before_gap() {
        let candidates = vec![
            inquiry("creditor@firma.de", "Max Mustermann", Some("AB-123")),
            inquiry("creditor@firma.de", "Max Mustermann", Some("AB-123")),
        ];
        let decision = decide(&candidates, "creditor@firma.de", "Max Mustermann", &["AB-123".to_string()], &thresholds());
        assert_eq!(decision.status, MatchDecisionStatus::AutoMatched);
        assert_eq!(decision.gap, 1.0);
    }
}
