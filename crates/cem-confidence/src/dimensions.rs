//! Dimension calculators (§4.8): extraction quality (weakest-link over
//! per-source baselines) and match quality (derived from the matching
//! engine's decision status).

use cem_schemas::calibration::{AMBIGUOUS_MATCH_PENALTY, EXTRACTION_CONFIDENCE_FLOOR, EXTRACTION_MISSING_FIELD_PENALTY};
use cem_schemas::extraction::{ConsolidatedExtraction, SourceExtraction};
use cem_schemas::matching::MatchDecisionStatus;

/// Weakest-link extraction confidence: the lowest quality baseline among
/// every source that actually contributed, minus a penalty per missing key
/// field on the consolidated result, floored at 0.30.
pub fn extraction_confidence(sources: &[SourceExtraction], consolidated: &ConsolidatedExtraction) -> f64 {
    let baseline = sources
        .iter()
        .filter(|s| s.extraction_method != cem_schemas::extraction::ExtractionMethod::Skipped)
        .map(|s| s.extraction_method.quality_baseline())
        .fold(f64::MAX, f64::min);
    let baseline = if baseline.is_finite() { baseline } else { cem_schemas::extraction::ExtractionMethod::Skipped.quality_baseline() };

    let mut missing = 0;
    if consolidated.used_default_amount {
        missing += 1;
    }
    if consolidated.client_name.is_none() {
        missing += 1;
    }
    if consolidated.creditor_name.is_none() {
        missing += 1;
    }

    (baseline - EXTRACTION_MISSING_FIELD_PENALTY * missing as f64).max(EXTRACTION_CONFIDENCE_FLOOR)
}

/// Match confidence derived from the matching engine's decision (§4.8).
pub fn match_confidence(status: MatchDecisionStatus, total_score: Option<f64>) -> f64 {
    match status {
        MatchDecisionStatus::NoCandidates | MatchDecisionStatus::NoRecentInquiry => 0.0,
        MatchDecisionStatus::AutoMatched | MatchDecisionStatus::BelowThreshold => total_score.unwrap_or(0.0),
        MatchDecisionStatus::Ambiguous => total_score.unwrap_or(0.0) * (1.0 - AMBIGUOUS_MATCH_PENALTY),
    }
}

/// Overall confidence (§4.8): the minimum of the two dimensions. The intent
/// dimension is optional and excluded by default per spec.
pub fn overall_confidence(extraction: f64, matching: f64) -> f64 {
    extraction.min(matching)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cem_schemas::calibration::ConfidenceBucket;
    use cem_schemas::extraction::{ExtractionMethod, Gesamtforderung};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn source(method: ExtractionMethod) -> SourceExtraction {
        SourceExtraction {
            source_type: "attachment".to_string(),
            source_name: "x".to_string(),
            gesamtforderung: None,
            components: Vec::new(),
            client_name: None,
            creditor_name: None,
            extraction_method: method,
            tokens_used: 0,
            error: None,
        }
    }

    fn consolidated(used_default: bool, client: Option<&str>, creditor: Option<&str>) -> ConsolidatedExtraction {
        ConsolidatedExtraction {
            gesamtforderung: Gesamtforderung {
                value: Decimal::from_str("100.00").unwrap(),
                currency: "EUR".to_string(),
                raw_text: "100,00 EUR".to_string(),
                source: "body".to_string(),
                confidence: ConfidenceBucket::Low,
            },
            client_name: client.map(str::to_string),
            creditor_name: creditor.map(str::to_string),
            confidence: ConfidenceBucket::Medium,
            sources_processed: 1,
            sources_with_amount: 1,
            total_tokens_used: 0,
            used_default_amount: used_default,
        }
    }

    #[test]
    fn weakest_link_picks_lowest_baseline() {
        let sources = vec![source(ExtractionMethod::PdfDigital), source(ExtractionMethod::ImageVision)];
        let c = consolidated(false, Some("a"), Some("b"));
        assert_eq!(extraction_confidence(&sources, &c), 0.70);
    }

    #[test]
    fn missing_fields_reduce_confidence_and_floor_applies() {
        let sources = vec![source(ExtractionMethod::ImageVision)];
        let c = consolidated(true, None, None);
        // 0.70 - 0.10*3 = 0.40, above the 0.30 floor
        assert_eq!(extraction_confidence(&sources, &c), 0.40);
    }

    #[test]
    fn no_recent_inquiry_scores_zero_match_confidence() {
        assert_eq!(match_confidence(MatchDecisionStatus::NoRecentInquiry, None), 0.0);
    }

    #[test]
    fn ambiguous_applies_thirty_percent_penalty() {
        assert!((match_confidence(MatchDecisionStatus::Ambiguous, Some(0.80)) - 0.56).abs() < 1e-9);
    }

    #[test]
    fn overall_is_the_minimum_of_both_dimensions() {
        assert_eq!(overall_confidence(0.9, 0.6), 0.6);
    }
}
