//! Confidence scoring and routing (§4.8): combines extraction quality and
//! match quality into one overall score, then decides what the worker does
//! about it.

pub mod dimensions;
pub mod router;

use cem_schemas::extraction::{ConsolidatedExtraction, SourceExtraction};
use cem_schemas::matching::MatchDecisionStatus;
use cem_schemas::message::ConfidenceDimensions;

pub struct ScoredConfidence {
    pub extraction: f64,
    pub matching: f64,
    pub overall: f64,
    pub route: router::RouteDecision,
}

/// Scores and routes one message given its extraction and matching
/// results. Persisting the outcome onto the message row is the caller's
/// job (`cem-worker`).
pub fn score(
    sources: &[SourceExtraction],
    consolidated: &ConsolidatedExtraction,
    match_status: MatchDecisionStatus,
    match_score: Option<f64>,
    thresholds: &router::RouterThresholds,
) -> ScoredConfidence {
    let extraction = dimensions::extraction_confidence(sources, consolidated);
    let matching = dimensions::match_confidence(match_status, match_score);
    let overall = dimensions::overall_confidence(extraction, matching);
    let route = router::route(overall, thresholds);

    ScoredConfidence { extraction, matching, overall, route }
}

impl ScoredConfidence {
    pub fn as_dimensions(&self) -> ConfidenceDimensions {
        ConfidenceDimensions {
            extraction: Some(self.extraction),
            overall: Some(self.overall),
            route_label: Some(self.route.action.as_str().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cem_schemas::calibration::ConfidenceBucket;
    use cem_schemas::extraction::{ExtractionMethod, Gesamtforderung};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn full_pipeline_scores_and_routes() {
        let sources = vec![SourceExtraction {
            source_type: "body".to_string(),
            source_name: "body".to_string(),
            gesamtforderung: None,
            components: Vec::new(),
            client_name: None,
            creditor_name: None,
            extraction_method: ExtractionMethod::PdfDigital,
            tokens_used: 0,
            error: None,
        }];
        let consolidated = ConsolidatedExtraction {
            gesamtforderung: Gesamtforderung {
                value: Decimal::from_str("250.00").unwrap(),
                currency: "EUR".to_string(),
                raw_text: "250,00 EUR".to_string(),
                source: "body".to_string(),
                confidence: ConfidenceBucket::High,
            },
            client_name: Some("Max Mustermann".to_string()),
            creditor_name: Some("Inkasso GmbH".to_string()),
            confidence: ConfidenceBucket::High,
            sources_processed: 1,
            sources_with_amount: 1,
            total_tokens_used: 10,
            used_default_amount: false,
        };
        let thresholds = router::RouterThresholds { high: 0.85, low: 0.60 };
        let scored = score(&sources, &consolidated, MatchDecisionStatus::AutoMatched, Some(0.95), &thresholds);
        assert_eq!(scored.route.action, router::RouteAction::AutoUpdate);
        assert_eq!(scored.extraction, 0.95);
    }
}
