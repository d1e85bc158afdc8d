//! Explainability JSON builder (§3 `MatchResult.scoring_details`, §4.7
//! schema version `v2.0`).

use cem_schemas::matching::EXPLAINABILITY_SCHEMA_VERSION;
use serde_json::{json, Value};

use crate::strategies::Weights;

pub struct SignalDetail<'a> {
    pub score: f64,
    pub weighted_score: f64,
    pub inquiry_value: &'a str,
    pub extracted_value: &'a str,
    pub algorithm: &'a str,
}

#[allow(clippy::too_many_arguments)]
pub fn build(
    match_status: &str,
    final_score: f64,
    gap: f64,
    gap_threshold: f64,
    client_name: &SignalDetail<'_>,
    reference_number: &SignalDetail<'_>,
    weights: &Weights,
    inquiry_id: uuid::Uuid,
    inquiry_sent_at: chrono::DateTime<chrono::Utc>,
) -> Value {
    json!({
        "schema_version": EXPLAINABILITY_SCHEMA_VERSION,
        "match_status": match_status,
        "final_score": final_score,
        "gap": gap,
        "gap_threshold": gap_threshold,
        "signals": {
            "client_name": {
                "score": client_name.score,
                "weighted_score": client_name.weighted_score,
                "inquiry_value": client_name.inquiry_value,
                "extracted_value": client_name.extracted_value,
                "algorithm": client_name.algorithm,
            },
            "reference_number": {
                "score": reference_number.score,
                "weighted_score": reference_number.weighted_score,
                "inquiry_value": reference_number.inquiry_value,
                "extracted_value": reference_number.extracted_value,
                "algorithm": reference_number.algorithm,
            },
        },
        "weights": {
            "client_name": weights.client_name,
            "reference_number": weights.reference_number,
        },
        "filters_applied": {
            "creditor_inquiries_window_days": cem_schemas::matching::MATCH_LOOKBACK_DAYS,
            "both_signals_required": true,
        },
        "inquiry_id": inquiry_id,
        "inquiry_sent_at": inquiry_sent_at,
    })
}
