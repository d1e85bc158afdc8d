use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Outcome label for a matching decision (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchDecisionStatus {
    AutoMatched,
    Ambiguous,
    BelowThreshold,
    NoRecentInquiry,
    NoCandidates,
}

impl MatchDecisionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AutoMatched => "auto_matched",
            Self::Ambiguous => "ambiguous",
            Self::BelowThreshold => "below_threshold",
            Self::NoRecentInquiry => "no_recent_inquiry",
            Self::NoCandidates => "no_candidates",
        }
    }

    pub fn needs_review(self) -> bool {
        !matches!(self, Self::AutoMatched)
    }
}

/// Per-candidate scoring record persisted for every ranked candidate (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub id: Uuid,
    pub message_id: Uuid,
    pub inquiry_id: Uuid,
    pub total_score: f64,
    pub confidence_tier: String,
    pub component_scores: Value,
    pub scoring_details: Value,
    pub ambiguity_gap: Option<f64>,
    pub rank: i32,
    pub selected: bool,
    pub selection_method: String,
}

/// Runtime-tunable threshold row, keyed `(category, threshold_type,
/// weight_name?)` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingThreshold {
    pub category: String,
    pub threshold_type: String,
    pub weight_name: Option<String>,
    pub value: Decimal,
}

/// Compiled-in defaults, used when the database holds neither a
/// category-specific nor a `default` row (§4.7, three-level fallback).
pub const DEFAULT_MIN_MATCH: f64 = 0.70;
pub const DEFAULT_GAP_THRESHOLD: f64 = 0.15;
pub const DEFAULT_WEIGHT_CLIENT_NAME: f64 = 0.40;
pub const DEFAULT_WEIGHT_REFERENCE_NUMBER: f64 = 0.60;
/// Name-only override threshold (§4.7 strategies, §9 Open Question: kept as
/// a compiled constant, not promoted to the threshold manager — see
/// DESIGN.md "Open Question Decisions").
pub const NAME_ONLY_OVERRIDE_THRESHOLD: f64 = 0.85;
pub const NAME_ONLY_OVERRIDE_PENALTY: f64 = 0.7;
pub const MATCH_LOOKBACK_DAYS: i64 = 30;
pub const EXPLAINABILITY_SCHEMA_VERSION: &str = "v2.0";
