use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceBucket {
    High,
    Medium,
    Low,
}

/// Compiled-in router tier defaults (§4.8), overridable through the same
/// threshold-lookup mechanism `cem-match` uses for matching thresholds.
pub const DEFAULT_CONFIDENCE_HIGH_THRESHOLD: f64 = 0.85;
pub const DEFAULT_CONFIDENCE_LOW_THRESHOLD: f64 = 0.60;
/// Ambiguous-match penalty applied to the match dimension (§4.8).
pub const AMBIGUOUS_MATCH_PENALTY: f64 = 0.30;
/// Per-missing-field penalty and floor applied to the extraction dimension
/// (§4.8).
pub const EXTRACTION_MISSING_FIELD_PENALTY: f64 = 0.10;
pub const EXTRACTION_CONFIDENCE_FLOOR: f64 = 0.30;

impl ConfidenceBucket {
    pub fn from_score(score: f64, high_threshold: f64, low_threshold: f64) -> Self {
        if score >= high_threshold {
            Self::High
        } else if score >= low_threshold {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// A labeled sample tying a human review outcome to the pipeline's
/// predicted confidence (§4.13), used for future threshold calibration
/// (not automated by this engine — see spec.md §1 non-goals).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationSample {
    pub id: Uuid,
    pub message_id: Uuid,
    pub review_item_id: Uuid,
    pub was_correct: bool,
    pub correction_type: Option<String>,
    pub document_type: Option<String>,
    pub predicted_confidence: f64,
    pub confidence_bucket: ConfidenceBucket,
    pub created_at: DateTime<Utc>,
}

/// Raw operational metric sample (§4.13); retained 30 days then rolled up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationalMetricSample {
    pub id: Uuid,
    pub metric_type: String,
    pub value: f64,
    pub labels: Value,
    pub recorded_at: DateTime<Utc>,
}

/// Daily rollup of an [`OperationalMetricSample`] population, kept forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRollup {
    pub metric_type: String,
    pub date: NaiveDate,
    pub labels_key: String,
    pub sample_count: i64,
    pub sum: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub p95: f64,
}

impl MetricRollup {
    /// Computes a rollup from a sorted-ascending slice of sample values.
    /// Panics if `sorted_values` is empty — callers must skip empty groups.
    pub fn from_sorted_values(
        metric_type: &str,
        date: NaiveDate,
        labels_key: &str,
        sorted_values: &[f64],
    ) -> Self {
        assert!(!sorted_values.is_empty(), "cannot roll up an empty sample set");
        let count = sorted_values.len();
        let sum: f64 = sorted_values.iter().sum();
        let avg = sum / count as f64;
        let min = sorted_values[0];
        let max = sorted_values[count - 1];
        let p95_idx = ((count as f64) * 0.95).ceil() as usize;
        let p95 = sorted_values[p95_idx.saturating_sub(1).min(count - 1)];

        Self {
            metric_type: metric_type.to_string(),
            date,
            labels_key: labels_key.to_string(),
            sample_count: count as i64,
            sum,
            avg,
            min,
            max,
            p95,
        }
    }
}
