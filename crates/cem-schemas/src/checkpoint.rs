use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Whether a checkpoint's stage may be skipped on replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Passed,
    NeedsReview,
    Failed,
}

impl ValidationStatus {
    /// A checkpoint is replay-skippable iff its status isn't `Failed` (§3).
    pub fn is_replay_skippable(self) -> bool {
        !matches!(self, Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::NeedsReview => "needs_review",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for ValidationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "passed" => Self::Passed,
            "needs_review" => Self::NeedsReview,
            "failed" => Self::Failed,
            other => return Err(format!("unknown validation_status: {other}")),
        })
    }
}

/// A stage's persisted output: the stage-specific payload (kept as an
/// opaque JSON `Value` here so `cem-schemas` doesn't need to know every
/// agent's output type) plus the common header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    pub validation_status: ValidationStatus,
}

impl Checkpoint {
    pub fn new(payload: Value, validation_status: ValidationStatus) -> Self {
        Self {
            payload,
            timestamp: Utc::now(),
            validation_status,
        }
    }

    pub fn is_replay_skippable(&self) -> bool {
        self.validation_status.is_replay_skippable()
    }
}

/// Well-known checkpoint stage names (§4.6).
pub mod stage {
    pub const AGENT_1_INTENT: &str = "agent_1_intent";
    pub const AGENT_2_EXTRACTION: &str = "agent_2_extraction";
    pub const AGENT_3_CONSOLIDATION: &str = "agent_3_consolidation";
}
