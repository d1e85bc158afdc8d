use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewReason {
    LowConfidence,
    ConflictDetected,
    ValidationFailed,
    ManualEscalation,
    AmbiguousMatch,
    NoRecentInquiry,
    BelowThreshold,
    ExtractionError,
    MissingData,
    DuplicateSuspected,
}

impl ReviewReason {
    /// Compiled-in priority map (§4.11): lower number = higher priority.
    pub fn default_priority(self) -> i16 {
        match self {
            Self::ManualEscalation => 1,
            Self::ValidationFailed => 2,
            Self::ConflictDetected | Self::AmbiguousMatch => 3,
            Self::ExtractionError | Self::NoRecentInquiry => 4,
            Self::LowConfidence | Self::BelowThreshold => 5,
            Self::MissingData => 6,
            Self::DuplicateSuspected => 7,
        }
    }

    /// Default expiry window in days (§4.8, §4.11). Only `low_confidence`
    /// items carry a compiled-in expiration; everything else stays open
    /// until resolved unless the caller passes an explicit override.
    pub fn default_expiration_days(self) -> Option<i64> {
        match self {
            Self::LowConfidence => Some(7),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LowConfidence => "low_confidence",
            Self::ConflictDetected => "conflict_detected",
            Self::ValidationFailed => "validation_failed",
            Self::ManualEscalation => "manual_escalation",
            Self::AmbiguousMatch => "ambiguous_match",
            Self::NoRecentInquiry => "no_recent_inquiry",
            Self::BelowThreshold => "below_threshold",
            Self::ExtractionError => "extraction_error",
            Self::MissingData => "missing_data",
            Self::DuplicateSuspected => "duplicate_suspected",
        }
    }
}

impl std::str::FromStr for ReviewReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "low_confidence" => Self::LowConfidence,
            "conflict_detected" => Self::ConflictDetected,
            "validation_failed" => Self::ValidationFailed,
            "manual_escalation" => Self::ManualEscalation,
            "ambiguous_match" => Self::AmbiguousMatch,
            "no_recent_inquiry" => Self::NoRecentInquiry,
            "below_threshold" => Self::BelowThreshold,
            "extraction_error" => Self::ExtractionError,
            "missing_data" => Self::MissingData,
            "duplicate_suspected" => Self::DuplicateSuspected,
            other => return Err(format!("unknown review reason: {other}")),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewResolution {
    Approved,
    Rejected,
    Corrected,
    Escalated,
    Spam,
}

impl ReviewResolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Corrected => "corrected",
            Self::Escalated => "escalated",
            Self::Spam => "spam",
        }
    }
}

/// Manual review queue entry (§3, §4.11). Invariant: a message has at most
/// one unresolved item; a claimed-but-unresolved item blocks re-claiming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewItem {
    pub id: Uuid,
    pub message_id: Uuid,
    pub reason: ReviewReason,
    pub details: Value,
    pub priority: i16,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<ReviewResolution>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ReviewItem {
    pub fn is_claimed(&self) -> bool {
        self.claimed_at.is_some()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}
