use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::checkpoint::Checkpoint;

/// Lifecycle of an [`InboundMessage`] as it moves through the pipeline.
///
/// Terminal states are `Completed`, `Failed`, and `NotCreditorReply`. Only
/// the worker holding a message's claim may transition it; see
/// `cem-worker`'s state machine for the legal-transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Received,
    Queued,
    Processing,
    Parsed,
    IntentClassifying,
    ContentExtracting,
    Consolidating,
    ContentExtracted,
    Extracting,
    Extracted,
    Matching,
    Completed,
    Failed,
    NotCreditorReply,
}

impl ProcessingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::NotCreditorReply
        )
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Parsed => "parsed",
            Self::IntentClassifying => "intent_classifying",
            Self::ContentExtracting => "content_extracting",
            Self::Consolidating => "consolidating",
            Self::ContentExtracted => "content_extracted",
            Self::Extracting => "extracting",
            Self::Extracted => "extracted",
            Self::Matching => "matching",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::NotCreditorReply => "not_creditor_reply",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ProcessingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "received" => Self::Received,
            "queued" => Self::Queued,
            "processing" => Self::Processing,
            "parsed" => Self::Parsed,
            "intent_classifying" => Self::IntentClassifying,
            "content_extracting" => Self::ContentExtracting,
            "consolidating" => Self::Consolidating,
            "content_extracted" => Self::ContentExtracted,
            "extracting" => Self::Extracting,
            "extracted" => Self::Extracted,
            "matching" => Self::Matching,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "not_creditor_reply" => Self::NotCreditorReply,
            other => return Err(format!("unknown processing_status: {other}")),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    AutoMatched,
    NeedsReview,
    NoMatch,
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AutoMatched => "auto_matched",
            Self::NeedsReview => "needs_review",
            Self::NoMatch => "no_match",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
    NotApplicable,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Failed => "failed",
            Self::NotApplicable => "not_applicable",
        };
        f.write_str(s)
    }
}

/// One attachment reference carried on an inbound message, as delivered by
/// the webhook ingress (§6). `url` is populated by the worker pipeline
/// before Agent 2 runs (§4.9 step 4) when the provider only supplies an id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentDescriptor {
    pub external_id: String,
    pub filename: String,
    pub mime_type: String,
    pub url: Option<String>,
    pub size_bytes: Option<u64>,
}

/// Final merged extraction result attached to a completed/failed message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedData {
    pub gesamtforderung: Option<Decimal>,
    pub currency: Option<String>,
    pub client_name: Option<String>,
    pub creditor_name: Option<String>,
    pub reference_numbers: Vec<String>,
    pub confidence: Option<String>,
}

/// Match outcome summary stored on the message row (the per-candidate
/// detail lives in [`crate::matching::MatchResult`] rows).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub matched_inquiry_id: Option<Uuid>,
    pub match_confidence_pct: Option<f64>,
    pub match_status: Option<MatchStatus>,
}

/// Confidence dimensions computed by `cem-confidence` (§4.8).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfidenceDimensions {
    pub extraction: Option<f64>,
    pub overall: Option<f64>,
    pub route_label: Option<String>,
}

/// The central entity: one inbound creditor email and everything the
/// pipeline has learned about it so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: Uuid,
    pub external_webhook_id: String,
    pub sender_address: String,
    pub subject: String,
    pub raw_html_body: Option<String>,
    pub raw_text_body: Option<String>,
    pub cleaned_body: Option<String>,
    pub tokens_before_cleaning: Option<u32>,
    pub tokens_after_cleaning: Option<u32>,
    pub attachments: Vec<AttachmentDescriptor>,
    pub processing_status: ProcessingStatus,
    pub received_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub extracted_data: Option<ExtractedData>,
    pub checkpoints: HashMap<String, Checkpoint>,
    pub match_outcome: MatchOutcome,
    pub confidence: ConfidenceDimensions,
    pub sync_status: SyncStatus,
    pub idempotency_key: Option<String>,
}

impl InboundMessage {
    pub fn new(external_webhook_id: impl Into<String>, sender_address: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_webhook_id: external_webhook_id.into(),
            sender_address: sender_address.into(),
            subject: subject.into(),
            raw_html_body: None,
            raw_text_body: None,
            cleaned_body: None,
            tokens_before_cleaning: None,
            tokens_after_cleaning: None,
            attachments: Vec::new(),
            processing_status: ProcessingStatus::Received,
            received_at: Utc::now(),
            started_at: None,
            completed_at: None,
            processed_at: None,
            retry_count: 0,
            error_message: None,
            extracted_data: None,
            checkpoints: HashMap::new(),
            match_outcome: MatchOutcome::default(),
            confidence: ConfidenceDimensions::default(),
            sync_status: SyncStatus::NotApplicable,
            idempotency_key: None,
        }
    }
}
