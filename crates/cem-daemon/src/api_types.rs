//! Request and response types for all cem-daemon HTTP endpoints (§6).
//! Plain `Serialize + Deserialize` structs; no business logic lives here.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
    pub has_core_schema: bool,
}

// ---------------------------------------------------------------------------
// Ingress â€” inline-body webhook
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct InlineAttachment {
    pub external_id: String,
    pub filename: String,
    pub mime_type: String,
    pub url: Option<String>,
    pub size_bytes: Option<u64>,
}

/// Full-body ingress payload (§6 "one provides the full body and
/// attachment descriptors inline").
#[derive(Debug, Clone, Deserialize)]
pub struct InlineWebhookPayload {
    pub webhook_id: String,
    pub from_email: String,
    #[serde(default)]
    pub subject: String,
    pub body_html: Option<String>,
    pub body_text: Option<String>,
    #[serde(default)]
    pub attachments: Vec<InlineAttachment>,
}

/// Provider-hosted-inbox ingress payload (§6 "the other ... provides only
/// a message id and requires a follow-up fetch").
#[derive(Debug, Clone, Deserialize)]
pub struct HostedInboxWebhookPayload {
    pub webhook_id: String,
    pub provider_message_id: String,
    pub from_email: String,
    #[serde(default)]
    pub subject: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngressStatus {
    Accepted,
    Duplicate,
    Ignored,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngressResponse {
    pub status: IngressStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
}

// ---------------------------------------------------------------------------
// Outbound-inquiry ingest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct InquiryClient {
    pub name: String,
    #[serde(default)]
    pub case_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InquiryCreditor {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InquiryDebt {
    pub amount: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateInquiryRequest {
    pub client: InquiryClient,
    pub creditor: InquiryCreditor,
    pub debt: InquiryDebt,
    #[serde(default)]
    pub reference_numbers: Vec<String>,
    #[serde(default)]
    pub external_ticket_id: Option<String>,
    #[serde(default)]
    pub external_side_conversation_id: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateInquiryResponse {
    pub created: bool,
    pub id: Uuid,
}

// ---------------------------------------------------------------------------
// Status API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub id: Uuid,
    pub external_webhook_id: String,
    pub sender_address: String,
    pub subject: String,
    pub processing_status: String,
    pub retry_count: i32,
    pub received_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListJobsResponse {
    pub total: i64,
    pub by_status: std::collections::HashMap<String, i64>,
    pub jobs: Vec<JobSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetryJobResponse {
    pub retried: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Review API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ListReviewsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClaimReviewRequest {
    pub reviewer: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ClaimNextReviewRequest {
    pub reviewer: String,
    pub priority_max: Option<i16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveReviewRequest {
    pub resolution: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub corrected_data: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewEmailResponse {
    pub message_id: Uuid,
    pub sender_address: String,
    pub subject: String,
    pub raw_html_body: Option<String>,
    pub raw_text_body: Option<String>,
    pub cleaned_body: Option<String>,
}
