use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Transactional outbox record for the secondary-store write (§3, §4.10).
/// Invariant: created in the same transaction as the primary-store effect
/// it represents; terminal once `processed_at` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub operation: String,
    pub payload: Value,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub last_error: Option<String>,
}

pub const DEFAULT_MAX_RETRIES: i32 = 5;

impl OutboxMessage {
    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }

    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// Payload shape for the `creditor_debt_update` aggregate (§4.10), the only
/// aggregate type this engine currently emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditorDebtUpdatePayload {
    pub client_name: String,
    pub client_case_number: Option<String>,
    pub creditor_email: String,
    pub creditor_name: String,
    pub new_debt_amount: rust_decimal::Decimal,
    pub response_text: Option<String>,
    pub reference_numbers: Vec<String>,
    pub extraction_confidence: Option<f64>,
    pub response_timestamp: DateTime<Utc>,
}
