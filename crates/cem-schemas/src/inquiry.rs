use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An earlier outbound creditor contact, used as a match target for inbound
/// replies (§3). Owned by an external ingest component; read-only to the
/// matching engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundInquiry {
    pub id: Uuid,
    pub client_name: String,
    pub client_name_normalized: String,
    pub creditor_name: String,
    pub creditor_name_normalized: String,
    pub creditor_address: Option<String>,
    pub creditor_email: String,
    pub debt_amount: Decimal,
    pub reference_number: Option<String>,
    pub external_ticket_id: Option<String>,
    pub external_side_conversation_id: Option<String>,
    pub external_email_provider_id: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub status: String,
}

/// Normalizes a name the same way on both the inquiry-ingest side and the
/// matching side: lowercase, trimmed, internal whitespace collapsed.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
