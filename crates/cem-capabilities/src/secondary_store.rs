//! Secondary (creditor-data) store seam (§6), modeled after
//! `original_source/app/services/mongodb_client.py`'s lookup-then-update
//! shape but expressed as a provider-agnostic trait — no MongoDB driver is
//! vendored (out of scope per §1).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct SecondaryClient {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub case_number: Option<String>,
    /// The client's known creditors, carried so Agent 3 can match by email
    /// and compare the existing claim amount/name itself (mirrors
    /// `final_creditor_list` in `mongodb_client.py`) without widening this
    /// trait's method signatures.
    pub creditors: Vec<SecondaryCreditorRecord>,
}

#[derive(Debug, Clone)]
pub struct SecondaryCreditorRecord {
    pub sender_name: String,
    pub sender_email: String,
    pub claim_amount: Option<Decimal>,
}

/// Identifies which client record to update. Lookup precedence (ticket,
/// then name, then case number) is the caller's responsibility — this is
/// just the selector the caller already resolved.
#[derive(Debug, Clone)]
pub enum ClientSelector {
    Ticket(String),
    Name { first: String, last: String },
    CaseNumber(String),
}

#[derive(Debug, Clone)]
pub struct CreditorSelector {
    pub creditor_name: String,
    pub creditor_email: String,
}

#[derive(Debug, Clone)]
pub struct DebtUpdate {
    pub amount: Decimal,
    pub source: &'static str,
    pub response_timestamp: DateTime<Utc>,
    pub response_text: Option<String>,
    pub reference_numbers: Vec<String>,
    pub extraction_confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecondaryStoreError {
    Unavailable,
    NotFound,
    Operational(String),
}

impl std::fmt::Display for SecondaryStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable => write!(f, "secondary store unavailable"),
            Self::NotFound => write!(f, "secondary store record not found"),
            Self::Operational(msg) => write!(f, "secondary store operational error: {msg}"),
        }
    }
}

impl std::error::Error for SecondaryStoreError {}

#[async_trait::async_trait]
pub trait SecondaryStoreAdapter: Send + Sync {
    async fn get_client_by_ticket(&self, ticket_id: &str) -> Result<Option<SecondaryClient>, SecondaryStoreError>;
    async fn get_client_by_name(&self, first: &str, last: &str) -> Result<Option<SecondaryClient>, SecondaryStoreError>;
    async fn get_client_by_case_number(&self, az: &str) -> Result<Option<SecondaryClient>, SecondaryStoreError>;
    async fn update_creditor_debt(
        &self,
        selector: ClientSelector,
        creditor: CreditorSelector,
        update: DebtUpdate,
    ) -> Result<bool, SecondaryStoreError>;
}
