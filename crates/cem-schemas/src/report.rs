use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Per-message processing report written at pipeline completion (§4.9 step
/// 11; entity supplemented from `original_source/app/models/processing_report.py`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingReport {
    pub id: Uuid,
    pub message_id: Uuid,
    pub stage_durations_ms: Value,
    pub tokens_used: i64,
    pub estimated_cost_usd: f64,
    pub final_status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    Running,
    Completed,
    Failed,
}

/// Drift-scan finding classification (§4.12 step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftKind {
    MissingInSecondary,
    MissingCreditorInSecondary,
    DataMismatch,
    Consistent,
}

/// Summary row persisted by one reconciler run (§4.12 step 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub id: Uuid,
    pub run_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub records_checked: i64,
    pub mismatches_found: i64,
    pub auto_repaired: i64,
    pub failed_repairs: i64,
    pub details: Value,
    pub status: ReconciliationStatus,
    pub error_message: Option<String>,
}
