use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A versioned LLM prompt. Only one row per `(task_type, name)` may have
/// `active = true` (partial index named in spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: Uuid,
    pub task_type: String,
    pub name: String,
    pub version: i32,
    pub active: bool,
    pub template_text: String,
    pub created_at: DateTime<Utc>,
}

/// One sampled invocation of a prompt, rolled up daily by `cem-metrics`
/// the same way operational metrics are (§4.13).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMetricSample {
    pub id: Uuid,
    pub task_type: String,
    pub name: String,
    pub tokens_in: i32,
    pub tokens_out: i32,
    pub cost_usd: f64,
    pub latency_ms: i64,
    pub success: bool,
    pub sampled_at: DateTime<Utc>,
}
