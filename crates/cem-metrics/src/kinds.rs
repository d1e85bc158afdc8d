//! Well-known `metric_type` labels (§4.13). Kept as string constants, not an
//! enum, since `operational_metric_samples.metric_type` is free text and the
//! rollup groups on it verbatim — a typo here just shows up as its own
//! rollup row rather than a compile error either way, so the constants are
//! purely to stop that typo in the first place.

pub const QUEUE_DEPTH: &str = "queue_depth";
pub const STAGE_DURATION_MS: &str = "stage_duration_ms";
pub const ERROR_COUNT: &str = "error_count";
pub const TOKEN_USAGE: &str = "token_usage";
pub const CONFIDENCE_SCORE: &str = "confidence_score";
