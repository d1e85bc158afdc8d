//! Runtime-tunable threshold/weight lookup (§4.7), backed by `cem-db`'s
//! three-level fallback over `matching_thresholds` rows.

use anyhow::Result;
use cem_schemas::matching::{
    DEFAULT_GAP_THRESHOLD, DEFAULT_MIN_MATCH, DEFAULT_WEIGHT_CLIENT_NAME, DEFAULT_WEIGHT_REFERENCE_NUMBER,
};
use sqlx::PgPool;

use crate::strategies::Weights;

pub struct ResolvedThresholds {
    pub min_match: f64,
    pub gap_threshold: f64,
    pub weights: Weights,
}

pub async fn resolve(pool: &PgPool, category: &str) -> Result<ResolvedThresholds> {
    let min_match = cem_db::matching::lookup_threshold(pool, category, "min_match", None, DEFAULT_MIN_MATCH).await?;
    let gap_threshold = cem_db::matching::lookup_threshold(pool, category, "gap", None, DEFAULT_GAP_THRESHOLD).await?;
    let client_name = cem_db::matching::lookup_threshold(pool, category, "weight", Some("client_name"), DEFAULT_WEIGHT_CLIENT_NAME).await?;
    let reference_number =
        cem_db::matching::lookup_threshold(pool, category, "weight", Some("reference_number"), DEFAULT_WEIGHT_REFERENCE_NUMBER).await?;

    Ok(ResolvedThresholds {
        min_match,
        gap_threshold,
        weights: Weights { client_name, reference_number },
    })
}
