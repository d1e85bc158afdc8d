//! Manual-review queue business layer (§4.11). The claim-and-lock SQL and
//! row persistence already live in `cem-db::review`; this crate adds the
//! rules that sit above it: default expiry windows, calibration-sample
//! capture on resolution, and the reconciler's expiry sweep.

pub mod queue;
pub mod resolution;

pub use queue::enqueue;
pub use resolution::resolve;

use anyhow::Result;
use cem_schemas::review::ReviewResolution;
use sqlx::PgPool;

/// Auto-resolves items past their `expires_at` as `escalated` (§4.11/§4.12
/// housekeeping), regardless of claim status — expiry is a system action,
/// not a reviewer decision, so it skips the claimed-item invariant
/// `resolution::resolve` enforces. `escalated` is already excluded from
/// calibration capture, so no sample is recorded.
pub async fn expire_stale(pool: &PgPool) -> Result<usize> {
    let expired = cem_db::review::list_expired(pool).await?;
    let count = expired.len();
    for item in expired {
        cem_db::review::resolve(pool, item.id, ReviewResolution::Escalated, Some("auto-expired")).await?;
    }
    Ok(count)
}
