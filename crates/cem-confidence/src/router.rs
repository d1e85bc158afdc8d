//! Tiered router (§4.8): turns an overall confidence score into the action
//! the worker should take, with the matcher's own decision able to force an
//! override into manual review regardless of score.

use cem_schemas::calibration::{DEFAULT_CONFIDENCE_HIGH_THRESHOLD, DEFAULT_CONFIDENCE_LOW_THRESHOLD};
use sqlx::PgPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAction {
    AutoUpdate,
    UpdateAndNotify,
    ManualReview,
}

impl RouteAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AutoUpdate => "auto_update",
            Self::UpdateAndNotify => "update_and_notify",
            Self::ManualReview => "manual_review",
        }
    }
}

pub struct RouteDecision {
    pub action: RouteAction,
    pub needs_review: bool,
}

pub struct RouterThresholds {
    pub high: f64,
    pub low: f64,
}

/// Resolves the router's HIGH/LOW thresholds through the same runtime
/// threshold store `cem-match` uses, under the `confidence` category.
pub async fn resolve_thresholds(pool: &PgPool) -> anyhow::Result<RouterThresholds> {
    let high = cem_db::matching::lookup_threshold(pool, "confidence", "high", None, DEFAULT_CONFIDENCE_HIGH_THRESHOLD).await?;
    let low = cem_db::matching::lookup_threshold(pool, "confidence", "low", None, DEFAULT_CONFIDENCE_LOW_THRESHOLD).await?;
    Ok(RouterThresholds { high, low })
}

/// Routes an overall confidence score to an action (§4.8). Since `overall`
/// already folds in the match dimension via `min()`, a LOW-tier score wins
/// even when the matcher itself decided `auto_matched` — this is the
/// "override" spec.md describes.
pub fn route(overall: f64, thresholds: &RouterThresholds) -> RouteDecision {
    if overall >= thresholds.high {
        RouteDecision { action: RouteAction::AutoUpdate, needs_review: false }
    } else if overall >= thresholds.low {
        RouteDecision { action: RouteAction::UpdateAndNotify, needs_review: false }
    } else {
        RouteDecision { action: RouteAction::ManualReview, needs_review: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> RouterThresholds {
        RouterThresholds { high: 0.85, low: 0.60 }
    }

    #[test]
    fn high_confidence_auto_updates_without_notification() {
        let decision = route(0.9, &thresholds());
        assert_eq!(decision.action, RouteAction::AutoUpdate);
        assert!(!decision.needs_review);
    }

    #[test]
    fn medium_confidence_updates_and_notifies() {
        let decision = route(0.7, &thresholds());
        assert_eq!(decision.action, RouteAction::UpdateAndNotify);
    }

    #[test]
    fn low_confidence_forces_manual_review() {
        let decision = route(0.4, &thresholds());
        assert_eq!(decision.action, RouteAction::ManualReview);
        assert!(decision.needs_review);
    }
}
