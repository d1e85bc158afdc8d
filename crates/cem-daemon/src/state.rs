//! Shared runtime state for cem-daemon. `Arc<AppState>` is handed to every
//! Axum handler via `State`; this module owns nothing async itself.
//!
//! Note: the LLM/storage/notifier capability bindings the worker pipeline
//! needs live in [`crate::capabilities`] as reusable concrete types, but
//! this daemon's own routes (ingress, status, review, scheduler) never call
//! the worker pipeline directly, so `AppState` only carries what they use.
//! `cem-cli`'s `run-worker` subcommand constructs its own `WorkerDeps` from
//! the same `cem_daemon::capabilities` types.

use std::sync::Arc;

use cem_capabilities::SecondaryStoreAdapter;
use cem_config::AppConfig;
use sqlx::PgPool;

/// Static build metadata included in health responses.
#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: AppConfig,
    pub build: BuildInfo,
    pub secondary_store: Arc<dyn SecondaryStoreAdapter>,
    pub inline_webhook_secret: Option<String>,
    pub hosted_webhook_secret: Option<String>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        secondary_store: Arc<dyn SecondaryStoreAdapter>,
        inline_webhook_secret: Option<String>,
        hosted_webhook_secret: Option<String>,
    ) -> Self {
        Self {
            pool,
            config,
            build: BuildInfo {
                service: "cem-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            secondary_store,
            inline_webhook_secret,
            hosted_webhook_secret,
        }
    }
}
