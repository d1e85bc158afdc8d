//! cem-daemon entry point.
//!
//! Thin by design: load config and secrets, connect the database, bind the
//! capability implementations, wire middleware, and start the HTTP server.
//! All route handlers live in `routes.rs`; all shared state lives in
//! `state.rs`.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use cem_daemon::{capabilities, middleware, routes, scheduler, state::AppState};
use cem_capabilities::SecondaryStoreAdapter;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let config_paths = config_paths_from_env();
    let config = if config_paths.is_empty() {
        cem_config::AppConfig::default().overlay_env()
    } else {
        let paths: Vec<&str> = config_paths.iter().map(String::as_str).collect();
        let loaded = cem_config::load_layered_yaml(&paths).context("loading layered config")?;
        cem_config::AppConfig::from_loaded(&loaded)?.overlay_env()
    };

    let pool = cem_db::connect_from_env().await.context("connecting to primary store")?;
    cem_db::migrate(&pool).await.context("running migrations")?;

    let secondary_store: Arc<dyn SecondaryStoreAdapter> = Arc::new(capabilities::HttpSecondaryStoreAdapter::new(
        config
            .secondary_store_url
            .clone()
            .unwrap_or_else(|| "http://localhost:8090".to_string()),
    ));

    let shared = Arc::new(AppState::new(
        pool,
        config,
        secondary_store,
        std::env::var("CEM_INLINE_WEBHOOK_SECRET").ok(),
        std::env::var("CEM_HOSTED_WEBHOOK_SECRET").ok(),
    ));

    scheduler::spawn_all(Arc::clone(&shared));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(axum::middleware::from_fn(middleware::correlation_id))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8899)));
    info!("cem-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("CEM_DAEMON_ADDR").ok()?.parse().ok()
}

fn config_paths_from_env() -> Vec<String> {
    std::env::var("CEM_CONFIG_PATHS")
        .ok()
        .map(|v| v.split(',').map(str::to_string).collect())
        .unwrap_or_default()
}

/// CORS is wide open by default; operators front this with a reverse proxy
/// in production and can pin `CEM_CORS_ORIGIN` when they don't.
fn cors_layer() -> CorsLayer {
    match std::env::var("CEM_CORS_ORIGIN").ok().and_then(|o| HeaderValue::from_str(&o).ok()) {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(tower_http::cors::Any),
        None => CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST]),
    }
}
