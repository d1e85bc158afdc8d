//! Postgres access layer. Every query here is raw `sqlx::query`/`query_as`
//! with explicit `.bind()` chains — no ORM, matching the teacher's `mqk-db`.
//!
//! Claim-and-lock operations (`outbox_claim_batch`, `review_claim_next`,
//! `messages_claim_next_batch`) are gated behind the `runtime-claim` feature
//! so only `cem-worker`/`cem-reconcile` can compile them; `cem-daemon` and
//! `cem-cli` depend on this crate without the feature, so calling one of
//! those functions from there is a compile error, not a runtime race.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub const ENV_DB_URL: &str = "CEM_PRIMARY_STORE_URL";

pub mod checkpoints;
pub mod idempotency;
pub mod inquiries;
pub mod matching;
pub mod messages;
pub mod metrics;
pub mod outbox;
pub mod prompts;
pub mod reconcile;
pub mod reports;
pub mod review;

/// Connect to Postgres using [`ENV_DB_URL`].
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")
}

/// Test helper: connect from env, then ensure migrations are applied.
pub async fn testkit_db_pool() -> Result<PgPool> {
    let pool = connect_from_env().await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Connectivity + schema presence check, used by the daemon's `/healthz`
/// and the CLI's `status` subcommand.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1 from information_schema.tables
            where table_schema = 'public' and table_name = 'inbound_messages'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_core_schema: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_core_schema: bool,
}
