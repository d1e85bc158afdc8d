//! `cem run-worker` — runs the claim-and-process dispatch loop in this
//! process (spec §4.9, §5 "process- or thread-level parallelism are both
//! acceptable"). Operators scale out by running this subcommand in N
//! processes against the same primary store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cem_daemon::capabilities::{AnthropicLlm, DaemonNotifier, HttpAttachmentStorage, HttpSecondaryStoreAdapter};
use cem_worker::WorkerDeps;

use super::load_config;

pub async fn run(worker_id: String, batch_size: i64, poll_interval_secs: u64, once: bool) -> Result<()> {
    let config = load_config()?;
    let pool = cem_db::connect_from_env().await.context("connecting to primary store")?;

    let api_key = std::env::var("CEM_ANTHROPIC_API_KEY").unwrap_or_default();
    let deps = Arc::new(WorkerDeps {
        pool,
        llm: Arc::new(AnthropicLlm::new(api_key)),
        storage: Arc::new(HttpAttachmentStorage::new()),
        secondary_store: Arc::new(HttpSecondaryStoreAdapter::new(
            config.secondary_store_url.clone().unwrap_or_else(|| "http://localhost:8090".to_string()),
        )),
        notifier: Arc::new(DaemonNotifier::new(
            config.admin_email.clone(),
            config.smtp_host.clone(),
            config.smtp_port,
            config.portal_webhook_url.clone(),
            config.portal_webhook_secret.clone(),
        )),
        config,
    });

    if once {
        let claimed = cem_worker::run_once(&deps, &worker_id, batch_size).await?;
        println!("claimed={claimed}");
        return Ok(());
    }

    let (tx, rx) = tokio::sync::watch::channel(false);
    spawn_ctrl_c_watch(tx);

    println!("worker_id={worker_id} batch_size={batch_size} poll_interval_secs={poll_interval_secs} status=running");
    cem_worker::run_forever(deps, worker_id, batch_size, Duration::from_secs(poll_interval_secs), rx).await;
    println!("status=stopped");
    Ok(())
}

/// Flips the watch channel to `true` on SIGINT so `run_forever`'s
/// `select!` exits its sleep and observes shutdown on the next loop head.
fn spawn_ctrl_c_watch(tx: tokio::sync::watch::Sender<bool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(true);
        }
    });
}
