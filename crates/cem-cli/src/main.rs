//! Operator CLI for the creditor-reply engine. Thin by design: each
//! subcommand module owns its own handler; this file only parses args and
//! dispatches, matching `mqk-cli`'s `commands/` layout.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cem")]
#[command(about = "Creditor reply engine operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database lifecycle commands (migrate, status).
    Db {
        #[command(subcommand)]
        cmd: commands::db::DbCmd,
    },

    /// Job-queue operator actions (list, show, retry).
    Jobs {
        #[command(subcommand)]
        cmd: commands::jobs::JobsCmd,
    },

    /// Manual-review queue operator actions (stats, claim-next, resolve).
    Review {
        #[command(subcommand)]
        cmd: commands::review::ReviewCmd,
    },

    /// Runs the claim-and-process worker loop in this process until
    /// interrupted (SIGINT/SIGTERM) or `--once` completes a single pass.
    RunWorker {
        #[arg(long, default_value = "cem-cli-worker")]
        worker_id: String,
        #[arg(long, default_value_t = 5)]
        batch_size: i64,
        #[arg(long, default_value_t = 10)]
        poll_interval_secs: u64,
        /// Run one claim-and-process pass and exit instead of looping.
        #[arg(long)]
        once: bool,
    },

    /// Runs one reconciliation pass (outbox retry, drift scan, cleanup,
    /// report) and prints the resulting summary.
    RunReconciler,

    /// Runs the operator-invoked drift auditor over a configurable
    /// lookback window and prints a health score.
    Audit {
        #[arg(long, default_value_t = 48)]
        lookback_hours: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => commands::db::run(cmd).await,
        Commands::Jobs { cmd } => commands::jobs::run(cmd).await,
        Commands::Review { cmd } => commands::review::run(cmd).await,
        Commands::RunWorker { worker_id, batch_size, poll_interval_secs, once } => {
            commands::worker::run(worker_id, batch_size, poll_interval_secs, once).await
        }
        Commands::RunReconciler => commands::reconciler::run_once().await,
        Commands::Audit { lookback_hours } => commands::reconciler::run_audit(lookback_hours).await,
    }
}
