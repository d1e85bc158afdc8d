//! `cem jobs ...` — operator visibility and control over `InboundMessage`
//! rows, mirroring the status API's `GET /jobs`, `GET /jobs/{id}`,
//! `POST /jobs/{id}/retry` (spec §6).

use anyhow::{Context, Result};
use clap::Subcommand;
use uuid::Uuid;

#[derive(Subcommand)]
pub enum JobsCmd {
    /// List recent messages, optionally filtered by processing status.
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Print full detail for one message.
    Show { id: Uuid },
    /// Reset a `failed` message back to `queued` so the dispatcher picks
    /// it up again (`failed -> queued`, clears error, increments retry).
    Retry { id: Uuid },
}

pub async fn run(cmd: JobsCmd) -> Result<()> {
    let pool = cem_db::connect_from_env().await?;
    match cmd {
        JobsCmd::List { status, limit } => {
            let status: Option<cem_schemas::message::ProcessingStatus> =
                status.map(|s| s.parse()).transpose().map_err(|e: String| anyhow::anyhow!(e))?;
            let rows = cem_db::messages::list(&pool, status, limit).await?;
            println!("count={}", rows.len());
            for row in rows {
                println!(
                    "id={} status={} sender={} received_at={} match_status={:?} sync_status={:?}",
                    row.id,
                    row.processing_status,
                    row.sender_address,
                    row.received_at.to_rfc3339(),
                    row.match_outcome.match_status,
                    row.sync_status,
                );
            }
        }
        JobsCmd::Show { id } => {
            let row = cem_db::messages::get(&pool, id)
                .await?
                .with_context(|| format!("message {id} not found"))?;
            println!("{}", serde_json::to_string_pretty(&row)?);
        }
        JobsCmd::Retry { id } => {
            let retried = cem_db::messages::retry_failed(&pool, id).await?;
            if retried {
                println!("retried=true id={id} status=queued");
            } else {
                println!("retried=false id={id} reason=not_in_failed_state");
            }
        }
    }
    Ok(())
}
