//! `cem review ...` — manual-review queue operator actions (spec §4.11,
//! §6 `GET /reviews`, `GET /reviews/stats`, `POST /reviews/claim-next`,
//! `POST /reviews/{id}/resolve`).

use anyhow::{Context, Result};
use cem_schemas::review::ReviewResolution;
use clap::Subcommand;
use uuid::Uuid;

#[derive(Subcommand)]
pub enum ReviewCmd {
    /// Pending/claimed counts, by-reason breakdown, average resolution time.
    Stats,
    /// List unresolved items ordered by priority then age.
    List {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Claim the highest-priority unclaimed item (requires `cem-review`'s
    /// `runtime-claim` feature, enabled for this binary).
    ClaimNext {
        #[arg(long, default_value = "cem-cli-operator")]
        reviewer: String,
        #[arg(long)]
        priority_max: Option<i16>,
    },
    /// Resolve a claimed item.
    Resolve {
        id: Uuid,
        /// One of approved, rejected, corrected, escalated, spam.
        #[arg(long)]
        resolution: String,
        #[arg(long)]
        notes: Option<String>,
    },
}

fn parse_resolution(s: &str) -> Result<ReviewResolution> {
    Ok(match s {
        "approved" => ReviewResolution::Approved,
        "rejected" => ReviewResolution::Rejected,
        "corrected" => ReviewResolution::Corrected,
        "escalated" => ReviewResolution::Escalated,
        "spam" => ReviewResolution::Spam,
        other => anyhow::bail!("invalid --resolution '{other}': expected approved|rejected|corrected|escalated|spam"),
    })
}

pub async fn run(cmd: ReviewCmd) -> Result<()> {
    let pool = cem_db::connect_from_env().await?;
    match cmd {
        ReviewCmd::Stats => {
            let stats = cem_review::queue::stats(&pool).await?;
            println!("total_unresolved={}", stats.total_unresolved);
            println!("total_claimed={}", stats.total_claimed);
            println!("avg_resolution_minutes={:?}", stats.avg_resolution_minutes);
            for (reason, n) in stats.by_reason {
                println!("by_reason.{reason}={n}");
            }
        }
        ReviewCmd::List { limit } => {
            let items = cem_review::queue::list_unresolved(&pool, limit).await?;
            println!("count={}", items.len());
            for item in items {
                println!(
                    "id={} message_id={} reason={:?} priority={} claimed_by={:?}",
                    item.id, item.message_id, item.reason, item.priority, item.claimed_by
                );
            }
        }
        ReviewCmd::ClaimNext { reviewer, priority_max } => {
            match cem_review::queue::claim_next(&pool, &reviewer, priority_max).await? {
                Some(item) => println!("claimed=true id={} message_id={}", item.id, item.message_id),
                None => println!("claimed=false reason=queue_empty"),
            }
        }
        ReviewCmd::Resolve { id, resolution, notes } => {
            let resolution = parse_resolution(&resolution)?;
            cem_review::resolve(&pool, id, resolution, notes.as_deref(), None)
                .await
                .with_context(|| format!("resolving review item {id}"))?;
            println!("resolved=true id={id} resolution={resolution:?}");
        }
    }
    Ok(())
}
