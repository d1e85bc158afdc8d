//! Claim-and-lock dispatch loop (§4.9 "Claim-and-lock"). Claiming is a
//! `for update skip locked` update behind `cem_db::messages::claim_next_batch`,
//! feature-gated so only this crate and `cem-reconcile` can compile it;
//! multiple workers can drain the same queue without coordinating.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use uuid::Uuid;

use crate::pipeline::{process_message, ProcessOutcome, WorkerDeps};
use crate::retry::{backoff_for_attempt, classify_failure, RetryClass, MAX_RETRIES};

/// A claim older than this is assumed abandoned (worker crashed mid-job)
/// and is released back to the queue on the next pass (§4.12 "stale
/// reclaim").
const STALE_CLAIM_SECS: i64 = 600;

/// One claim-and-process pass. Returns the number of messages claimed (0
/// means the queue was empty).
pub async fn run_once(deps: &Arc<WorkerDeps>, worker_id: &str, batch_size: i64) -> Result<usize> {
    cem_db::messages::reclaim_stale(&deps.pool, STALE_CLAIM_SECS).await?;
    let claimed = cem_db::messages::claim_next_batch(&deps.pool, batch_size, worker_id).await?;
    let n = claimed.len();

    // Each claimed message runs as its own task so a retry backoff sleep
    // for one message never stalls the rest of the batch.
    let mut tasks = Vec::with_capacity(n);
    for message in claimed {
        let deps = Arc::clone(deps);
        let retry_count = message.retry_count;
        tasks.push(tokio::spawn(async move {
            handle_one(&deps, message.id, retry_count).await;
        }));
    }
    for task in tasks {
        let _ = task.await;
    }

    Ok(n)
}

async fn handle_one(deps: &WorkerDeps, message_id: Uuid, retry_count: i32) {
    match process_message(deps, message_id).await {
        Ok(ProcessOutcome::Completed) | Ok(ProcessOutcome::NotCreditorReply) => {
            let _ = cem_db::messages::release_claim(&deps.pool, message_id).await;
        }
        Err(err) => {
            let (failure, class) = classify_failure(&err);
            tracing::warn!(%message_id, error = %err, failure = failure.as_str(), "pipeline_job_failed");
            let _ = cem_metrics::record_error(&deps.pool, "pipeline", failure.as_str()).await;

            let new_retry_count = cem_db::messages::increment_retry(&deps.pool, message_id)
                .await
                .unwrap_or(retry_count + 1);

            if class == RetryClass::Transient && new_retry_count < MAX_RETRIES {
                let delay = backoff_for_attempt(new_retry_count);
                tracing::info!(%message_id, retry_count = new_retry_count, delay_secs = delay.as_secs(), "retry_scheduled");
                tokio::time::sleep(delay).await;
                let _ = cem_db::messages::update_status(&deps.pool, message_id, cem_schemas::message::ProcessingStatus::Queued, Some(&err.to_string())).await;
                let _ = cem_db::messages::release_claim(&deps.pool, message_id).await;
            } else {
                tracing::warn!(%message_id, retry_count = new_retry_count, "pipeline_job_permanently_failed");
                let _ = cem_db::messages::update_status(&deps.pool, message_id, cem_schemas::message::ProcessingStatus::Failed, Some(&err.to_string())).await;
                let _ = cem_db::messages::release_claim(&deps.pool, message_id).await;
                deps.notifier.notify_permanent_failure(message_id);
            }
        }
    }
}

/// Runs [`run_once`] in a loop until `shutdown` signals true, sleeping
/// `poll_interval` whenever a pass finds nothing to claim. `cem-cli`'s
/// `run-worker` subcommand owns the `shutdown` sender.
pub async fn run_forever(
    deps: Arc<WorkerDeps>,
    worker_id: String,
    batch_size: i64,
    poll_interval: Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        match run_once(&deps, &worker_id, batch_size).await {
            Ok(0) => {
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = shutdown.changed() => {}
                }
            }
            Ok(_) => {}
            Err(err) => {
                tracing::error!(error = %err, "dispatch_pass_failed");
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_claim_window_is_ten_minutes() {
        assert_eq!(STALE_CLAIM_SECS, 600);
    }
}
