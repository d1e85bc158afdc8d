//! Per-message pipeline (§4.9 steps 1-11): runs the three agents, the
//! matcher, the confidence router, and (when warranted) the dual writer
//! for one already-claimed message.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use cem_capabilities::{AttachmentStorage, DebtUpdateNotice, LlmCapability, NotificationSink, SecondaryStoreAdapter};
use cem_config::AppConfig;
use cem_schemas::matching::MatchDecisionStatus;
use cem_schemas::message::{AttachmentDescriptor, ExtractedData, InboundMessage, MatchStatus, ProcessingStatus};
use cem_schemas::outbox::CreditorDebtUpdatePayload;
use cem_schemas::report::ProcessingReport;
use cem_schemas::review::ReviewReason;

use crate::memstat;

/// Everything one worker needs to run the pipeline for a message. Built
/// once at startup by `cem-daemon`/`cem-cli` and shared (behind an `Arc`)
/// across every claimed job.
pub struct WorkerDeps {
    pub pool: PgPool,
    pub llm: Arc<dyn LlmCapability>,
    pub storage: Arc<dyn AttachmentStorage>,
    pub secondary_store: Arc<dyn SecondaryStoreAdapter>,
    pub notifier: Arc<dyn NotificationSink>,
    pub config: AppConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed,
    NotCreditorReply,
}

fn elapsed_ms(start: Instant) -> serde_json::Value {
    serde_json::Value::from(start.elapsed().as_millis() as u64)
}

/// Runs the full pipeline for one message already in `processing` with an
/// active claim. Returns `Err` for any failure the caller should classify
/// and retry; all terminal outcomes this function reaches on its own
/// (`not_creditor_reply`, `completed`) return `Ok`.
pub async fn process_message(deps: &WorkerDeps, message_id: Uuid) -> Result<ProcessOutcome> {
    let job_started = Instant::now();
    let rss_before = memstat::rss_kb();
    let mut stage_durations = serde_json::Map::new();

    cem_db::messages::update_status(&deps.pool, message_id, ProcessingStatus::Processing, None).await?;

    let message = cem_db::messages::get(&deps.pool, message_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("process_message: message {message_id} vanished after claim"))?;

    let t0 = Instant::now();
    let cleaned = cem_extract::cleaning::clean_body(message.raw_html_body.as_deref(), message.raw_text_body.as_deref());
    cem_db::messages::save_cleaned_body(&deps.pool, message_id, &cleaned.cleaned_body, cleaned.tokens_before, cleaned.tokens_after).await?;
    stage_durations.insert("cleaning".to_string(), elapsed_ms(t0));

    cem_db::messages::update_status(&deps.pool, message_id, ProcessingStatus::IntentClassifying, None).await?;
    let headers = cem_agents::intent::MessageHeaders {
        from: &message.sender_address,
        ..Default::default()
    };
    let t0 = Instant::now();
    let agent1 = cem_agents::intent::run(&deps.pool, deps.llm.as_ref(), message_id, &headers, &message.subject, &cleaned.cleaned_body)
        .await
        .context("agent1 intent classification failed")?;
    stage_durations.insert("agent1_intent".to_string(), elapsed_ms(t0));

    if agent1.skip_extraction {
        cem_db::messages::save_extracted_data(&deps.pool, message_id, &ExtractedData::default()).await?;
        cem_db::messages::update_status(&deps.pool, message_id, ProcessingStatus::NotCreditorReply, None).await?;
        finish_report(&deps.pool, message_id, &stage_durations, 0, 0.0, "not_creditor_reply").await?;
        memstat::log_delta(message_id, rss_before);
        return Ok(ProcessOutcome::NotCreditorReply);
    }

    let attachments = enrich_attachment_urls(deps.storage.as_ref(), &message.attachments).await;

    cem_db::messages::update_status(&deps.pool, message_id, ProcessingStatus::ContentExtracting, None).await?;
    let mut budget = cem_budget::TokenBudgetTracker::new(
        deps.config.max_tokens_per_job,
        deps.config.claude_input_cost_per_million,
        deps.config.claude_output_cost_per_million,
    );
    let t0 = Instant::now();
    let agent2 = cem_agents::extraction::run(
        &deps.pool,
        deps.llm.as_ref(),
        deps.storage.as_ref(),
        &mut budget,
        message_id,
        &cleaned.cleaned_body,
        &attachments,
        &agent1,
        deps.config.max_attachment_bytes,
    )
    .await
    .context("agent2 extraction failed")?;
    stage_durations.insert("agent2_extraction".to_string(), elapsed_ms(t0));

    cem_db::messages::update_status(&deps.pool, message_id, ProcessingStatus::Consolidating, None).await?;
    let t0 = Instant::now();
    let agent3 = cem_agents::consolidation::run(&deps.pool, deps.secondary_store.as_ref(), message_id, None, &agent2)
        .await
        .context("agent3 consolidation failed")?;
    stage_durations.insert("agent3_consolidation".to_string(), elapsed_ms(t0));

    // Step 7: a debt_statement carrying an amount is a creditor reply even
    // if a supplementary text-only extractor disagreed — there's nothing
    // left to override here since `agent1.skip_extraction` already gated
    // the spam/auto_reply/inquiry cases above; reaching this point with an
    // amount is exactly the condition the rule describes.

    cem_db::messages::update_status(&deps.pool, message_id, ProcessingStatus::Extracted, None).await?;
    let reference_numbers = cem_extract::reference::extract_reference_numbers(&cleaned.cleaned_body);
    let extracted_data = ExtractedData {
        gesamtforderung: Some(agent3.final_amount),
        currency: Some("EUR".to_string()),
        client_name: agent3.client_name.clone(),
        creditor_name: agent3.creditor_name.clone(),
        reference_numbers: reference_numbers.clone(),
        confidence: Some(format!("{:.2}", agent3.confidence)),
    };
    cem_db::messages::save_extracted_data(&deps.pool, message_id, &extracted_data).await?;

    cem_db::messages::update_status(&deps.pool, message_id, ProcessingStatus::Matching, None).await?;
    let t0 = Instant::now();
    let match_outcome = cem_match::match_message(
        &deps.pool,
        message_id,
        &message.sender_address,
        message.received_at,
        agent3.client_name.as_deref().unwrap_or(""),
        &reference_numbers,
        "default",
    )
    .await
    .context("matching failed")?;
    stage_durations.insert("matching".to_string(), elapsed_ms(t0));

    let match_status = match match_outcome.status {
        MatchDecisionStatus::AutoMatched => MatchStatus::AutoMatched,
        MatchDecisionStatus::Ambiguous | MatchDecisionStatus::BelowThreshold => MatchStatus::NeedsReview,
        MatchDecisionStatus::NoRecentInquiry | MatchDecisionStatus::NoCandidates => MatchStatus::NoMatch,
    };
    cem_db::messages::save_match_outcome(
        &deps.pool,
        message_id,
        match_outcome.selected_inquiry_id,
        match_outcome.top_score,
        Some(match_status),
    )
    .await?;

    let thresholds = cem_confidence::router::RouterThresholds {
        high: deps.config.confidence_high_threshold,
        low: deps.config.confidence_low_threshold,
    };
    let scored = cem_confidence::score(&agent2.sources, &agent2.consolidated, match_outcome.status, match_outcome.top_score, &thresholds);
    cem_db::messages::save_confidence(&deps.pool, message_id, &scored.as_dimensions()).await?;

    // A conflict Agent 3 flagged is a correctness concern the confidence
    // score doesn't necessarily surface (a high-confidence extraction can
    // still disagree with the secondary store), so it forces manual review
    // regardless of the router's action.
    let conflict_forced = !agent3.conflicts.is_empty();
    let action = if conflict_forced {
        cem_confidence::router::RouteAction::ManualReview
    } else {
        scored.route.action
    };

    match action {
        cem_confidence::router::RouteAction::ManualReview => {
            let reason = review_reason(match_outcome.status, conflict_forced);
            cem_review::enqueue(
                &deps.pool,
                message_id,
                reason,
                serde_json::json!({
                    "overall_confidence": scored.overall,
                    "match_status": match_outcome.status.as_str(),
                    "conflicts": agent3.conflicts,
                }),
                None,
            )
            .await?;
        }
        cem_confidence::router::RouteAction::AutoUpdate | cem_confidence::router::RouteAction::UpdateAndNotify => {
            if match_outcome.status == MatchDecisionStatus::AutoMatched {
                write_through(deps, message_id, &message, &cleaned.cleaned_body, &agent3, &reference_numbers).await?;
                if action == cem_confidence::router::RouteAction::UpdateAndNotify {
                    deps.notifier.notify_debt_update(&DebtUpdateNotice {
                        message_id,
                        client_name: agent3.client_name.clone().unwrap_or_default(),
                        creditor_name: agent3.creditor_name.clone().unwrap_or_default(),
                        new_amount: agent3.final_amount,
                    });
                }
            }
        }
    }

    cem_db::messages::update_status(&deps.pool, message_id, ProcessingStatus::Completed, None).await?;
    finish_report(
        &deps.pool,
        message_id,
        &stage_durations,
        budget.used_tokens() as i64,
        budget.estimate_cost_usd(),
        "completed",
    )
    .await?;

    let _ = cem_metrics::record_stage_duration(&deps.pool, "total_pipeline", job_started.elapsed().as_millis() as u64).await;
    let _ = cem_metrics::record_token_usage(&deps.pool, &deps.config.llm_provider, budget.used_tokens()).await;
    let _ = cem_metrics::record_confidence(&deps.pool, action_label(action), scored.overall).await;

    memstat::log_delta(message_id, rss_before);
    Ok(ProcessOutcome::Completed)
}

fn action_label(action: cem_confidence::router::RouteAction) -> &'static str {
    match action {
        cem_confidence::router::RouteAction::AutoUpdate => "high",
        cem_confidence::router::RouteAction::UpdateAndNotify => "medium",
        cem_confidence::router::RouteAction::ManualReview => "low",
    }
}

fn review_reason(status: MatchDecisionStatus, conflict_forced: bool) -> ReviewReason {
    if conflict_forced {
        return ReviewReason::ConflictDetected;
    }
    match status {
        MatchDecisionStatus::Ambiguous => ReviewReason::AmbiguousMatch,
        MatchDecisionStatus::BelowThreshold => ReviewReason::BelowThreshold,
        MatchDecisionStatus::NoRecentInquiry | MatchDecisionStatus::NoCandidates => ReviewReason::NoRecentInquiry,
        MatchDecisionStatus::AutoMatched => ReviewReason::LowConfidence,
    }
}

/// Resolves attachment download URLs through the storage collaborator
/// (§4.9 step 4). This engine's ingress already populates `url` on every
/// descriptor it creates, so today this is an identity pass; the step is
/// kept explicit so an ingress that only supplies provider attachment ids
/// has a seam to resolve them through `storage` before Agent 2 runs.
async fn enrich_attachment_urls(_storage: &dyn AttachmentStorage, attachments: &[AttachmentDescriptor]) -> Vec<AttachmentDescriptor> {
    attachments.to_vec()
}

async fn write_through(
    deps: &WorkerDeps,
    message_id: Uuid,
    message: &InboundMessage,
    cleaned_body: &str,
    agent3: &cem_agents::Agent3Result,
    reference_numbers: &[String],
) -> Result<()> {
    let payload = CreditorDebtUpdatePayload {
        client_name: agent3.client_name.clone().unwrap_or_default(),
        client_case_number: reference_numbers.first().cloned(),
        creditor_email: message.sender_address.clone(),
        creditor_name: agent3.creditor_name.clone().unwrap_or_default(),
        new_debt_amount: agent3.final_amount,
        response_text: Some(cleaned_body.to_string()),
        reference_numbers: reference_numbers.to_vec(),
        extraction_confidence: Some(agent3.confidence),
        response_timestamp: Utc::now(),
    };
    let aggregate_id = format!("{message_id}:{}:{}:{}", payload.client_name, payload.creditor_email, payload.new_debt_amount);

    let mut tx = deps.pool.begin().await.context("write_through: begin tx failed")?;
    let outcome = cem_outbox::phase_a(&mut tx, message_id, &aggregate_id, &payload).await?;
    tx.commit().await.context("write_through: commit failed")?;

    if let cem_outbox::PhaseAOutcome::Enqueued { idempotency_key, .. } = outcome {
        // Best-effort: a Phase B failure does not fail the job, the
        // reconciler's hourly sweep retries it.
        if let Err(err) = cem_outbox::phase_b(&deps.pool, deps.secondary_store.as_ref(), message_id, &idempotency_key).await {
            tracing::warn!(%message_id, error = %err, "phase_b_failed_deferring_to_reconciler");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_reason_wins_over_match_status() {
        assert_eq!(review_reason(MatchDecisionStatus::AutoMatched, true), ReviewReason::ConflictDetected);
    }

    #[test]
    fn ambiguous_match_maps_to_ambiguous_reason() {
        assert_eq!(review_reason(MatchDecisionStatus::Ambiguous, false), ReviewReason::AmbiguousMatch);
    }

    #[test]
    fn no_candidates_and_no_recent_inquiry_share_a_reason() {
        assert_eq!(review_reason(MatchDecisionStatus::NoCandidates, false), ReviewReason::NoRecentInquiry);
        assert_eq!(review_reason(MatchDecisionStatus::NoRecentInquiry, false), ReviewReason::NoRecentInquiry);
    }

    #[test]
    fn action_label_matches_router_tiers() {
        assert_eq!(action_label(cem_confidence::router::RouteAction::AutoUpdate), "high");
        assert_eq!(action_label(cem_confidence::router::RouteAction::UpdateAndNotify), "medium");
        assert_eq!(action_label(cem_confidence::router::RouteAction::ManualReview), "low");
    }
}

async fn finish_report(
    pool: &PgPool,
    message_id: Uuid,
    stage_durations: &serde_json::Map<String, serde_json::Value>,
    tokens_used: i64,
    estimated_cost_usd: f64,
    final_status: &str,
) -> Result<()> {
    let report = ProcessingReport {
        id: Uuid::new_v4(),
        message_id,
        stage_durations_ms: serde_json::Value::Object(stage_durations.clone()),
        tokens_used,
        estimated_cost_usd,
        final_status: final_status.to_string(),
        created_at: Utc::now(),
    };
    cem_db::reports::insert(pool, &report).await
}
