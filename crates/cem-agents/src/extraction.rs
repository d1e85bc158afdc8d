//! Agent 2 — extraction (§4.6), grounded in `original_source/app/actors/
//! content_extractor.py`. Downloads attachment bytes through the storage
//! collaborator (§6), hands everything to `cem_extract::extract_all` (which
//! already implements the format-priority ordering and token-budget floor),
//! and carries Agent 1's `needs_review` flag forward unchanged.

use sqlx::PgPool;
use uuid::Uuid;

use cem_budget::TokenBudgetTracker;
use cem_capabilities::{AttachmentStorage, LlmCapability};
use cem_extract::Attachment;
use cem_schemas::checkpoint::{stage, Checkpoint, ValidationStatus};
use cem_schemas::message::AttachmentDescriptor;
use cem_schemas::{ConsolidatedExtraction, SourceExtraction};
use serde::{Deserialize, Serialize};

use crate::intent::IntentResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent2Result {
    pub consolidated: ConsolidatedExtraction,
    pub sources: Vec<SourceExtraction>,
    pub needs_review: bool,
    pub skip_extraction: bool,
}

async fn download_attachment(storage: &dyn AttachmentStorage, descriptor: &AttachmentDescriptor, max_attachment_bytes: u64) -> Result<Attachment, SourceExtraction> {
    let url = descriptor
        .url
        .as_deref()
        .ok_or_else(|| SourceExtraction::skipped("attachment", &descriptor.filename, "missing_url"))?;

    let size = storage
        .size(url)
        .await
        .map_err(|e| SourceExtraction::skipped("attachment", &descriptor.filename, &e.to_string()))?;
    if size > max_attachment_bytes {
        return Err(SourceExtraction::skipped("attachment", &descriptor.filename, "file_too_large"));
    }

    let scoped = storage
        .download(url, max_attachment_bytes)
        .await
        .map_err(|e| SourceExtraction::skipped("attachment", &descriptor.filename, &e.to_string()))?;
    let bytes = scoped
        .read_bytes()
        .map_err(|e| SourceExtraction::skipped("attachment", &descriptor.filename, &e.to_string()))?;

    Ok(Attachment {
        file_name: descriptor.filename.clone(),
        media_type: descriptor.mime_type.clone(),
        bytes,
    })
}

pub async fn run(
    pool: &PgPool,
    llm: &dyn LlmCapability,
    storage: &dyn AttachmentStorage,
    budget: &mut TokenBudgetTracker,
    message_id: Uuid,
    cleaned_body: &str,
    attachments: &[AttachmentDescriptor],
    agent1: &IntentResult,
    max_attachment_bytes: u64,
) -> anyhow::Result<Agent2Result> {
    if let Some(checkpoint) = cem_db::checkpoints::get(pool, message_id, stage::AGENT_2_EXTRACTION).await? {
        if checkpoint.is_replay_skippable() {
            return Ok(serde_json::from_value(checkpoint.payload)?);
        }
    }

    let result = if agent1.skip_extraction {
        Agent2Result {
            consolidated: cem_extract::consolidator::consolidate(&[]),
            sources: Vec::new(),
            needs_review: agent1.needs_review,
            skip_extraction: true,
        }
    } else {
        let mut downloaded = Vec::new();
        let mut download_failures = Vec::new();
        for descriptor in attachments {
            match download_attachment(storage, descriptor, max_attachment_bytes).await {
                Ok(attachment) => downloaded.push(attachment),
                Err(skip) => download_failures.push(skip),
            }
        }

        let (extracted_sources, _) = cem_extract::extract_all(llm, budget, cleaned_body, &downloaded).await;
        let mut sources = extracted_sources;
        sources.extend(download_failures);
        let consolidated = cem_extract::consolidator::consolidate(&sources);

        Agent2Result {
            consolidated,
            sources,
            needs_review: agent1.needs_review,
            skip_extraction: false,
        }
    };

    let validation_status = if result.needs_review { ValidationStatus::NeedsReview } else { ValidationStatus::Passed };
    let checkpoint = Checkpoint::new(serde_json::to_value(&result)?, validation_status);
    cem_db::checkpoints::save(pool, message_id, stage::AGENT_2_EXTRACTION, &checkpoint).await?;

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_extraction_still_yields_default_amount() {
        let consolidated = cem_extract::consolidator::consolidate(&[]);
        assert!(consolidated.used_default_amount);
        assert_eq!(consolidated.gesamtforderung.value.to_string(), "100.00");
    }
}
