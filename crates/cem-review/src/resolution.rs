//! Review resolution and calibration capture (§4.11, §4.13). Resolving a
//! review item with `approved`/`corrected` feeds a labeled sample back into
//! the calibration store; `spam`/`rejected`/`escalated` are skipped since
//! they carry no signal about the pipeline's confidence calibration.

use anyhow::{Context, Result};
use cem_schemas::calibration::{CalibrationSample, ConfidenceBucket};
use cem_schemas::checkpoint::stage;
use cem_schemas::extraction::{ExtractionMethod, SourceExtraction};
use cem_schemas::message::ExtractedData;
use cem_schemas::review::ReviewResolution;
use sqlx::PgPool;
use uuid::Uuid;

/// Resolves a claimed review item and, for `approved`/`corrected`
/// resolutions, records a [`CalibrationSample`]. `corrected_data` is the
/// operator-supplied replacement extraction, required (and only
/// meaningful) when `resolution == Corrected`.
pub async fn resolve(
    pool: &PgPool,
    id: Uuid,
    resolution: ReviewResolution,
    notes: Option<&str>,
    corrected_data: Option<&ExtractedData>,
) -> Result<()> {
    let item = cem_db::review::get(pool, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("resolve: review item {id} not found"))?;
    if !item.is_claimed() {
        anyhow::bail!("resolve: review item {id} must be claimed before resolution");
    }
    if item.is_resolved() {
        anyhow::bail!("resolve: review item {id} is already resolved");
    }

    cem_db::review::resolve(pool, id, resolution, notes).await?;

    if matches!(resolution, ReviewResolution::Spam | ReviewResolution::Rejected | ReviewResolution::Escalated) {
        return Ok(());
    }

    let message = cem_db::messages::get(pool, item.message_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("resolve: message {} not found", item.message_id))?;

    let predicted_confidence = message.confidence.overall.unwrap_or(0.0);
    let confidence_bucket = ConfidenceBucket::from_score(
        predicted_confidence,
        cem_schemas::calibration::DEFAULT_CONFIDENCE_HIGH_THRESHOLD,
        cem_schemas::calibration::DEFAULT_CONFIDENCE_LOW_THRESHOLD,
    );

    let correction_type = if resolution == ReviewResolution::Corrected {
        match (message.extracted_data.as_ref(), corrected_data) {
            (Some(original), Some(corrected)) => Some(diff_correction_type(original, corrected)),
            _ => None,
        }
    } else {
        None
    };

    let document_type = document_type_from_checkpoint(pool, item.message_id).await?;

    let sample = CalibrationSample {
        id: Uuid::new_v4(),
        message_id: item.message_id,
        review_item_id: id,
        was_correct: resolution == ReviewResolution::Approved,
        correction_type,
        document_type,
        predicted_confidence,
        confidence_bucket,
        created_at: chrono::Utc::now(),
    };

    cem_db::metrics::record_calibration_sample(pool, &sample).await?;

    Ok(())
}

/// Diffs two [`ExtractedData`] values field-by-field; names the single
/// differing field, or `"multiple"` when more than one changed.
fn diff_correction_type(original: &ExtractedData, corrected: &ExtractedData) -> String {
    let mut changed = Vec::new();
    if original.gesamtforderung != corrected.gesamtforderung {
        changed.push("gesamtforderung");
    }
    if original.currency != corrected.currency {
        changed.push("currency");
    }
    if original.client_name != corrected.client_name {
        changed.push("client_name");
    }
    if original.creditor_name != corrected.creditor_name {
        changed.push("creditor_name");
    }
    if original.reference_numbers != corrected.reference_numbers {
        changed.push("reference_numbers");
    }

    match changed.as_slice() {
        [] => "none".to_string(),
        [single] => single.to_string(),
        _ => "multiple".to_string(),
    }
}

/// Derives a document-type tag from the A2 checkpoint's source mix: the
/// shared extraction method if all non-skipped sources agree, else
/// `"mixed"`.
async fn document_type_from_checkpoint(pool: &PgPool, message_id: Uuid) -> Result<Option<String>> {
    let Some(checkpoint) = cem_db::checkpoints::get(pool, message_id, stage::AGENT_2_EXTRACTION).await? else {
        return Ok(None);
    };

    #[derive(serde::Deserialize)]
    struct Agent2Payload {
        sources: Vec<SourceExtraction>,
    }
    let payload: Agent2Payload =
        serde_json::from_value(checkpoint.payload).context("document_type_from_checkpoint: payload deserialization failed")?;

    let methods: Vec<ExtractionMethod> = payload
        .sources
        .iter()
        .map(|s| s.extraction_method)
        .filter(|m| !matches!(m, ExtractionMethod::Skipped))
        .collect();

    Ok(match methods.split_first() {
        None => None,
        Some((first, rest)) if rest.iter().all(|m| m == first) => Some(first.as_str().to_string()),
        Some(_) => Some("mixed".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn base() -> ExtractedData {
        ExtractedData {
            gesamtforderung: Some(Decimal::from_str("100.00").unwrap()),
            currency: Some("EUR".to_string()),
            client_name: Some("Max Mustermann".to_string()),
            creditor_name: Some("Inkasso GmbH".to_string()),
            reference_numbers: vec!["AZ-1".to_string()],
            confidence: Some("HIGH".to_string()),
        }
    }

    #[test]
    fn single_field_change_names_that_field() {
        let mut corrected = base();
        corrected.gesamtforderung = Some(Decimal::from_str("250.00").unwrap());
        assert_eq!(diff_correction_type(&base(), &corrected), "gesamtforderung");
    }

    #[test]
    fn multiple_field_changes_report_multiple() {
        let mut corrected = base();
        corrected.gesamtforderung = Some(Decimal::from_str("250.00").unwrap());
        corrected.client_name = Some("Erika Musterfrau".to_string());
        assert_eq!(diff_correction_type(&base(), &corrected), "multiple");
    }

    #[test]
    fn identical_data_reports_none() {
        assert_eq!(diff_correction_type(&base(), &base()), "none");
    }
}
