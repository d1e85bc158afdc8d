//! Multi-format extraction engine (§4.4/§4.5): turns an email body plus its
//! attachments into one consolidated `Gesamtforderung` + party-name guess.
//! Each format module is self-contained and independently testable; this
//! crate's only orchestration logic is attachment format priority and the
//! consolidation merge, both grounded in `original_source/app/services/
//! extraction/{email_body_extractor,consolidator}.py`.

pub mod amount;
pub mod cleaning;
pub mod consolidator;
pub mod docx;
pub mod image;
pub mod name;
pub mod pdf;
pub mod preprocessing;
pub mod reference;
pub mod text;
pub mod xlsx;

use cem_budget::TokenBudgetTracker;
use cem_capabilities::LlmCapability;
use cem_schemas::{ConsolidatedExtraction, SourceExtraction};

/// One attachment as handed to `extract_all` by the caller (Agent 2):
/// already-downloaded bytes plus enough metadata to route by format.
pub struct Attachment {
    pub file_name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum FormatPriority {
    Pdf,
    Docx,
    Xlsx,
    Image,
    Other,
}

fn priority_of(media_type: &str, file_name: &str) -> FormatPriority {
    let lower_type = media_type.to_lowercase();
    let lower_name = file_name.to_lowercase();
    if lower_type.contains("pdf") || lower_name.ends_with(".pdf") {
        FormatPriority::Pdf
    } else if lower_type.contains("wordprocessingml") || lower_name.ends_with(".docx") {
        FormatPriority::Docx
    } else if lower_type.contains("spreadsheetml") || lower_name.ends_with(".xlsx") {
        FormatPriority::Xlsx
    } else if lower_type.starts_with("image/") || lower_name.ends_with(".jpg") || lower_name.ends_with(".jpeg") || lower_name.ends_with(".png") {
        FormatPriority::Image
    } else {
        FormatPriority::Other
    }
}

/// Extracts from the email body and every attachment, in format-priority
/// order (PDF > DOCX > XLSX > image), stopping attachment processing early
/// once the token budget is too thin to usefully continue. Returns every
/// per-source result plus the consolidated merge; callers persist both.
pub async fn extract_all(
    llm: &dyn LlmCapability,
    budget: &mut TokenBudgetTracker,
    cleaned_body: &str,
    attachments: &[Attachment],
) -> (Vec<SourceExtraction>, ConsolidatedExtraction) {
    const MIN_TOKENS_TO_CONTINUE: u32 = 1000;

    let mut sources = vec![text::extract(cleaned_body)];

    let mut ordered: Vec<&Attachment> = attachments.iter().collect();
    ordered.sort_by_key(|a| priority_of(&a.media_type, &a.file_name));

    for attachment in ordered {
        if budget.remaining() < MIN_TOKENS_TO_CONTINUE {
            sources.push(SourceExtraction::skipped(
                "attachment",
                &attachment.file_name,
                "token_budget_floor_reached",
            ));
            continue;
        }

        let result = match priority_of(&attachment.media_type, &attachment.file_name) {
            FormatPriority::Pdf => {
                if pdf::is_scanned(&attachment.bytes) {
                    pdf::extract_scanned(llm, budget, &attachment.bytes, &attachment.media_type, &attachment.file_name).await
                } else {
                    pdf::extract_digital(&attachment.bytes, &attachment.file_name)
                }
            }
            FormatPriority::Docx => docx::extract(&attachment.bytes, &attachment.file_name),
            FormatPriority::Xlsx => xlsx::extract(&attachment.bytes, &attachment.file_name),
            FormatPriority::Image => image::extract(llm, budget, &attachment.bytes, &attachment.media_type, &attachment.file_name).await,
            FormatPriority::Other => SourceExtraction::skipped("attachment", &attachment.file_name, "unsupported_format"),
        };
        sources.push(result);
    }

    let consolidated = consolidator::consolidate(&sources);
    (sources, consolidated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_outranks_image_in_priority_ordering() {
        assert!(priority_of("application/pdf", "a.pdf") < priority_of("image/jpeg", "b.jpg"));
    }

    #[test]
    fn unknown_media_type_falls_back_to_extension() {
        assert_eq!(priority_of("application/octet-stream", "invoice.xlsx"), FormatPriority::Xlsx);
    }
}
