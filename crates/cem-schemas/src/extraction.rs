use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::calibration::ConfidenceBucket;

/// Extraction method tag carried on a [`SourceExtraction`], used for
/// `ProcessingReport` diagnostics and by the consolidator's source-order
/// tie-break (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    TextRegex,
    PdfDigital,
    PdfVision,
    Docx,
    Xlsx,
    ImageVision,
    Skipped,
}

impl ExtractionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TextRegex => "text_regex",
            Self::PdfDigital => "pdf_digital",
            Self::PdfVision => "pdf_vision",
            Self::Docx => "docx",
            Self::Xlsx => "xlsx",
            Self::ImageVision => "image_vision",
            Self::Skipped => "skipped",
        }
    }

    /// Per-source quality baseline feeding the extraction confidence
    /// dimension's weakest-link rule (§4.8). `Skipped` sources contributed
    /// nothing and are excluded by the caller rather than scored here.
    pub fn quality_baseline(self) -> f64 {
        match self {
            Self::PdfDigital => 0.95,
            Self::Docx => 0.90,
            Self::Xlsx => 0.85,
            Self::TextRegex => 0.80,
            Self::PdfVision => 0.75,
            Self::ImageVision => 0.70,
            Self::Skipped => 0.60,
        }
    }
}

/// A single candidate total found in one source (§4.4). `source` names the
/// attachment (or `"body"` for the email text itself).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gesamtforderung {
    pub value: Decimal,
    pub currency: String,
    pub raw_text: String,
    pub source: String,
    pub confidence: ConfidenceBucket,
}

/// Per-artifact extraction output (§4.4). One of these is produced per
/// email body and per attachment; the consolidator merges a `Vec` of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceExtraction {
    pub source_type: String,
    pub source_name: String,
    pub gesamtforderung: Option<Gesamtforderung>,
    pub components: Vec<Gesamtforderung>,
    pub client_name: Option<String>,
    pub creditor_name: Option<String>,
    pub extraction_method: ExtractionMethod,
    pub tokens_used: u32,
    pub error: Option<String>,
}

impl SourceExtraction {
    pub fn skipped(source_type: &str, source_name: &str, reason: &str) -> Self {
        Self {
            source_type: source_type.to_string(),
            source_name: source_name.to_string(),
            gesamtforderung: None,
            components: Vec::new(),
            client_name: None,
            creditor_name: None,
            extraction_method: ExtractionMethod::Skipped,
            tokens_used: 0,
            error: Some(reason.to_string()),
        }
    }
}

/// Default amount applied when no source in a message yields a total
/// (§4.5, locked rule).
pub const DEFAULT_GESAMTFORDERUNG: &str = "100.00";
pub const DEFAULT_GESAMTFORDERUNG_CURRENCY: &str = "EUR";

/// Amounts closer than this are treated as the same candidate when the
/// consolidator deduplicates across sources (§4.5).
pub const AMOUNT_DEDUPE_TOLERANCE_EUR: &str = "1.00";

/// Merged, message-level extraction result (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedExtraction {
    pub gesamtforderung: Gesamtforderung,
    pub client_name: Option<String>,
    pub creditor_name: Option<String>,
    pub confidence: ConfidenceBucket,
    pub sources_processed: u32,
    pub sources_with_amount: u32,
    pub total_tokens_used: u32,
    pub used_default_amount: bool,
}
