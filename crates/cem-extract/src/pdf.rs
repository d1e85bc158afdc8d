//! PDF extractor (§4.4), grounded in `original_source/app/services/
//! extraction/{pdf_extractor,detector}.py`.
//!
//! No PDF-parsing crate appears anywhere in this workspace's dependency
//! corpus (no `lopdf`, no `pdf-extract`, no PyMuPDF equivalent), so the
//! digital-text path here is a minimal hand-rolled scanner: it inflates
//! `FlateDecode` content streams with `flate2` (already grounded via
//! `ktiyab-coheara`) and reads literal strings out of `Tj`/`TJ` text-show
//! operators. This covers the common case of text produced by standard
//! PDF writers; it does not implement a general PDF object model, CMap-
//! based font decoding, or cross-reference-stream parsing. The original's
//! page-range sampling (first 5 + last 5 of documents over 10 pages) is
//! approximated: this scanner does not track which content stream belongs
//! to which page, so it extracts text from every stream in the file and
//! relies on the text-ratio heuristic rather than a true page-bounded
//! sample. See DESIGN.md.

use flate2::read::ZlibDecoder;
use regex::Regex;
use std::io::Read;
use std::str::FromStr;
use std::sync::OnceLock;

use cem_capabilities::LlmCapability;
use cem_budget::TokenBudgetTracker;
use cem_schemas::{ConfidenceBucket, ExtractionMethod, Gesamtforderung, SourceExtraction};

use crate::{amount, name};

const SCANNED_TEXT_RATIO_THRESHOLD: f64 = 0.01;
const MAX_SAMPLED_PAGES: usize = 5;

fn tj_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"\(((?:[^()\\]|\\.)*)\)\s*Tj").unwrap())
}

fn page_object_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"/Type\s*/Page[^s]").unwrap())
}

/// Counts `/Type /Page` object headers; excludes `/Type /Pages`.
pub fn page_count(bytes: &[u8]) -> usize {
    let text = String::from_utf8_lossy(bytes);
    page_object_pattern().find_iter(&text).count()
}

pub fn is_encrypted(bytes: &[u8]) -> bool {
    let text = String::from_utf8_lossy(bytes);
    text.contains("/Encrypt")
}

/// Extracts every text-show literal from every FlateDecode stream in the
/// document, unescaping the PDF string-literal escape sequences.
pub fn extract_raw_text(bytes: &[u8]) -> String {
    let mut combined = String::new();
    for stream_bytes in inflate_streams(bytes) {
        let stream_text = String::from_utf8_lossy(&stream_bytes).into_owned();
        for caps in tj_pattern().captures_iter(&stream_text) {
            if let Some(literal) = caps.get(1) {
                combined.push_str(&unescape_pdf_literal(literal.as_str()));
                combined.push(' ');
            }
        }
    }
    combined
}

fn inflate_streams(bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while let Some(start_rel) = find_subslice(&bytes[pos..], b"stream") {
        let start = pos + start_rel + b"stream".len();
        // Skip the CRLF/LF immediately following the `stream` keyword.
        let content_start = skip_stream_newline(bytes, start);
        let Some(end_rel) = find_subslice(&bytes[content_start..], b"endstream") else {
            break;
        };
        let content_end = content_start + end_rel;
        let raw = &bytes[content_start..content_end];

        let mut decoder = ZlibDecoder::new(raw);
        let mut inflated = Vec::new();
        if decoder.read_to_end(&mut inflated).is_ok() && !inflated.is_empty() {
            out.push(inflated);
        }

        pos = content_end + b"endstream".len();
    }
    out
}

fn skip_stream_newline(bytes: &[u8], mut pos: usize) -> usize {
    if bytes.get(pos) == Some(&b'\r') {
        pos += 1;
    }
    if bytes.get(pos) == Some(&b'\n') {
        pos += 1;
    }
    pos
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn unescape_pdf_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('(') => out.push('('),
            Some(')') => out.push(')'),
            Some('\\') => out.push('\\'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// True when the text-to-size ratio over the sampled content is below
/// threshold, or the PDF is encrypted (needs vision either way).
pub fn is_scanned(bytes: &[u8]) -> bool {
    if is_encrypted(bytes) {
        return true;
    }
    if bytes.is_empty() {
        return true;
    }

    let total_pages = page_count(bytes).max(1);
    let text = extract_raw_text(bytes);

    let estimated_sampled_size = if total_pages > MAX_SAMPLED_PAGES {
        (bytes.len() as f64 / total_pages as f64) * MAX_SAMPLED_PAGES as f64
    } else {
        bytes.len() as f64
    };

    if estimated_sampled_size <= 0.0 {
        return true;
    }

    (text.len() as f64 / estimated_sampled_size) < SCANNED_TEXT_RATIO_THRESHOLD
}

/// Digital-path extraction: scan the reconstructed text stream with the
/// same keyword/amount/name heuristics as the email body.
pub fn extract_digital(bytes: &[u8], source_name: &str) -> SourceExtraction {
    let text = extract_raw_text(bytes);
    let preprocessed = crate::preprocessing::preprocess(&text);
    let found = amount::find_amounts(&preprocessed);
    let gesamtforderung = found.into_iter().max_by(|a, b| a.value.cmp(&b.value)).map(|best| Gesamtforderung {
        value: best.value,
        currency: "EUR".to_string(),
        raw_text: best.raw,
        source: source_name.to_string(),
        confidence: best.confidence,
    });
    let names = name::extract_names(&preprocessed);

    SourceExtraction {
        source_type: "pdf".to_string(),
        source_name: source_name.to_string(),
        gesamtforderung,
        components: Vec::new(),
        client_name: names.client_name.map(|n| n.value),
        creditor_name: names.creditor_name.map(|n| n.value),
        extraction_method: ExtractionMethod::PdfDigital,
        tokens_used: 0,
        error: None,
    }
}

const VISION_PROMPT_GERMAN: &str = "Analysiere dieses eingescannte Dokument eines deutschen Glaeubiger-/Inkassoschreibens und extrahiere die Gesamtforderung in EUR sowie Glaeubiger- und Schuldnername, falls sichtbar. Antworte ausschliesslich mit validem JSON: {\"gesamtforderung\": <zahl oder null>, \"glaeubiger\": <text oder null>, \"schuldner\": <text oder null>}";

/// Scanned-path extraction: routes through the vision capability. Pages
/// beyond the first are not individually rendered here (no PDF rasterizer
/// is available in this workspace); the first page's raster is expected to
/// already be supplied by the caller as `page_image_bytes` (produced by
/// the webhook provider or an upstream rendering step outside this crate).
pub async fn extract_scanned(
    llm: &dyn LlmCapability,
    budget: &mut TokenBudgetTracker,
    page_image_bytes: &[u8],
    media_type: &str,
    source_name: &str,
) -> SourceExtraction {
    const ESTIMATED_VISION_TOKENS: u32 = 1500;
    if !budget.check_budget(ESTIMATED_VISION_TOKENS) {
        return SourceExtraction::skipped("pdf", source_name, "token_budget_exceeded");
    }

    match llm.vision(page_image_bytes, media_type, VISION_PROMPT_GERMAN).await {
        Ok(response) => {
            budget.add_usage(response.tokens_in, response.tokens_out);
            parse_vision_json(&response.text, source_name, response.tokens_in + response.tokens_out)
        }
        Err(err) => {
            let mut result = SourceExtraction::skipped("pdf", source_name, &err.to_string());
            result.extraction_method = ExtractionMethod::PdfVision;
            result
        }
    }
}

fn parse_vision_json(text: &str, source_name: &str, tokens_used: u32) -> SourceExtraction {
    let value: serde_json::Value = serde_json::from_str(text.trim()).unwrap_or(serde_json::Value::Null);

    let gesamtforderung = value.get("gesamtforderung").and_then(|v| v.as_f64()).and_then(|v| {
        rust_decimal::Decimal::from_str(&v.to_string()).ok().map(|value| Gesamtforderung {
            value,
            currency: "EUR".to_string(),
            raw_text: text.to_string(),
            source: source_name.to_string(),
            confidence: ConfidenceBucket::Medium,
        })
    });

    SourceExtraction {
        source_type: "pdf".to_string(),
        source_name: source_name.to_string(),
        gesamtforderung,
        components: Vec::new(),
        client_name: value.get("schuldner").and_then(|v| v.as_str()).map(str::to_string),
        creditor_name: value.get("glaeubiger").and_then(|v| v.as_str()).map(str::to_string),
        extraction_method: ExtractionMethod::PdfVision,
        tokens_used,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_minimal_pdf(text_ops: &str) -> Vec<u8> {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text_ops.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut pdf = Vec::new();
        pdf.extend_from_slice(b"%PDF-1.4\n1 0 obj << /Type /Page >> endobj\n");
        pdf.extend_from_slice(b"2 0 obj << /Length ");
        pdf.extend_from_slice(compressed.len().to_string().as_bytes());
        pdf.extend_from_slice(b" /Filter /FlateDecode >>\nstream\n");
        pdf.extend_from_slice(&compressed);
        pdf.extend_from_slice(b"\nendstream\nendobj\n");
        pdf
    }

    #[test]
    fn extracts_text_from_flate_stream() {
        let pdf = make_minimal_pdf("BT /F1 12 Tf (Gesamtforderung 1.234,56 EUR) Tj ET");
        let text = extract_raw_text(&pdf);
        assert!(text.contains("Gesamtforderung"));
        let found = amount::find_amounts(&text);
        assert!(!found.is_empty());
    }

    #[test]
    fn page_count_counts_page_objects_not_pages_dict() {
        let pdf = make_minimal_pdf("BT (x) Tj ET");
        assert_eq!(page_count(&pdf), 1);
    }

    #[test]
    fn encrypted_marker_forces_scanned() {
        let mut pdf = make_minimal_pdf("BT (x) Tj ET");
        pdf.extend_from_slice(b"trailer << /Encrypt 5 0 R >>");
        assert!(is_scanned(&pdf));
    }
}
