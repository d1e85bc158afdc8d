//! Image attachment extractor (§4.4), grounded in `original_source/app/
//! services/extraction/image_extractor.py`. Decoding and resizing use the
//! `image` crate (grounded via `Dicklesworthstone-mcp_agent_mail_rust` and
//! `ktiyab-coheara`); there is no local OCR in this workspace's corpus, so
//! every image always routes through `LlmCapability::vision` and its
//! confidence is capped at MEDIUM regardless of what the model reports.

use std::io::Cursor;

use image::{imageops::FilterType, ImageFormat, ImageReader};

use cem_budget::TokenBudgetTracker;
use cem_capabilities::LlmCapability;
use cem_schemas::{ConfidenceBucket, ExtractionMethod, Gesamtforderung, SourceExtraction};

const MAX_BYTES_BEFORE_RESIZE: usize = 5 * 1024 * 1024;
const MAX_DIMENSION_PX: u32 = 1500;
const ESTIMATED_VISION_TOKENS: u32 = 1500;

const VISION_PROMPT_GERMAN: &str = "Analysiere dieses Bild eines deutschen Glaeubiger-/Inkassoschreibens und extrahiere die Gesamtforderung in EUR sowie Glaeubiger- und Schuldnername, falls sichtbar. Antworte ausschliesslich mit validem JSON: {\"gesamtforderung\": <zahl oder null>, \"glaeubiger\": <text oder null>, \"schuldner\": <text oder null>}";

/// Downscales to at most `MAX_DIMENSION_PX` on the longest side when the
/// input exceeds `MAX_BYTES_BEFORE_RESIZE`; re-encodes as JPEG. Returns the
/// original bytes unchanged when already under the threshold or when
/// decoding fails (the caller's vision call will surface the real error).
pub fn prepare_for_vision(bytes: &[u8]) -> Vec<u8> {
    if bytes.len() <= MAX_BYTES_BEFORE_RESIZE {
        return bytes.to_vec();
    }

    let Ok(reader) = ImageReader::new(Cursor::new(bytes)).with_guessed_format() else {
        return bytes.to_vec();
    };
    let Ok(decoded) = reader.decode() else {
        return bytes.to_vec();
    };

    let (width, height) = (decoded.width(), decoded.height());
    let longest = width.max(height);
    let resized = if longest > MAX_DIMENSION_PX {
        let scale = MAX_DIMENSION_PX as f32 / longest as f32;
        let new_width = ((width as f32) * scale).round().max(1.0) as u32;
        let new_height = ((height as f32) * scale).round().max(1.0) as u32;
        decoded.resize(new_width, new_height, FilterType::Lanczos3)
    } else {
        decoded
    };

    let mut out = Vec::new();
    if resized.write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg).is_ok() {
        out
    } else {
        bytes.to_vec()
    }
}

pub async fn extract(
    llm: &dyn LlmCapability,
    budget: &mut TokenBudgetTracker,
    bytes: &[u8],
    media_type: &str,
    source_name: &str,
) -> SourceExtraction {
    if !budget.check_budget(ESTIMATED_VISION_TOKENS) {
        return SourceExtraction::skipped("image", source_name, "token_budget_exceeded");
    }

    let prepared = prepare_for_vision(bytes);

    match llm.vision(&prepared, media_type, VISION_PROMPT_GERMAN).await {
        Ok(response) => {
            budget.add_usage(response.tokens_in, response.tokens_out);
            parse_vision_json(&response.text, source_name, response.tokens_in + response.tokens_out)
        }
        Err(err) => {
            let mut result = SourceExtraction::skipped("image", source_name, &err.to_string());
            result.extraction_method = ExtractionMethod::ImageVision;
            result
        }
    }
}

fn parse_vision_json(text: &str, source_name: &str, tokens_used: u32) -> SourceExtraction {
    use std::str::FromStr;

    let value: serde_json::Value = serde_json::from_str(text.trim()).unwrap_or(serde_json::Value::Null);

    // Vision extraction is never trusted above MEDIUM: there is no
    // independent digital-text signal to corroborate against, unlike the
    // PDF digital path.
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
        source_type: "image".to_string(),
        source_name: source_name.to_string(),
        gesamtforderung,
        components: Vec::new(),
        client_name: value.get("schuldner").and_then(|v| v.as_str()).map(str::to_string),
        creditor_name: value.get("glaeubiger").and_then(|v| v.as_str()).map(str::to_string),
        extraction_method: ExtractionMethod::ImageVision,
        tokens_used,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cem_capabilities::{LlmError, LlmResponse};

    struct StubLlm {
        response: String,
    }

    #[async_trait::async_trait]
    impl LlmCapability for StubLlm {
        async fn classify(&self, _prompt: &str, _model: &str, _max_tokens: u32, _temperature: f32) -> Result<LlmResponse, LlmError> {
            unimplemented!("not exercised by these tests")
        }

        async fn vision(&self, _bytes: &[u8], _media_type: &str, _prompt: &str) -> Result<LlmResponse, LlmError> {
            Ok(LlmResponse { text: self.response.clone(), tokens_in: 400, tokens_out: 50 })
        }
    }

    #[test]
    fn small_image_passes_through_unchanged() {
        let bytes = vec![0u8; 100];
        assert_eq!(prepare_for_vision(&bytes), bytes);
    }

    #[tokio::test]
    async fn extract_caps_confidence_at_medium_even_when_model_is_confident() {
        let llm = StubLlm {
            response: r#"{"gesamtforderung": 842.17, "glaeubiger": "Acme Inkasso GmbH", "schuldner": null}"#.to_string(),
        };
        let mut budget = TokenBudgetTracker::new(10_000, 0.0, 0.0);
        let result = extract(&llm, &mut budget, b"fake-jpeg-bytes", "image/jpeg", "scan.jpg").await;
        let amount = result.gesamtforderung.expect("amount should parse");
        assert_eq!(amount.value.to_string(), "842.17");
        assert_eq!(amount.confidence, ConfidenceBucket::Medium);
        assert_eq!(result.creditor_name.as_deref(), Some("Acme Inkasso GmbH"));
    }

    #[tokio::test]
    async fn extract_skips_when_budget_exhausted() {
        let llm = StubLlm { response: "{}".to_string() };
        let mut budget = TokenBudgetTracker::new(10, 0.0, 0.0);
        let result = extract(&llm, &mut budget, b"fake-jpeg-bytes", "image/jpeg", "scan.jpg").await;
        assert!(result.error.is_some());
    }
}
