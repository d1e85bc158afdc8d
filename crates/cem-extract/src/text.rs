//! Email body extractor (§4.4) — the simplest extractor; no attachment
//! bytes, no API calls, pure regex over the already-cleaned body.

use cem_schemas::{ExtractionMethod, Gesamtforderung, SourceExtraction};

use crate::{amount, name, preprocessing};

pub fn extract(cleaned_body: &str) -> SourceExtraction {
    if cleaned_body.trim().is_empty() {
        return SourceExtraction::skipped("email_body", "email_body", "empty_email_body");
    }

    let preprocessed = preprocessing::preprocess(cleaned_body);
    let found = amount::find_amounts(&preprocessed);

    let gesamtforderung = found.into_iter().max_by(|a, b| a.value.cmp(&b.value)).map(|best| Gesamtforderung {
        value: best.value,
        currency: "EUR".to_string(),
        raw_text: best.raw,
        source: "email_body".to_string(),
        confidence: best.confidence,
    });

    let names = name::extract_names(&preprocessed);

    SourceExtraction {
        source_type: "email_body".to_string(),
        source_name: "email_body".to_string(),
        gesamtforderung,
        components: Vec::new(),
        client_name: names.client_name.map(|n| n.value),
        creditor_name: names.creditor_name.map(|n| n.value),
        extraction_method: ExtractionMethod::TextRegex,
        tokens_used: 0,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_amount_and_names_from_body() {
        let result = extract("Mandant: Hans Mueller. Die Gesamtforderung betraegt 1.234,56 EUR.");
        assert_eq!(result.gesamtforderung.unwrap().value.to_string(), "1234.56");
        assert_eq!(result.client_name.as_deref(), Some("Hans Müller"));
    }

    #[test]
    fn empty_body_is_skipped() {
        let result = extract("   ");
        assert!(result.error.is_some());
    }
}
