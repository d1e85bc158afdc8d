//! German name heuristics for `Mandant/Schuldner/Gläubiger/Inkasso` fields
//! (§4.4), grounded in `email_body_extractor.py` and `german_validator.py`.

use regex::Regex;
use std::sync::OnceLock;

use cem_schemas::ConfidenceBucket;

fn client_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"(?:Mandant|Schuldner|Kunde)[:\s]+([A-Za-zäöüÄÖÜß\-,\s]+)").unwrap())
}

fn creditor_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"(?:Gläubiger|Inkasso|Firma)[:\s]+([A-Za-zäöüÄÖÜß\-,\s]+)").unwrap())
}

fn trailing_punctuation() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"[,.\s]+$").unwrap())
}

fn name_format() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| {
        Regex::new(r"(?i)^[A-Za-zäöüÄÖÜß\-\s]+(von|zu|vom|zum|zur|der)?\s*[A-Za-zäöüÄÖÜß\-\s]*$").unwrap()
    })
}

/// `German_validator.py::validate_name`: length >= 2 and matches the
/// noble-prefix-tolerant name regex.
pub fn validate_name(name: &str) -> bool {
    let trimmed = name.trim();
    trimmed.chars().count() >= 2 && name_format().is_match(trimmed)
}

#[derive(Debug, Clone)]
pub struct ExtractedName {
    pub value: String,
    pub confidence: ConfidenceBucket,
}

pub struct ExtractedNames {
    pub client_name: Option<ExtractedName>,
    pub creditor_name: Option<ExtractedName>,
}

/// Extracts the first client and creditor name candidate, applying the
/// digit-substitution OCR correction to name text only and falling back
/// to LOW confidence when the validator rejects the format rather than
/// dropping the candidate outright.
pub fn extract_names(text: &str) -> ExtractedNames {
    ExtractedNames {
        client_name: extract_one(text, client_pattern()),
        creditor_name: extract_one(text, creditor_pattern()),
    }
}

fn extract_one(text: &str, pattern: &Regex) -> Option<ExtractedName> {
    let caps = pattern.captures(text)?;
    let raw = caps.get(1)?.as_str().trim();
    let cleaned = trailing_punctuation().replace(raw, "").to_string();
    let corrected = crate::preprocessing::correct_name_field(&cleaned);
    if corrected.chars().count() <= 3 {
        return None;
    }
    let confidence = if validate_name(&corrected) {
        ConfidenceBucket::Medium
    } else {
        ConfidenceBucket::Low
    };
    Some(ExtractedName { value: corrected, confidence })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_names_with_umlauts_and_noble_prefixes() {
        assert!(validate_name("Müller"));
        assert!(validate_name("von Goethe"));
        assert!(!validate_name("A"));
    }

    #[test]
    fn extracts_client_and_creditor_names() {
        let text = "Mandant: Hans Müller\nGläubiger: Inkasso Schmidt GmbH";
        let names = extract_names(text);
        assert_eq!(names.client_name.unwrap().value, "Hans Müller");
        assert_eq!(names.creditor_name.unwrap().value, "Inkasso Schmidt GmbH");
    }
}
