//! Reference number extraction from the cleaned email body (§4.7 "reference
//! numbers list"), supplemented from `original_source/app/services/
//! entity_extractor_claude.py`'s `reference_numbers` field — the original
//! recovers these via an LLM entity-extraction call; this crate's
//! extractors are regex-only (§1 "per-field regex detail" out of scope for
//! the distillation, but the matcher needs *some* reference signal), so
//! this is a cheap labelled-field regex instead of a model call.
//!
//! Recognises `Aktenzeichen`/`Kundennummer`/`Vertragsnummer`/
//! `Rechnungsnummer`-labelled values plus bare `AZ-`-prefixed and
//! underscore-joined case numbers (`476982_64928`) that appear unlabelled
//! in collection-agency boilerplate.

use regex::Regex;
use std::sync::OnceLock;

fn labelled_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| {
        Regex::new(r"(?i)(?:Aktenzeichen|Kundennummer|Vertragsnummer|Rechnungsnummer)[:\s]+([A-Za-z0-9][A-Za-z0-9\-_/]{1,30})").unwrap()
    })
}

fn bare_az_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"(?i)\bAZ[-\s]?[A-Za-z0-9]{2,20}\b").unwrap())
}

fn underscore_case_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"\b\d{4,8}_\d{3,8}\b").unwrap())
}

/// Extracts every distinct reference number candidate from `text`,
/// preserving first-seen order. Labelled matches are trusted over bare
/// ones but all are returned — the matcher tries every extracted
/// reference and keeps the best score (§4.7).
pub fn extract_reference_numbers(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    for caps in labelled_pattern().captures_iter(text) {
        push_unique(&mut out, &mut seen, caps.get(1).unwrap().as_str());
    }
    for m in bare_az_pattern().find_iter(text) {
        push_unique(&mut out, &mut seen, m.as_str());
    }
    for m in underscore_case_pattern().find_iter(text) {
        push_unique(&mut out, &mut seen, m.as_str());
    }

    out
}

fn push_unique(out: &mut Vec<String>, seen: &mut std::collections::HashSet<String>, raw: &str) {
    let trimmed = raw.trim().trim_end_matches(['.', ',']).to_string();
    if trimmed.is_empty() {
        return;
    }
    let key = trimmed.to_uppercase();
    if seen.insert(key) {
        out.push(trimmed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_labelled_aktenzeichen() {
        let refs = extract_reference_numbers("Unser Aktenzeichen: AZ-12345 betrifft Ihre Forderung.");
        assert_eq!(refs, vec!["AZ-12345".to_string()]);
    }

    #[test]
    fn extracts_bare_underscore_case_number() {
        let refs = extract_reference_numbers("Fallnummer 476982_64928 wurde bearbeitet.");
        assert_eq!(refs, vec!["476982_64928".to_string()]);
    }

    #[test]
    fn dedupes_case_insensitively() {
        let refs = extract_reference_numbers("AZ-999 ... az-999 nochmal AZ-999.");
        assert_eq!(refs.len(), 1);
    }

    #[test]
    fn no_reference_numbers_yields_empty_vec() {
        assert!(extract_reference_numbers("Keine Referenz hier.").is_empty());
    }
}
