//! Merges per-source extraction results into one message-level result
//! (§4.5). Rules are locked: highest deduplicated amount wins, default
//! 100.00 EUR LOW confidence when nothing is found, final confidence is
//! the weakest link, names prefer HIGH confidence then longest string.

use rust_decimal::Decimal;
use std::str::FromStr;

use cem_schemas::{
    ConfidenceBucket, ConsolidatedExtraction, Gesamtforderung, SourceExtraction,
    AMOUNT_DEDUPE_TOLERANCE_EUR, DEFAULT_GESAMTFORDERUNG, DEFAULT_GESAMTFORDERUNG_CURRENCY,
};

pub fn consolidate(sources: &[SourceExtraction]) -> ConsolidatedExtraction {
    if sources.is_empty() {
        return ConsolidatedExtraction {
            gesamtforderung: default_amount(),
            client_name: None,
            creditor_name: None,
            confidence: ConfidenceBucket::Low,
            sources_processed: 0,
            sources_with_amount: 0,
            total_tokens_used: 0,
            used_default_amount: true,
        };
    }

    let mut amounts: Vec<Gesamtforderung> = Vec::new();
    let mut client_names: Vec<(String, ConfidenceBucket)> = Vec::new();
    let mut creditor_names: Vec<(String, ConfidenceBucket)> = Vec::new();
    let mut confidences: Vec<ConfidenceBucket> = Vec::new();
    let mut total_tokens: u32 = 0;

    for source in sources {
        total_tokens += source.tokens_used;

        if let Some(g) = &source.gesamtforderung {
            amounts.push(g.clone());
            confidences.push(g.confidence);
        }
        // Per-component candidates (e.g. a PDF offering Hauptforderung +
        // Zinsen + Kosten when no single Gesamtforderung line was found)
        // also contribute to the dedupe/max pool.
        for component in &source.components {
            amounts.push(component.clone());
            confidences.push(component.confidence);
        }

        if let Some(name) = &source.client_name {
            // Source-level confidence isn't tracked per name field on
            // SourceExtraction; treat a present name as MEDIUM unless a
            // future extractor widens the type to carry its own bucket.
            client_names.push((name.clone(), ConfidenceBucket::Medium));
        }
        if let Some(name) = &source.creditor_name {
            creditor_names.push((name.clone(), ConfidenceBucket::Medium));
        }
    }

    let sources_with_amount = amounts.len() as u32;
    let (final_amount, used_default) = if amounts.is_empty() {
        confidences.push(ConfidenceBucket::Low);
        (default_amount(), true)
    } else {
        (pick_best_amount(amounts), false)
    };

    let final_confidence = confidences.into_iter().min_by_key(confidence_rank).unwrap_or(ConfidenceBucket::Low);

    ConsolidatedExtraction {
        gesamtforderung: final_amount,
        client_name: pick_best_name(client_names),
        creditor_name: pick_best_name(creditor_names),
        confidence: final_confidence,
        sources_processed: sources.len() as u32,
        sources_with_amount,
        total_tokens_used: total_tokens,
        used_default_amount: used_default,
    }
}

fn default_amount() -> Gesamtforderung {
    Gesamtforderung {
        value: Decimal::from_str(DEFAULT_GESAMTFORDERUNG).expect("compiled-in default amount parses"),
        currency: DEFAULT_GESAMTFORDERUNG_CURRENCY.to_string(),
        raw_text: DEFAULT_GESAMTFORDERUNG.to_string(),
        source: "default".to_string(),
        confidence: ConfidenceBucket::Low,
    }
}

fn confidence_rank(c: &ConfidenceBucket) -> u8 {
    match c {
        ConfidenceBucket::Low => 0,
        ConfidenceBucket::Medium => 1,
        ConfidenceBucket::High => 2,
    }
}

/// Deduplicates amounts within 1 EUR of each other (keeping the
/// higher-confidence, earlier-seen one as tie-break) then returns the max.
fn pick_best_amount(amounts: Vec<Gesamtforderung>) -> Gesamtforderung {
    let tolerance = Decimal::from_str(AMOUNT_DEDUPE_TOLERANCE_EUR).expect("compiled-in tolerance parses");
    let mut sorted = amounts;
    sorted.sort_by(|a, b| b.value.cmp(&a.value));

    let mut unique: Vec<Gesamtforderung> = Vec::new();
    for amount in sorted {
        let is_duplicate = unique.iter().any(|existing| (amount.value - existing.value).abs() < tolerance);
        if !is_duplicate {
            unique.push(amount);
        }
    }

    unique.into_iter().max_by(|a, b| a.value.cmp(&b.value)).expect("caller guarantees amounts is non-empty")
}

fn pick_best_name(names: Vec<(String, ConfidenceBucket)>) -> Option<String> {
    if names.is_empty() {
        return None;
    }
    let high_confidence: Vec<_> = names.iter().filter(|(_, c)| *c == ConfidenceBucket::High).collect();
    let pool = if high_confidence.is_empty() { names.iter().collect::<Vec<_>>() } else { high_confidence };
    pool.into_iter().max_by_key(|(name, _)| name.chars().count()).map(|(name, _)| name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cem_schemas::ExtractionMethod;

    fn source_with_amount(value: &str, confidence: ConfidenceBucket, name: &str) -> SourceExtraction {
        SourceExtraction {
            source_type: "pdf".to_string(),
            source_name: name.to_string(),
            gesamtforderung: Some(Gesamtforderung {
                value: Decimal::from_str(value).unwrap(),
                currency: "EUR".to_string(),
                raw_text: value.to_string(),
                source: name.to_string(),
                confidence,
            }),
            components: Vec::new(),
            client_name: None,
            creditor_name: None,
            extraction_method: ExtractionMethod::PdfDigital,
            tokens_used: 10,
            error: None,
        }
    }

    #[test]
    fn no_sources_falls_back_to_default() {
        let result = consolidate(&[]);
        assert!(result.used_default_amount);
        assert_eq!(result.gesamtforderung.value.to_string(), "100.00");
        assert_eq!(result.confidence, ConfidenceBucket::Low);
    }

    #[test]
    fn highest_amount_wins_across_sources() {
        let sources = vec![
            source_with_amount("500.00", ConfidenceBucket::High, "a.pdf"),
            source_with_amount("1200.50", ConfidenceBucket::Medium, "b.pdf"),
        ];
        let result = consolidate(&sources);
        assert_eq!(result.gesamtforderung.value.to_string(), "1200.50");
        assert!(!result.used_default_amount);
    }

    #[test]
    fn amounts_within_one_euro_are_deduplicated() {
        let sources = vec![
            source_with_amount("1000.00", ConfidenceBucket::High, "a.pdf"),
            source_with_amount("1000.40", ConfidenceBucket::Medium, "b.pdf"),
        ];
        let result = consolidate(&sources);
        // both collapse into one candidate group; max of the two remains
        assert_eq!(result.gesamtforderung.value.to_string(), "1000.40");
    }

    #[test]
    fn final_confidence_is_weakest_link() {
        let sources = vec![
            source_with_amount("500.00", ConfidenceBucket::High, "a.pdf"),
            source_with_amount("200.00", ConfidenceBucket::Low, "b.pdf"),
        ];
        let result = consolidate(&sources);
        assert_eq!(result.confidence, ConfidenceBucket::Low);
    }
}
