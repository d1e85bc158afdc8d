//! Shared text preprocessing (§4.4): NFKC normalization, dictionary-gated
//! umlaut restoration, and name-field-only digit substitution.
//!
//! The original system validates restored umlaut spellings against a full
//! German dictionary (pyspellchecker). No dictionary crate appears in this
//! workspace's dependency corpus, so restoration here is gated against a
//! small curated word list covering the domain vocabulary (surnames and
//! terms that actually appear in creditor correspondence) rather than a
//! general-purpose German lexicon. Restoration still never runs
//! speculatively: a digraph is only replaced when the candidate is a known
//! word.

use unicode_normalization::UnicodeNormalization;

const UMLAUT_RESTORATIONS: [(&str, char); 3] = [("ue", 'ü'), ("oe", 'ö'), ("ae", 'ä')];

/// Curated words where the umlaut-restored spelling is the one we should
/// prefer over the OCR'd digraph form. Lowercase, digraph-restored.
const KNOWN_GERMAN_WORDS: &[&str] = &[
    "müller", "schäfer", "bäcker", "mühle", "grün", "göthe", "köln", "düsseldorf", "gläubiger",
    "schön", "größe", "höhe", "mühe", "für", "über", "wäre", "märz", "könnte", "würde", "hätte",
];

/// NFKC-normalize then apply dictionary-gated umlaut restoration.
pub fn preprocess(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let normalized: String = text.nfkc().collect();
    normalized
        .split(' ')
        .map(restore_umlauts_in_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn restore_umlauts_in_word(word: &str) -> String {
    let lower = word.to_lowercase();
    for (digraph, umlaut) in UMLAUT_RESTORATIONS {
        if let Some(pos) = lower.find(digraph) {
            let mut candidate = String::with_capacity(word.len());
            candidate.push_str(&word[..pos]);
            candidate.push(umlaut);
            candidate.push_str(&word[pos + digraph.len()..]);
            if KNOWN_GERMAN_WORDS.contains(&candidate.to_lowercase().as_str()) {
                return candidate;
            }
        }
    }
    word.to_string()
}

/// Digit-to-letter substitution for name/address fields only (§4.4).
/// Never applied to amounts or reference numbers.
pub fn correct_name_field(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '3' => 'e',
            '0' => 'o',
            '1' => 'l',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restores_known_digraph_words() {
        assert_eq!(preprocess("Mueller"), "Müller");
        assert_eq!(preprocess("Schaefer"), "Schäfer");
    }

    #[test]
    fn leaves_unknown_digraph_words_alone() {
        assert_eq!(preprocess("Huelsmeyer"), "Huelsmeyer");
    }

    #[test]
    fn correct_name_field_substitutes_digits_only_for_name_text() {
        assert_eq!(correct_name_field("M3y3r"), "Meyer");
        assert_eq!(correct_name_field("1234,56"), "l2e4,56");
    }
}
