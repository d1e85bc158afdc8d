//! Per-signal fuzzy scorers (§4.7). The corpus carries no fuzzywuzzy-style
//! crate, so the token-sort/token-set/partial ratios are built on top of
//! `strsim::normalized_levenshtein`, the closest primitive strsim offers to
//! the `SequenceMatcher`-based `ratio()` the original scorers use.

use std::collections::BTreeSet;

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

fn token_sort_ratio(a: &str, b: &str) -> f64 {
    fn sorted_tokens(s: &str) -> String {
        let mut words: Vec<&str> = s.split_whitespace().collect();
        words.sort_unstable();
        words.join(" ")
    }
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

/// Mirrors fuzzywuzzy's `token_set_ratio`: split both strings into token
/// sets, then compare the shared tokens against each side's full token set
/// (shared ∪ unique-to-that-side) and take the best of the three pairings.
fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();

    let intersection: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let only_a: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let only_b: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    let join = |parts: &[&str]| parts.join(" ");
    let sorted_tokens = intersection.join(" ");
    let combined_a = join(&[intersection.clone(), only_a].concat());
    let combined_b = join(&[intersection.clone(), only_b].concat());

    [
        ratio(&sorted_tokens, &combined_a),
        ratio(&sorted_tokens, &combined_b),
        ratio(&combined_a, &combined_b),
    ]
    .into_iter()
    .fold(0.0_f64, f64::max)
}

/// Slides the shorter string across the longer one and keeps the best
/// same-length-window ratio, mirroring fuzzywuzzy's `partial_ratio`.
fn partial_ratio(a: &str, b: &str) -> f64 {
    let (shorter, longer) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if shorter.is_empty() {
        return if longer.is_empty() { 1.0 } else { 0.0 };
    }
    if shorter.len() >= longer.len() {
        return ratio(shorter, longer);
    }

    let longer_chars: Vec<char> = longer.chars().collect();
    let window = shorter.chars().count();
    let mut best = 0.0_f64;
    for start in 0..=(longer_chars.len() - window) {
        let candidate: String = longer_chars[start..start + window].iter().collect();
        best = best.max(ratio(shorter, &candidate));
    }
    best
}

/// Client-name signal (§4.7): max of token-sort, partial, and token-set
/// ratios over normalized (lowercased, punctuation-stripped) forms.
pub fn name_score(extracted_name: &str, inquiry_name: &str) -> f64 {
    let a = normalize(extracted_name);
    let b = normalize(inquiry_name);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    [token_sort_ratio(&a, &b), partial_ratio(&a, &b), token_set_ratio(&a, &b)]
        .into_iter()
        .fold(0.0_f64, f64::max)
}

/// Cutoff below which a fuzzy reference-number comparison is treated as no
/// match at all (§4.7 "with cutoff 0.80" — not spelled out whether a
/// below-cutoff score is zeroed or kept; zeroing it is the DESIGN.md
/// decision, since a below-cutoff reference match is weaker evidence than
/// having no reference number at all would imply).
pub const REFERENCE_FUZZY_CUTOFF: f64 = 0.80;

fn reference_pair_score(extracted: &str, inquiry: &str) -> f64 {
    let a = extracted.trim().to_uppercase();
    let b = inquiry.trim().to_uppercase();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let fuzzy = partial_ratio(&a, &b).max(token_sort_ratio(&a, &b));
    if fuzzy < REFERENCE_FUZZY_CUTOFF {
        0.0
    } else {
        fuzzy
    }
}

/// Reference-number signal (§4.7): best score across every extracted
/// reference against the inquiry's single reference number.
pub fn reference_score(extracted_references: &[String], inquiry_reference: Option<&str>) -> f64 {
    let Some(inquiry_reference) = inquiry_reference else { return 0.0 };
    extracted_references
        .iter()
        .map(|extracted| reference_pair_score(extracted, inquiry_reference))
        .fold(0.0_f64, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_names_score_one() {
        assert_eq!(name_score("Max Mustermann", "Max Mustermann"), 1.0);
    }

    #[test]
    fn reordered_names_score_high_via_token_sort() {
        assert!(name_score("Mustermann Max", "Max Mustermann") > 0.9);
    }

    #[test]
    fn exact_reference_scores_one_regardless_of_case() {
        assert_eq!(reference_score(&["ab-123".to_string()], Some("AB-123")), 1.0);
    }

    #[test]
    fn dissimilar_reference_scores_zero_below_cutoff() {
        assert_eq!(reference_score(&["ZZZZZZ".to_string()], Some("AB-123")), 0.0);
    }

    #[test]
    fn missing_inquiry_reference_scores_zero() {
        assert_eq!(reference_score(&["AB-123".to_string()], None), 0.0);
    }
}
