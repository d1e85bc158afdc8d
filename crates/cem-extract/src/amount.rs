//! German-locale amount parsing and the labelled-amount regex family
//! (§4.4), grounded in `original_source/app/services/extraction/
//! german_parser.py` and `email_body_extractor.py`. German format
//! (`1.234,56`) is tried first, falling back to US format (`1,234.56`),
//! matching the original's babel-based `parse_german_amount`.

use once_cell_lite::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

use cem_schemas::ConfidenceBucket;

mod once_cell_lite {
    /// Minimal lazily-initialized static, avoiding a `once_cell`/`lazy_static`
    /// dependency neither the teacher nor the pack carries for this purpose.
    pub struct Lazy<T> {
        init: fn() -> T,
        cell: std::sync::OnceLock<T>,
    }

    impl<T> Lazy<T> {
        pub const fn new(init: fn() -> T) -> Self {
            Self {
                init,
                cell: std::sync::OnceLock::new(),
            }
        }
    }

    impl<T> std::ops::Deref for Lazy<T> {
        type Target = T;
        fn deref(&self) -> &T {
            self.cell.get_or_init(self.init)
        }
    }
}

static GERMAN_FORMAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,3}(\.\d{3})*(,\d+)?$").unwrap());
static US_FORMAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,3}(,\d{3})*(\.\d+)?$").unwrap());
static CURRENCY_STRIP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*(eur|euro|€)\s*").unwrap());

/// Amount patterns ordered by specificity (most specific first), identical
/// keyword family to the email-body extractor so DOCX/XLSX text scanning
/// can reuse it.
pub static AMOUNT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"[Gg]esamtforderung[:\s\w]*?([0-9][0-9.,]*)\s*(EUR|€)").unwrap(),
        Regex::new(r"[Gg]esamt(?:betrag|summe)[:\s\w]*?([0-9][0-9.,]*)\s*(EUR|€)").unwrap(),
        Regex::new(r"[Ff]orderung(?:shöhe|sbetrag)?[:\s\w]*?([0-9][0-9.,]*)\s*(EUR|€)").unwrap(),
        Regex::new(r"[Bb]etrag[:\s\w]*?([0-9][0-9.,]*)\s*(EUR|€)").unwrap(),
        Regex::new(r"[Ss]umme[:\s\w]*?([0-9][0-9.,]*)\s*(EUR|€)").unwrap(),
        Regex::new(r"([0-9][0-9.,]*)\s*(EUR|€)").unwrap(),
    ]
});

#[derive(Debug, Clone)]
pub struct FoundAmount {
    pub value: Decimal,
    pub raw: String,
    pub confidence: ConfidenceBucket,
}

/// Parses a German-or-US-locale monetary amount string, stripping a
/// trailing/leading currency marker first.
pub fn parse_german_amount(raw: &str) -> Result<Decimal, String> {
    let cleaned = CURRENCY_STRIP.replace_all(raw.trim(), "").trim().to_string();
    if cleaned.is_empty() {
        return Err(format!("empty amount after cleaning: {raw}"));
    }

    if GERMAN_FORMAT.is_match(&cleaned) {
        let normalized = cleaned.replace('.', "").replace(',', ".");
        if let Ok(value) = Decimal::from_str(&normalized) {
            return Ok(value);
        }
    }

    if US_FORMAT.is_match(&cleaned) {
        let normalized = cleaned.replace(',', "");
        if let Ok(value) = Decimal::from_str(&normalized) {
            return Ok(value);
        }
    }

    Err(format!("cannot parse amount '{raw}' (cleaned '{cleaned}') as de_DE or en_US"))
}

/// Scans `text` for every keyword-adjacent amount, returning each
/// candidate with HIGH confidence when the raw text used a German comma
/// decimal, else MEDIUM — matches `email_body_extractor.py::_find_amounts`.
pub fn find_amounts(text: &str) -> Vec<FoundAmount> {
    let mut found = Vec::new();
    for pattern in AMOUNT_PATTERNS.iter() {
        for caps in pattern.captures_iter(text) {
            let amount_str = match caps.get(1) {
                Some(m) => m.as_str(),
                None => continue,
            };
            let Ok(value) = parse_german_amount(amount_str) else {
                continue;
            };
            if value <= Decimal::ZERO {
                continue;
            }
            let has_german_decimal = match (amount_str.rfind(','), amount_str.rfind('.')) {
                (Some(c), Some(d)) => c > d,
                (Some(_), None) => true,
                _ => false,
            };
            found.push(FoundAmount {
                value,
                raw: caps.get(0).unwrap().as_str().to_string(),
                confidence: if has_german_decimal {
                    ConfidenceBucket::High
                } else {
                    ConfidenceBucket::Medium
                },
            });
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn parses_german_format() {
        assert_eq!(parse_german_amount("1.234,56 EUR").unwrap(), d("1234.56"));
    }

    #[test]
    fn parses_us_format_fallback() {
        assert_eq!(parse_german_amount("1,234.56 EUR").unwrap(), d("1234.56"));
    }

    #[test]
    fn parses_plain_thousands_as_german() {
        assert_eq!(parse_german_amount("2.500 EUR").unwrap(), d("2500"));
    }

    #[test]
    fn find_amounts_prefers_labelled_keyword_and_flags_german_decimal() {
        let found = find_amounts("Die Gesamtforderung betraegt 1.234,56 EUR zzgl. Mahnkosten.");
        assert!(found.iter().any(|f| f.value == d("1234.56") && f.confidence == ConfidenceBucket::High));
    }
}
