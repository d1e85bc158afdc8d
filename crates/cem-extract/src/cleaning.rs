//! Body cleaning (§4.9 pipeline step 2), grounded in
//! `original_source/app/services/email_parser.py`: HTML to text, quoted-reply
//! and Zendesk-metadata stripping, disclaimer removal, whitespace
//! normalization. Unlike the original, signatures are deliberately kept —
//! the consolidation agent still needs them to recover a creditor name.

use ammonia::Builder;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static HTML_STRIPPER: LazyLock<Builder<'static>> = LazyLock::new(|| {
    let mut b = Builder::new();
    b.tags(HashSet::new());
    b
});

static ZENDESK_UPDATED_BY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^(Aktualisiert von|Updated by):.*\d{2}:\d{2}.*$").unwrap());
static HORIZONTAL_RULE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^-{20,}$").unwrap());
static QUOTE_HEADER_EN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)On\s+\d{4}-\d{2}-\d{2}.*?wrote:.*").unwrap());
static QUOTE_HEADER_DE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)Am\s+\d{2}\.\d{2}\.\d{4}.*?schrieb.*").unwrap());
static DISCLAIMERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?is)Diese E-Mail.*?vertraulich.*").unwrap(),
        Regex::new(r"(?is)This email.*?confidential.*").unwrap(),
        Regex::new(r"(?is)Disclaimer:.*").unwrap(),
        Regex::new(r"(?is)Hinweis:.*?Nachricht.*").unwrap(),
        Regex::new(r"(?is)HINWEIS:.*?bestimmt.*").unwrap(),
    ]
});
static MULTI_BLANK_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n\s*\n+").unwrap());

pub struct CleanedBody {
    pub cleaned_body: String,
    pub tokens_before: u32,
    pub tokens_after: u32,
}

/// Rough approximation (~4 chars/token), same heuristic the original parser
/// uses to log its reduction ratio.
fn estimate_tokens(text: &str) -> u32 {
    ((text.chars().count() as f64) / 4.0).ceil() as u32
}

fn html_to_text(html: &str) -> String {
    HTML_STRIPPER.clean(html).to_string()
}

fn remove_zendesk_metadata(text: &str) -> String {
    let text = ZENDESK_UPDATED_BY.replace_all(text, "");
    HORIZONTAL_RULE.replace_all(&text, "").into_owned()
}

fn remove_quoted_content(text: &str) -> String {
    let text = QUOTE_HEADER_EN.replace(text, "");
    let text = QUOTE_HEADER_DE.replace(&text, "");
    text.lines().filter(|line| !line.trim_start().starts_with('>')).collect::<Vec<_>>().join("\n")
}

fn remove_disclaimers(text: &str) -> String {
    let mut text = text.to_string();
    for pattern in DISCLAIMERS.iter() {
        text = pattern.replace(&text, "").into_owned();
    }
    text
}

fn clean_whitespace(text: &str) -> String {
    let collapsed = MULTI_BLANK_LINE.replace_all(text, "\n\n");
    collapsed.lines().map(str::trim).collect::<Vec<_>>().join("\n").trim().to_string()
}

/// Prefers the HTML body (richer signal) and falls back to the plain-text
/// body when no HTML part was sent.
pub fn clean_body(html_body: Option<&str>, text_body: Option<&str>) -> CleanedBody {
    let raw = match html_body {
        Some(html) => html_to_text(html),
        None => text_body.unwrap_or_default().to_string(),
    };
    let tokens_before = estimate_tokens(&raw);

    let stage = remove_zendesk_metadata(&raw);
    let stage = remove_quoted_content(&stage);
    let stage = remove_disclaimers(&stage);
    let cleaned_body = clean_whitespace(&stage);
    let tokens_after = estimate_tokens(&cleaned_body);

    CleanedBody { cleaned_body, tokens_before, tokens_after }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_html_tags_to_plain_text() {
        let result = clean_body(Some("<p>Hallo <b>Welt</b></p>"), None);
        assert!(result.cleaned_body.contains("Hallo"));
        assert!(!result.cleaned_body.contains("<p>"));
    }

    #[test]
    fn falls_back_to_text_body_without_html() {
        let result = clean_body(None, Some("Plain text only"));
        assert_eq!(result.cleaned_body, "Plain text only");
    }

    #[test]
    fn drops_german_quote_header_and_everything_after() {
        let result = clean_body(None, Some("Bitte um Klarstellung.\n\nAm 01.02.2024 schrieb Inkasso GmbH:\n> alte Nachricht"));
        assert!(result.cleaned_body.contains("Bitte um Klarstellung"));
        assert!(!result.cleaned_body.contains("alte Nachricht"));
    }

    #[test]
    fn drops_lines_starting_with_quote_marker() {
        let result = clean_body(None, Some("Antwort hier.\n> zitierter Text\nNoch mehr Antwort."));
        assert!(!result.cleaned_body.contains("zitierter Text"));
        assert!(result.cleaned_body.contains("Noch mehr Antwort"));
    }

    #[test]
    fn removes_german_confidentiality_disclaimer() {
        let result = clean_body(None, Some("Zahlung erfolgt.\n\nHinweis: Diese Nachricht ist vertraulich und nur für den Empfänger bestimmt."));
        assert!(result.cleaned_body.contains("Zahlung erfolgt"));
        assert!(!result.cleaned_body.to_lowercase().contains("vertraulich und nur"));
    }

    #[test]
    fn collapses_repeated_blank_lines() {
        let result = clean_body(None, Some("eins\n\n\n\nzwei"));
        assert_eq!(result.cleaned_body, "eins\n\nzwei");
    }

    #[test]
    fn token_estimate_uses_four_chars_per_token() {
        let result = clean_body(None, Some("12345678"));
        assert_eq!(result.tokens_after, 2);
    }
}
