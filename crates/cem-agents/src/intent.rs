//! Agent 1 — intent classification (§4.6), grounded in `original_source/
//! app/services/intent_classifier.py`. Cheap rule-based checks run first
//! (auto-reply/auto-response headers, German/English out-of-office subject
//! patterns, `noreply@` addresses); only an ambiguous result falls through
//! to a single [`LlmCapability::classify`] call.

use sqlx::PgPool;
use uuid::Uuid;

use cem_capabilities::LlmCapability;
use cem_schemas::checkpoint::{stage, Checkpoint, ValidationStatus};
use serde::{Deserialize, Serialize};

/// Confidence below this routes the message for review without blocking
/// extraction, unless the intent itself is `auto_reply`/`spam` (§4.6).
pub const INTENT_CONFIDENCE_THRESHOLD: f64 = 0.70;

const LLM_MODEL: &str = "claude-3-5-haiku-20241022";
const LLM_MAX_TOKENS: u32 = 100;
const LLM_TEMPERATURE: f32 = 0.0;
const BODY_TRUNCATE_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailIntent {
    DebtStatement,
    PaymentPlan,
    Rejection,
    Inquiry,
    AutoReply,
    Spam,
}

impl EmailIntent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DebtStatement => "debt_statement",
            Self::PaymentPlan => "payment_plan",
            Self::Rejection => "rejection",
            Self::Inquiry => "inquiry",
            Self::AutoReply => "auto_reply",
            Self::Spam => "spam",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "debt_statement" => Self::DebtStatement,
            "payment_plan" => Self::PaymentPlan,
            "rejection" => Self::Rejection,
            "inquiry" => Self::Inquiry,
            "auto_reply" => Self::AutoReply,
            "spam" => Self::Spam,
            _ => return None,
        })
    }

    fn skips_extraction(self) -> bool {
        matches!(self, Self::AutoReply | Self::Spam)
    }
}

/// Header values consulted by the cheap path. Keys are matched
/// case-insensitively by the caller before construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageHeaders<'a> {
    pub auto_submitted: Option<&'a str>,
    pub x_auto_response_suppress: Option<&'a str>,
    pub from: &'a str,
    pub reply_to: Option<&'a str>,
    pub sender: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: EmailIntent,
    pub confidence: f64,
    pub method: String,
    pub skip_extraction: bool,
    pub needs_review: bool,
}

fn ooo_patterns() -> &'static [regex::Regex] {
    use std::sync::OnceLock;
    static CELL: OnceLock<Vec<regex::Regex>> = OnceLock::new();
    CELL.get_or_init(|| {
        [
            r"(?i)abwesenheitsnotiz",
            r"(?i)automatische\s+antwort",
            r"(?i)nicht\s+im\s+büro",
            r"(?i)out\s+of\s+office",
            r"(?i)automatic\s+reply",
            r"(?i)auto-reply",
            r"(?i)ooo:",
        ]
        .iter()
        .map(|p| regex::Regex::new(p).unwrap())
        .collect()
    })
}

fn classify_cheap(headers: &MessageHeaders<'_>, subject: &str) -> Option<IntentResult> {
    if headers.auto_submitted.map(|v| v.to_lowercase().contains("auto-replied")).unwrap_or(false) {
        return Some(IntentResult {
            intent: EmailIntent::AutoReply,
            confidence: 1.0,
            method: "header_auto_submitted".to_string(),
            skip_extraction: true,
            needs_review: false,
        });
    }

    if headers.x_auto_response_suppress.map(|v| !v.is_empty()).unwrap_or(false) {
        return Some(IntentResult {
            intent: EmailIntent::AutoReply,
            confidence: 1.0,
            method: "header_x_auto_response".to_string(),
            skip_extraction: true,
            needs_review: false,
        });
    }

    if ooo_patterns().iter().any(|p| p.is_match(subject)) {
        return Some(IntentResult {
            intent: EmailIntent::AutoReply,
            confidence: 0.95,
            method: "subject_ooo_pattern".to_string(),
            skip_extraction: true,
            needs_review: false,
        });
    }

    let all_addresses = format!(
        "{} {} {}",
        headers.from,
        headers.reply_to.unwrap_or(""),
        headers.sender.unwrap_or("")
    )
    .to_lowercase();
    if all_addresses.contains("noreply@") || all_addresses.contains("no-reply@") {
        return Some(IntentResult {
            intent: EmailIntent::Spam,
            confidence: 0.9,
            method: "noreply_address".to_string(),
            skip_extraction: true,
            needs_review: false,
        });
    }

    None
}

fn fallback_prompt(subject: &str, truncated_body: &str) -> String {
    format!(
        "Klassifiziere die E-Mail-Intent in eine der folgenden Kategorien:\n\n\
         1. debt_statement - Glaeubigerantwort mit Forderungsbetrag oder Schuldenstatus\n\
         2. payment_plan - Zahlungsplan-Vorschlag oder Bestaetigung\n\
         3. rejection - Ablehnung oder Widerspruch der Forderung\n\
         4. inquiry - Frage die manuelle Antwort erfordert\n\
         5. auto_reply - Abwesenheitsnotiz oder automatische Antwort\n\
         6. spam - Marketing, unrelated content\n\n\
         E-Mail:\nBetreff: {subject}\nText: {truncated_body}\n\n\
         Antworte nur mit JSON:\n\
         {{\"intent\": \"debt_statement|payment_plan|rejection|inquiry|auto_reply|spam\", \"confidence\": 0.0-1.0}}"
    )
}

async fn classify_llm(pool: &PgPool, llm: &dyn LlmCapability, subject: &str, body: &str) -> IntentResult {
    let truncated_body: String = body.chars().take(BODY_TRUNCATE_CHARS).collect();

    let prompt = match cem_db::prompts::get_active(pool, "classification", "email_intent").await {
        Ok(Some(template)) => template
            .template_text
            .replace("{{subject}}", subject)
            .replace("{{truncated_body}}", &truncated_body),
        _ => fallback_prompt(subject, &truncated_body),
    };

    let response = match llm.classify(&prompt, LLM_MODEL, LLM_MAX_TOKENS, LLM_TEMPERATURE).await {
        Ok(r) => r,
        Err(err) => {
            tracing::warn!(error = %err, "intent_llm_call_failed");
            return IntentResult {
                intent: EmailIntent::DebtStatement,
                confidence: 0.6,
                method: "claude_haiku_error_fallback".to_string(),
                skip_extraction: false,
                needs_review: true,
            };
        }
    };

    let parsed: serde_json::Value = serde_json::from_str(response.text.trim()).unwrap_or(serde_json::Value::Null);
    let intent = parsed
        .get("intent")
        .and_then(|v| v.as_str())
        .and_then(EmailIntent::from_str)
        .unwrap_or(EmailIntent::DebtStatement);
    let confidence = parsed.get("confidence").and_then(|v| v.as_f64()).unwrap_or(0.7);

    IntentResult {
        intent,
        confidence,
        method: "claude_haiku".to_string(),
        skip_extraction: intent.skips_extraction(),
        needs_review: confidence < INTENT_CONFIDENCE_THRESHOLD,
    }
}

/// Idempotent entry point: returns the cached checkpoint result on replay,
/// otherwise classifies and persists a fresh checkpoint.
pub async fn run(
    pool: &PgPool,
    llm: &dyn LlmCapability,
    message_id: Uuid,
    headers: &MessageHeaders<'_>,
    subject: &str,
    body: &str,
) -> anyhow::Result<IntentResult> {
    if let Some(checkpoint) = cem_db::checkpoints::get(pool, message_id, stage::AGENT_1_INTENT).await? {
        if checkpoint.is_replay_skippable() {
            return Ok(serde_json::from_value(checkpoint.payload)?);
        }
    }

    let mut result = classify_cheap(headers, subject);
    if result.is_none() {
        result = Some(classify_llm(pool, llm, subject, body).await);
    }
    let result = result.expect("cheap or llm path always yields a result");

    let validation_status = if result.needs_review { ValidationStatus::NeedsReview } else { ValidationStatus::Passed };
    let checkpoint = Checkpoint::new(serde_json::to_value(&result)?, validation_status);
    cem_db::checkpoints::save(pool, message_id, stage::AGENT_1_INTENT, &checkpoint).await?;

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_submitted_header_short_circuits_to_auto_reply() {
        let headers = MessageHeaders { auto_submitted: Some("auto-replied"), from: "a@b.de", ..Default::default() };
        let result = classify_cheap(&headers, "Re: Forderung").unwrap();
        assert_eq!(result.intent, EmailIntent::AutoReply);
        assert!(result.skip_extraction);
    }

    #[test]
    fn german_ooo_subject_detected() {
        let headers = MessageHeaders { from: "a@b.de", ..Default::default() };
        let result = classify_cheap(&headers, "Abwesenheitsnotiz: bin bis Montag weg").unwrap();
        assert_eq!(result.intent, EmailIntent::AutoReply);
    }

    #[test]
    fn noreply_address_detected_as_spam() {
        let headers = MessageHeaders { from: "noreply@creditor.de", ..Default::default() };
        let result = classify_cheap(&headers, "Newsletter").unwrap();
        assert_eq!(result.intent, EmailIntent::Spam);
    }

    #[test]
    fn ambiguous_message_falls_through_to_none() {
        let headers = MessageHeaders { from: "glaeubiger@inkasso.de", ..Default::default() };
        assert!(classify_cheap(&headers, "Ihre Forderung Nr. 12345").is_none());
    }
}
