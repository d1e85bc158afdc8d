//! Concrete bindings for the four capability traits in `cem-capabilities`
//! (§6). Every other crate depends only on the traits; this module is the
//! one place that knows about HTTP, SMTP, and the Anthropic wire format.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use async_trait::async_trait;
use cem_capabilities::{
    AttachmentStorage, ClientSelector, CreditorSelector, DebtUpdate, DebtUpdateNotice, LlmCapability,
    LlmError, LlmResponse, NotificationSink, ScopedFile, SecondaryClient, SecondaryStoreAdapter,
    SecondaryStoreError, StorageError,
};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// AttachmentStorage
// ---------------------------------------------------------------------------

/// Downloads attachments over plain HTTP(S) (§6). The webhook providers
/// hand back pre-signed URLs, so no auth header is needed here.
pub struct HttpAttachmentStorage {
    client: reqwest::Client,
}

impl HttpAttachmentStorage {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client build"),
        }
    }
}

impl Default for HttpAttachmentStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AttachmentStorage for HttpAttachmentStorage {
    async fn size(&self, url: &str) -> Result<u64, StorageError> {
        let resp = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| StorageError::Network(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound);
        }
        resp.content_length().ok_or_else(|| StorageError::Network("missing content-length".to_string()))
    }

    async fn download(&self, url: &str, max_bytes: u64) -> Result<ScopedFile, StorageError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| StorageError::Network(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound);
        }
        if let Some(len) = resp.content_length() {
            if len > max_bytes {
                return Err(StorageError::TooLarge { limit_bytes: max_bytes });
            }
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let bytes = resp.bytes().await.map_err(|e| StorageError::Network(e.to_string()))?;
        if bytes.len() as u64 > max_bytes {
            return Err(StorageError::TooLarge { limit_bytes: max_bytes });
        }

        let mut file = tempfile::NamedTempFile::new().map_err(|e| StorageError::Network(e.to_string()))?;
        file.write_all(&bytes).map_err(|e| StorageError::Network(e.to_string()))?;

        Ok(ScopedFile::new(file, bytes.len() as u64, content_type))
    }
}

// ---------------------------------------------------------------------------
// LlmCapability
// ---------------------------------------------------------------------------

/// Anthropic Messages API binding. `classify` sends a single user turn;
/// `vision` attaches the bytes as a base64 image block alongside the text
/// prompt.
pub struct AnthropicLlm {
    client: reqwest::Client,
    api_key: String,
}

impl AnthropicLlm {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("reqwest client build"),
            api_key,
        }
    }

    async fn send(&self, body: serde_json::Value) -> Result<LlmResponse, LlmError> {
        let resp = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::ProviderError(e.to_string())
                }
            })?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(LlmError::ProviderError(format!("{status}: {text}")));
        }

        let parsed: AnthropicMessage = resp.json().await.map_err(|e| LlmError::ProviderError(e.to_string()))?;
        let text = parsed
            .content
            .into_iter()
            .filter_map(|b| b.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(LlmResponse {
            text,
            tokens_in: parsed.usage.input_tokens,
            tokens_out: parsed.usage.output_tokens,
        })
    }
}

#[derive(serde::Deserialize)]
struct AnthropicMessage {
    content: Vec<AnthropicBlock>,
    usage: AnthropicUsage,
}

#[derive(serde::Deserialize)]
struct AnthropicBlock {
    text: Option<String>,
}

#[derive(serde::Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[async_trait]
impl LlmCapability for AnthropicLlm {
    async fn classify(&self, prompt: &str, model: &str, max_tokens: u32, temperature: f32) -> Result<LlmResponse, LlmError> {
        if prompt.is_empty() {
            return Err(LlmError::InvalidArgument("empty prompt".to_string()));
        }
        self.send(json!({
            "model": model,
            "max_tokens": max_tokens,
            "temperature": temperature,
            "messages": [{"role": "user", "content": prompt}],
        }))
        .await
    }

    async fn vision(&self, bytes: &[u8], media_type: &str, prompt: &str) -> Result<LlmResponse, LlmError> {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        self.send(json!({
            "model": "claude-sonnet-4-5",
            "max_tokens": 4096,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "image", "source": {"type": "base64", "media_type": media_type, "data": encoded}},
                    {"type": "text", "text": prompt},
                ],
            }],
        }))
        .await
    }
}

// ---------------------------------------------------------------------------
// SecondaryStoreAdapter
// ---------------------------------------------------------------------------

/// Talks to the secondary (creditor-data) store through a small JSON REST
/// facade rather than a MongoDB driver (no driver is vendored, §1).
pub struct HttpSecondaryStoreAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSecondaryStoreAdapter {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("reqwest client build"),
            base_url,
        }
    }

    fn map_err(err: reqwest::Error) -> SecondaryStoreError {
        if err.is_timeout() || err.is_connect() {
            SecondaryStoreError::Unavailable
        } else {
            SecondaryStoreError::Operational(err.to_string())
        }
    }
}

#[async_trait]
impl SecondaryStoreAdapter for HttpSecondaryStoreAdapter {
    async fn get_client_by_ticket(&self, ticket_id: &str) -> Result<Option<SecondaryClient>, SecondaryStoreError> {
        let url = format!("{}/clients/by-ticket/{ticket_id}", self.base_url);
        fetch_client(&self.client, &url).await
    }

    async fn get_client_by_name(&self, first: &str, last: &str) -> Result<Option<SecondaryClient>, SecondaryStoreError> {
        let url = format!("{}/clients/by-name?first={first}&last={last}", self.base_url);
        fetch_client(&self.client, &url).await
    }

    async fn get_client_by_case_number(&self, az: &str) -> Result<Option<SecondaryClient>, SecondaryStoreError> {
        let url = format!("{}/clients/by-case-number/{az}", self.base_url);
        fetch_client(&self.client, &url).await
    }

    async fn update_creditor_debt(
        &self,
        selector: ClientSelector,
        creditor: CreditorSelector,
        update: DebtUpdate,
    ) -> Result<bool, SecondaryStoreError> {
        let url = format!("{}/clients/creditor-debt", self.base_url);
        let body = json!({
            "selector": selector_json(&selector),
            "creditor_name": creditor.creditor_name,
            "creditor_email": creditor.creditor_email,
            "amount": update.amount.to_string(),
            "source": update.source,
            "response_timestamp": update.response_timestamp,
            "response_text": update.response_text,
            "reference_numbers": update.reference_numbers,
            "extraction_confidence": update.extraction_confidence,
        });

        let resp = self.client.post(&url).json(&body).send().await.map_err(Self::map_err)?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SecondaryStoreError::NotFound);
        }
        if !resp.status().is_success() {
            return Err(SecondaryStoreError::Operational(format!("status {}", resp.status())));
        }

        #[derive(serde::Deserialize)]
        struct Applied {
            applied: bool,
        }
        let applied: Applied = resp.json().await.map_err(|e| SecondaryStoreError::Operational(e.to_string()))?;
        Ok(applied.applied)
    }
}

fn selector_json(selector: &ClientSelector) -> serde_json::Value {
    match selector {
        ClientSelector::Ticket(t) => json!({"kind": "ticket", "value": t}),
        ClientSelector::Name { first, last } => json!({"kind": "name", "first": first, "last": last}),
        ClientSelector::CaseNumber(az) => json!({"kind": "case_number", "value": az}),
    }
}

async fn fetch_client(client: &reqwest::Client, url: &str) -> Result<Option<SecondaryClient>, SecondaryStoreError> {
    let resp = client.get(url).send().await.map_err(HttpSecondaryStoreAdapter::map_err)?;
    if resp.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !resp.status().is_success() {
        return Err(SecondaryStoreError::Operational(format!("status {}", resp.status())));
    }

    #[derive(serde::Deserialize)]
    struct WireCreditor {
        sender_name: String,
        sender_email: String,
        claim_amount: Option<rust_decimal::Decimal>,
    }
    #[derive(serde::Deserialize)]
    struct WireClient {
        id: String,
        first_name: String,
        last_name: String,
        case_number: Option<String>,
        #[serde(default)]
        creditors: Vec<WireCreditor>,
    }

    let wire: WireClient = resp.json().await.map_err(|e| SecondaryStoreError::Operational(e.to_string()))?;
    Ok(Some(SecondaryClient {
        id: wire.id,
        first_name: wire.first_name,
        last_name: wire.last_name,
        case_number: wire.case_number,
        creditors: wire
            .creditors
            .into_iter()
            .map(|c| cem_capabilities::SecondaryCreditorRecord {
                sender_name: c.sender_name,
                sender_email: c.sender_email,
                claim_amount: c.claim_amount,
            })
            .collect(),
    }))
}

// ---------------------------------------------------------------------------
// NotificationSink
// ---------------------------------------------------------------------------

/// Fire-and-forget notifications: permanent failures go out over SMTP to
/// `admin_email` (grounded in `FailureNotifier`,
/// `original_source/app/services/failure_notifier.py`); debt updates go
/// out as an HMAC-signed portal webhook (grounded in `notify_creditor_response`,
/// `original_source/app/services/portal_notifier.py`). Both degrade to a
/// logged warning when unconfigured instead of failing the caller.
pub struct DaemonNotifier {
    admin_email: Option<String>,
    smtp_host: Option<String>,
    smtp_port: u16,
    portal_webhook_url: Option<String>,
    portal_webhook_secret: Option<String>,
    http: reqwest::blocking::Client,
}

impl DaemonNotifier {
    pub fn new(
        admin_email: Option<String>,
        smtp_host: Option<String>,
        smtp_port: Option<u16>,
        portal_webhook_url: Option<String>,
        portal_webhook_secret: Option<String>,
    ) -> Self {
        Self {
            admin_email,
            smtp_host,
            smtp_port: smtp_port.unwrap_or(25),
            portal_webhook_url,
            portal_webhook_secret,
            http: reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest blocking client build"),
        }
    }

    fn send_failure_email(&self, message_id: Uuid) {
        let (Some(host), Some(to)) = (self.smtp_host.clone(), self.admin_email.clone()) else {
            warn!(%message_id, "smtp_not_configured, skipping failure notification");
            return;
        };
        let port = self.smtp_port;

        std::thread::spawn(move || {
            if let Err(err) = deliver_failure_email(&host, port, &to, message_id) {
                error!(%message_id, error = %err, "failure_notification_send_failed");
            } else {
                info!(%message_id, "failure_notification_sent");
            }
        });
    }

    fn send_portal_webhook(&self, update: &DebtUpdateNotice) {
        let Some(url) = self.portal_webhook_url.clone() else {
            warn!(message_id = %update.message_id, "portal_webhook_url not configured, skipping notification");
            return;
        };
        let secret = self.portal_webhook_secret.clone();
        let payload = json!({
            "message_id": update.message_id,
            "client_name": update.client_name,
            "creditor_name": update.creditor_name,
            "new_amount": update.new_amount.to_string(),
        });
        let http = self.http.clone();

        std::thread::spawn(move || {
            let body = serde_json::to_vec(&payload).unwrap_or_default();
            let mut req = http.post(&url).header(reqwest::header::CONTENT_TYPE, "application/json").body(body.clone());
            if let Some(secret) = secret {
                let sig = sign_payload(&body, &secret);
                req = req.header("x-cem-signature", sig);
            }
            match req.send() {
                Ok(resp) if resp.status().is_success() => {}
                Ok(resp) => warn!(status = %resp.status(), "portal_webhook_non_2xx"),
                Err(err) => error!(error = %err, "portal_webhook_send_failed"),
            }
        });
    }
}

fn sign_payload(payload: &[u8], secret: &str) -> String {
    use hmac::{Hmac, Mac};
    let mut mac = Hmac::<sha2::Sha256>::new_from_slice(secret.as_bytes()).expect("hmac key of any length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

impl NotificationSink for DaemonNotifier {
    fn notify_permanent_failure(&self, message_id: Uuid) {
        self.send_failure_email(message_id);
    }

    fn notify_debt_update(&self, update: &DebtUpdateNotice) {
        self.send_portal_webhook(update);
    }
}

/// Minimal synchronous SMTP dialogue (EHLO/MAIL FROM/RCPT TO/DATA/QUIT),
/// translated from the original's `smtplib` usage. No TLS/auth: intended
/// for a local relay (e.g. an internal Postfix/sendmail smarthost).
fn deliver_failure_email(host: &str, port: u16, to: &str, message_id: Uuid) -> std::io::Result<()> {
    let mut stream = TcpStream::connect((host, port))?;
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;

    read_reply(&mut stream)?;
    write_line(&mut stream, "EHLO cem-daemon")?;
    read_reply(&mut stream)?;
    write_line(&mut stream, "MAIL FROM:<cem-daemon@localhost>")?;
    read_reply(&mut stream)?;
    write_line(&mut stream, &format!("RCPT TO:<{to}>"))?;
    read_reply(&mut stream)?;
    write_line(&mut stream, "DATA")?;
    read_reply(&mut stream)?;

    let body = format!(
        "Subject: Permanent job failure {message_id}\r\n\r\nMessage {message_id} failed permanently after exhausting all retries.\r\n.\r\n"
    );
    stream.write_all(body.as_bytes())?;
    read_reply(&mut stream)?;
    write_line(&mut stream, "QUIT")?;
    read_reply(&mut stream)?;
    Ok(())
}

fn write_line(stream: &mut TcpStream, line: &str) -> std::io::Result<()> {
    stream.write_all(format!("{line}\r\n").as_bytes())
}

fn read_reply(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut buf = [0u8; 512];
    let n = stream.read(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf[..n]).to_string())
}
