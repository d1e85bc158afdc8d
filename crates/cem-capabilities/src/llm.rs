//! LLM provider seam (§6). `cem-agents`/`cem-extract` call through this
//! trait only; no provider SDK is named outside a concrete binding in
//! `cem-daemon`.

/// Classification/extraction/vision response, already decoded from the
/// provider's wire format by the concrete implementation.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    RateLimited,
    Timeout,
    InvalidArgument(String),
    ProviderError(String),
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited => write!(f, "llm provider rate limited the request"),
            Self::Timeout => write!(f, "llm provider call timed out"),
            Self::InvalidArgument(msg) => write!(f, "llm invalid argument: {msg}"),
            Self::ProviderError(msg) => write!(f, "llm provider error: {msg}"),
        }
    }
}

impl std::error::Error for LlmError {}

#[async_trait::async_trait]
pub trait LlmCapability: Send + Sync {
    /// Single-turn text classification/extraction call.
    async fn classify(
        &self,
        prompt: &str,
        model: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<LlmResponse, LlmError>;

    /// Single-turn vision call over raw bytes (scanned PDF page image or
    /// photo attachment), with a caller-supplied media type such as
    /// `image/png`.
    async fn vision(&self, bytes: &[u8], media_type: &str, prompt: &str) -> Result<LlmResponse, LlmError>;
}
