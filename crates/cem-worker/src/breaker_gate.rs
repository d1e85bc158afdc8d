//! Wires the daily cost circuit breaker (§4.3) into the vision-capable
//! half of the LLM capability: decorates an [`LlmCapability`] so `vision`
//! calls short-circuit once the breaker is open, matching the breaker's
//! own contract ("while open, callers must short-circuit to the
//! consolidator default result instead of invoking the vision
//! capability"). `classify` calls (cheap, text-only) are never gated.

use std::sync::Arc;

use cem_budget::{BreakerStore, DailyCostCircuitBreaker};
use cem_capabilities::{LlmCapability, LlmError, LlmResponse};

pub struct BreakerGuardedLlm<S: BreakerStore> {
    inner: Arc<dyn LlmCapability>,
    breaker: Arc<DailyCostCircuitBreaker<S>>,
    input_cost_per_million: f64,
    output_cost_per_million: f64,
}

impl<S: BreakerStore> BreakerGuardedLlm<S> {
    pub fn new(inner: Arc<dyn LlmCapability>, breaker: Arc<DailyCostCircuitBreaker<S>>, input_cost_per_million: f64, output_cost_per_million: f64) -> Self {
        Self {
            inner,
            breaker,
            input_cost_per_million,
            output_cost_per_million,
        }
    }
}

#[async_trait::async_trait]
impl<S: BreakerStore> LlmCapability for BreakerGuardedLlm<S> {
    async fn classify(&self, prompt: &str, model: &str, max_tokens: u32, temperature: f32) -> Result<LlmResponse, LlmError> {
        self.inner.classify(prompt, model, max_tokens, temperature).await
    }

    async fn vision(&self, bytes: &[u8], media_type: &str, prompt: &str) -> Result<LlmResponse, LlmError> {
        if self.breaker.is_open().await {
            return Err(LlmError::ProviderError("daily_cost_circuit_breaker_open".to_string()));
        }

        let response = self.inner.vision(bytes, media_type, prompt).await?;

        let cost = (response.tokens_in as f64 / 1_000_000.0) * self.input_cost_per_million
            + (response.tokens_out as f64 / 1_000_000.0) * self.output_cost_per_million;
        self.breaker.check_and_record(cost).await;

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cem_budget::InMemoryBreakerStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubLlm {
        vision_calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmCapability for StubLlm {
        async fn classify(&self, _prompt: &str, _model: &str, _max_tokens: u32, _temperature: f32) -> Result<LlmResponse, LlmError> {
            Ok(LlmResponse { text: "{}".to_string(), tokens_in: 1, tokens_out: 1 })
        }

        async fn vision(&self, _bytes: &[u8], _media_type: &str, _prompt: &str) -> Result<LlmResponse, LlmError> {
            self.vision_calls.fetch_add(1, Ordering::SeqCst);
            Ok(LlmResponse { text: "ok".to_string(), tokens_in: 1000, tokens_out: 100 })
        }
    }

    #[tokio::test]
    async fn vision_short_circuits_once_breaker_is_open() {
        let stub = Arc::new(StubLlm { vision_calls: AtomicUsize::new(0) });
        let breaker = Arc::new(DailyCostCircuitBreaker::new(InMemoryBreakerStore::new(), 0.01));
        let guarded = BreakerGuardedLlm::new(stub.clone(), breaker, 3.0, 15.0);

        let first = guarded.vision(b"", "image/png", "p").await;
        assert!(first.is_ok());
        let second = guarded.vision(b"", "image/png", "p").await;
        assert!(matches!(second, Err(LlmError::ProviderError(_))));
        assert_eq!(stub.vision_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn classify_is_never_gated() {
        let stub = Arc::new(StubLlm { vision_calls: AtomicUsize::new(0) });
        let breaker = Arc::new(DailyCostCircuitBreaker::new(InMemoryBreakerStore::new(), 0.0));
        let guarded = BreakerGuardedLlm::new(stub, breaker, 3.0, 15.0);

        assert!(guarded.classify("p", "m", 10, 0.0).await.is_ok());
    }
}
