//! Retry classification (§4.9 "Retry classification"). A pipeline failure
//! is sorted into a coarse cause bucket, which maps to a retry/no-retry
//! decision; the bucket itself is only kept around for logging.

use std::time::Duration;

use cem_capabilities::{LlmError, SecondaryStoreError, StorageError};

/// Coarse cause bucket for a pipeline failure, used only to log *why* a
/// message is being retried or parked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    TransientExternal,
    PrimaryStoreOperational,
    InputInvariant,
    BudgetOrBreaker,
    CapabilityDegraded,
}

impl Failure {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TransientExternal => "transient_external",
            Self::PrimaryStoreOperational => "primary_store_operational",
            Self::InputInvariant => "input_invariant",
            Self::BudgetOrBreaker => "budget_or_breaker",
            Self::CapabilityDegraded => "capability_degraded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Transient,
    Permanent,
}

pub const MAX_RETRIES: i32 = 5;

/// `15s, 30s, 60s, 120s, 300s` — caps at the last value beyond that (§4.9
/// "exponential backoff (15s...5min)").
pub fn backoff_for_attempt(retry_count: i32) -> Duration {
    let secs = 15i64.saturating_mul(1i64 << retry_count.max(0).min(5));
    Duration::from_secs(secs.min(300) as u64)
}

/// Classifies a pipeline error into a [`Failure`] bucket and the retry
/// decision that follows from it (§4.9). Inspects the error chain for the
/// capability error types this crate's collaborators raise; anything
/// unrecognized is treated as transient, per spec ("Unknown -> retry as
/// transient").
pub fn classify_failure(err: &anyhow::Error) -> (Failure, RetryClass) {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<LlmError>() {
            return match e {
                LlmError::RateLimited | LlmError::Timeout => (Failure::TransientExternal, RetryClass::Transient),
                LlmError::ProviderError(_) => (Failure::CapabilityDegraded, RetryClass::Transient),
                LlmError::InvalidArgument(_) => (Failure::InputInvariant, RetryClass::Permanent),
            };
        }
        if let Some(e) = cause.downcast_ref::<SecondaryStoreError>() {
            return match e {
                SecondaryStoreError::Unavailable => (Failure::CapabilityDegraded, RetryClass::Transient),
                SecondaryStoreError::Operational(_) => (Failure::CapabilityDegraded, RetryClass::Transient),
                SecondaryStoreError::NotFound => (Failure::InputInvariant, RetryClass::Permanent),
            };
        }
        if let Some(e) = cause.downcast_ref::<StorageError>() {
            return match e {
                StorageError::Network(_) => (Failure::TransientExternal, RetryClass::Transient),
                StorageError::NotFound | StorageError::TooLarge { .. } => (Failure::InputInvariant, RetryClass::Permanent),
            };
        }
        if cause.downcast_ref::<sqlx::Error>().is_some() {
            return (Failure::PrimaryStoreOperational, RetryClass::Transient);
        }
        if cause.downcast_ref::<serde_json::Error>().is_some() {
            return (Failure::InputInvariant, RetryClass::Permanent);
        }
    }
    (Failure::TransientExternal, RetryClass::Transient)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_is_transient() {
        let err = anyhow::Error::new(LlmError::RateLimited);
        assert_eq!(classify_failure(&err), (Failure::TransientExternal, RetryClass::Transient));
    }

    #[test]
    fn invalid_argument_is_permanent() {
        let err = anyhow::Error::new(LlmError::InvalidArgument("bad prompt".to_string()));
        assert_eq!(classify_failure(&err), (Failure::InputInvariant, RetryClass::Permanent));
    }

    #[test]
    fn storage_not_found_is_permanent() {
        let err = anyhow::Error::new(StorageError::NotFound);
        assert_eq!(classify_failure(&err), (Failure::InputInvariant, RetryClass::Permanent));
    }

    #[test]
    fn unknown_error_defaults_to_transient() {
        let err = anyhow::anyhow!("something unexpected happened");
        assert_eq!(classify_failure(&err), (Failure::TransientExternal, RetryClass::Transient));
    }

    #[test]
    fn backoff_grows_exponentially_and_caps_at_five_minutes() {
        assert_eq!(backoff_for_attempt(0), Duration::from_secs(15));
        assert_eq!(backoff_for_attempt(1), Duration::from_secs(30));
        assert_eq!(backoff_for_attempt(4), Duration::from_secs(240));
        assert_eq!(backoff_for_attempt(5), Duration::from_secs(300));
        assert_eq!(backoff_for_attempt(10), Duration::from_secs(300));
    }
}
