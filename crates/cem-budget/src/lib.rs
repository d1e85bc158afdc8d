//! Per-job token budget and process-wide daily cost circuit breaker (§4.3),
//! generalized from `original_source/app/services/cost_control/*`.

pub mod breaker;
pub mod tracker;

pub use breaker::{BreakerStore, DailyCostCircuitBreaker, InMemoryBreakerStore};
pub use tracker::TokenBudgetTracker;
