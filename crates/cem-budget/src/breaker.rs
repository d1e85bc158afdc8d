use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex;

/// Storage seam for the daily cost counter. The default is an in-process
/// `Mutex<HashMap>` (single-daemon deployment target, §5); a Redis-backed
/// store could implement this trait without changing call sites.
#[async_trait::async_trait]
pub trait BreakerStore: Send + Sync {
    async fn get(&self, day: NaiveDate) -> f64;
    async fn add(&self, day: NaiveDate, cost: f64) -> f64;
}

/// Key TTL: entries older than this are dropped on the next write, mirroring
/// the Python breaker's 48h Redis key TTL (kept for debugging one day back).
const TTL_DAYS: i64 = 2;

pub struct InMemoryBreakerStore {
    counters: Arc<Mutex<HashMap<NaiveDate, f64>>>,
}

impl InMemoryBreakerStore {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryBreakerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl BreakerStore for InMemoryBreakerStore {
    async fn get(&self, day: NaiveDate) -> f64 {
        let counters = self.counters.lock().await;
        *counters.get(&day).unwrap_or(&0.0)
    }

    async fn add(&self, day: NaiveDate, cost: f64) -> f64 {
        let mut counters = self.counters.lock().await;
        counters.retain(|d, _| (day - *d).num_days() <= TTL_DAYS);
        let entry = counters.entry(day).or_insert(0.0);
        *entry += cost;
        *entry
    }
}

/// Daily cost limit enforcement (§4.3). The circuit is "open" (tripped)
/// once today's recorded spend would exceed `daily_limit_usd`; while open,
/// callers must short-circuit to the consolidator default result instead
/// of invoking the vision capability.
pub struct DailyCostCircuitBreaker<S: BreakerStore = InMemoryBreakerStore> {
    store: S,
    daily_limit_usd: f64,
}

impl<S: BreakerStore> DailyCostCircuitBreaker<S> {
    pub fn new(store: S, daily_limit_usd: f64) -> Self {
        Self { store, daily_limit_usd }
    }

    pub async fn is_open(&self) -> bool {
        self.store.get(today()).await >= self.daily_limit_usd
    }

    /// Atomically records `estimated_cost` against today's counter if doing
    /// so would not exceed the daily cap. Returns `false` (and does not
    /// record) when it would.
    pub async fn check_and_record(&self, estimated_cost: f64) -> bool {
        let day = today();
        let current = self.store.get(day).await;
        if current + estimated_cost > self.daily_limit_usd {
            tracing::warn!(
                estimated_cost,
                current_spend = current,
                daily_limit = self.daily_limit_usd,
                "daily_cost_limit_would_be_exceeded"
            );
            return false;
        }
        self.store.add(day, estimated_cost).await;
        true
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn check_and_record_blocks_once_cap_reached() {
        let breaker = DailyCostCircuitBreaker::new(InMemoryBreakerStore::new(), 10.0);
        assert!(breaker.check_and_record(6.0).await);
        assert!(breaker.check_and_record(3.0).await);
        assert!(!breaker.check_and_record(2.0).await);
        assert!(!breaker.is_open().await);
        assert!(breaker.check_and_record(1.0).await);
        assert!(breaker.is_open().await);
    }

    #[tokio::test]
    async fn is_open_false_when_under_cap() {
        let breaker = DailyCostCircuitBreaker::new(InMemoryBreakerStore::new(), 50.0);
        assert!(!breaker.is_open().await);
        breaker.check_and_record(10.0).await;
        assert!(!breaker.is_open().await);
    }
}
