use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::sliding_window::{SlidingWindow, WindowOutcome};
use crate::utils::AdmissionResult;

/// External atomic counter store consulted by the rate limiter.
///
/// Implementations must evaluate and increment as one atomic step so that
/// concurrent requests for the same key cannot both take the last slot.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Evaluate a request and, when admitted, count it.
    async fn hit(&self, key: &str, window: &SlidingWindow, now_ms: u64) -> AdmissionResult<WindowOutcome>;

    /// Evaluate without counting.
    async fn peek(&self, key: &str, window: &SlidingWindow, now_ms: u64) -> AdmissionResult<WindowOutcome>;

    /// Drop the current and previous window counters for a key.
    async fn reset(&self, key: &str, window: &SlidingWindow, now_ms: u64) -> AdmissionResult<()>;

    /// Short backend name used in logs and metric labels.
    fn backend(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u64,
    expires_at_ms: u64,
}

/// Evaluations between sweeps of expired counters.
const PRUNE_INTERVAL: u32 = 256;

#[derive(Debug, Default)]
struct Counters {
    entries: HashMap<String, Counter>,
    since_prune: u32,
}

impl Counters {
    fn prune(&mut self, now_ms: u64) {
        self.entries.retain(|_, c| c.expires_at_ms > now_ms);
        self.since_prune = 0;
    }
}

/// Process-local counter store for development and tests.
///
/// Expired counters are ignored on read and swept every
/// `PRUNE_INTERVAL` evaluations.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    counters: Mutex<Counters>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored window counters, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.counters.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every counter that has expired at `now_ms`.
    pub async fn prune(&self, now_ms: u64) {
        self.counters.lock().await.prune(now_ms);
    }

    fn read(counters: &HashMap<String, Counter>, key: &str, now_ms: u64) -> u64 {
        counters
            .get(key)
            .filter(|c| c.expires_at_ms > now_ms)
            .map(|c| c.count)
            .unwrap_or(0)
    }

    async fn evaluate(
        &self,
        key: &str,
        window: &SlidingWindow,
        now_ms: u64,
        consume: bool,
    ) -> WindowOutcome {
        let current_key = window.current_key(key, now_ms);
        let previous_key = window.previous_key(key, now_ms);

        let mut counters = self.counters.lock().await;
        counters.since_prune += 1;
        if counters.since_prune >= PRUNE_INTERVAL {
            counters.prune(now_ms);
        }

        let current = Self::read(&counters.entries, &current_key, now_ms);
        let previous = Self::read(&counters.entries, &previous_key, now_ms);
        let outcome = window.evaluate(previous, current, now_ms, consume);

        if consume && outcome.admitted {
            let ttl = window.key_ttl_ms();
            let counter = counters.entries.entry(current_key).or_insert(Counter {
                count: 0,
                expires_at_ms: now_ms + ttl,
            });
            counter.count += 1;
        }
        outcome
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn hit(&self, key: &str, window: &SlidingWindow, now_ms: u64) -> AdmissionResult<WindowOutcome> {
        Ok(self.evaluate(key, window, now_ms, true).await)
    }

    async fn peek(&self, key: &str, window: &SlidingWindow, now_ms: u64) -> AdmissionResult<WindowOutcome> {
        Ok(self.evaluate(key, window, now_ms, false).await)
    }

    async fn reset(&self, key: &str, window: &SlidingWindow, now_ms: u64) -> AdmissionResult<()> {
        let mut counters = self.counters.lock().await;
        counters.entries.remove(&window.current_key(key, now_ms));
        counters.entries.remove(&window.previous_key(key, now_ms));
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
