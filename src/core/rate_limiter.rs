use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::clock::{Clock, SystemClock};
use super::identity::ClientIdentity;
use super::sliding_window::{SlidingWindow, WindowOutcome};
use super::store::CounterStore;
use super::tier::{RateLimitTier, TierQuota};
use crate::config::RateLimitConfig;
use crate::utils::{
    log_rate_limit, log_store_failure, record_rate_limit_decision, record_store_failure,
    AdmissionError, AdmissionResult,
};

/// What to do when the counter store is unconfigured or unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Admit every request
    #[default]
    FailOpen,
    /// Reject every request
    FailClosed,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailOpen => f.write_str("fail_open"),
            Self::FailClosed => f.write_str("fail_closed"),
        }
    }
}

/// Where a decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// Evaluated against the counter store
    Store,
    /// Store unavailable, admitted by policy
    FailOpen,
    /// Store unavailable, rejected by policy
    FailClosed,
}

/// Outcome of one rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at_epoch_ms: u64,
    #[serde(skip)]
    pub source: DecisionSource,
}

impl RateLimitDecision {
    /// Whole seconds until the window resets, never less than one.
    pub fn retry_after_secs(&self, now_ms: u64) -> u64 {
        let wait_ms = self.reset_at_epoch_ms.saturating_sub(now_ms);
        wait_ms.div_ceil(1_000).max(1)
    }

    /// True when the decision was made without consulting the store.
    pub fn is_degraded(&self) -> bool {
        self.source != DecisionSource::Store
    }
}

/// Sliding-window rate limiter evaluated against an external counter store.
///
/// Constructed once at startup and shared with request handlers; there is no
/// process-wide limiter state.
pub struct RateLimiter {
    /// Counter store, `None` when no store is configured
    store: Option<Arc<dyn CounterStore>>,
    /// Quota for each tier
    quotas: HashMap<RateLimitTier, TierQuota>,
    failure_policy: FailurePolicy,
    key_prefix: String,
    trust_proxy_headers: bool,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a new rate limiter instance
    pub fn new(store: Option<Arc<dyn CounterStore>>, config: &RateLimitConfig) -> Self {
        let quotas = RateLimitTier::ALL
            .into_iter()
            .map(|tier| (tier, config.quota(tier)))
            .collect();

        Self {
            store,
            quotas,
            failure_policy: config.failure_policy,
            key_prefix: config.key_prefix.clone(),
            trust_proxy_headers: config.trust_proxy_headers,
            clock: Arc::new(SystemClock::new()),
        }
    }

    /// Replace the wall clock, mainly for tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Whether client identity may come from proxy headers.
    pub fn trust_proxy_headers(&self) -> bool {
        self.trust_proxy_headers
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn quota(&self, tier: RateLimitTier) -> TierQuota {
        self.quotas
            .get(&tier)
            .copied()
            .unwrap_or_else(|| tier.default_quota())
    }

    fn key(&self, identity: &ClientIdentity, tier: RateLimitTier) -> String {
        format!("{}:{}:{}", self.key_prefix, tier, identity.store_key())
    }

    fn window(&self, tier: RateLimitTier) -> SlidingWindow {
        let quota = self.quota(tier);
        SlidingWindow::new(quota.limit, quota.window)
    }

    /// Check and count one request from `identity` under `tier`.
    ///
    /// Never fails: store problems are resolved by the failure policy.
    pub async fn check_rate_limit(&self, identity: &ClientIdentity, tier: RateLimitTier) -> RateLimitDecision {
        let decision = self.evaluate(identity, tier, true).await;
        log_rate_limit(&identity.store_key(), tier, &decision);
        record_rate_limit_decision(tier, &decision);
        decision
    }

    /// Current quota for `identity` without counting a request.
    pub async fn get_rate_limit_status(&self, identity: &ClientIdentity, tier: RateLimitTier) -> RateLimitDecision {
        self.evaluate(identity, tier, false).await
    }

    /// Reset rate limit for an identity (useful for testing or manual intervention)
    pub async fn reset_rate_limit(&self, identity: &ClientIdentity, tier: RateLimitTier) -> AdmissionResult<()> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| AdmissionError::StoreUnavailable("no counter store configured".to_string()))?;
        let now_ms = self.clock.now_ms();
        store.reset(&self.key(identity, tier), &self.window(tier), now_ms).await
    }

    async fn evaluate(&self, identity: &ClientIdentity, tier: RateLimitTier, consume: bool) -> RateLimitDecision {
        let window = self.window(tier);
        let now_ms = self.clock.now_ms();

        let Some(store) = &self.store else {
            log_store_failure("none", tier, self.failure_policy, "no counter store configured");
            return self.policy_decision(&window, now_ms);
        };

        let key = self.key(identity, tier);
        let result = if consume {
            store.hit(&key, &window, now_ms).await
        } else {
            store.peek(&key, &window, now_ms).await
        };

        match result {
            Ok(WindowOutcome { admitted, remaining }) => RateLimitDecision {
                allowed: admitted,
                limit: window.limit(),
                remaining,
                reset_at_epoch_ms: window.reset_at_ms(now_ms),
                source: DecisionSource::Store,
            },
            Err(e) => {
                log_store_failure(store.backend(), tier, self.failure_policy, &e.to_string());
                record_store_failure(store.backend());
                self.policy_decision(&window, now_ms)
            }
        }
    }

    fn policy_decision(&self, window: &SlidingWindow, now_ms: u64) -> RateLimitDecision {
        let reset_at_epoch_ms = now_ms + window.window_ms();
        match self.failure_policy {
            FailurePolicy::FailOpen => RateLimitDecision {
                allowed: true,
                limit: window.limit(),
                remaining: window.limit(),
                reset_at_epoch_ms,
                source: DecisionSource::FailOpen,
            },
            FailurePolicy::FailClosed => RateLimitDecision {
                allowed: false,
                limit: window.limit(),
                remaining: 0,
                reset_at_epoch_ms,
                source: DecisionSource::FailClosed,
            },
        }
    }
}
