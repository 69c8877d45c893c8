//! Core functionality for the request admission service.
//! This module contains the sliding-window rate limiter, its counter
//! stores, and the CSRF guard.

mod clock;
mod csrf;
mod identity;
mod rate_limiter;
mod redis_store;
mod sliding_window;
mod store;
mod tier;

pub use clock::{Clock, ManualClock, SystemClock};
pub use csrf::{
    cookie_value, is_mutating, tokens_match, CsrfFailure, CsrfGuard, CsrfToken, CsrfVerdict,
    IssuedCsrfToken,
};
pub use identity::ClientIdentity;
pub use rate_limiter::{DecisionSource, FailurePolicy, RateLimitDecision, RateLimiter};
pub use redis_store::RedisCounterStore;
pub use sliding_window::{SlidingWindow, WindowOutcome};
pub use store::{CounterStore, InMemoryCounterStore};
pub use tier::{RateLimitTier, TierQuota};
