//! Weighted two-window sliding-window arithmetic.
//!
//! Requests are counted in fixed windows aligned to the epoch. The count for
//! the moving interval is the current window's count plus the previous
//! window's count scaled by how much of the previous window still overlaps
//! the interval ending now. The Redis Lua script and the in-memory store both
//! evaluate exactly this arithmetic.

use std::time::Duration;

/// Result of evaluating one request against a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOutcome {
    pub admitted: bool,
    pub remaining: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlidingWindow {
    limit: u32,
    window_ms: u64,
}

impl SlidingWindow {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window_ms: (window.as_millis() as u64).max(1),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn window_index(&self, now_ms: u64) -> u64 {
        now_ms / self.window_ms
    }

    /// Epoch millisecond at which the current fixed window closes.
    pub fn reset_at_ms(&self, now_ms: u64) -> u64 {
        (self.window_index(now_ms) + 1) * self.window_ms
    }

    /// Key of the counter for the window containing `now_ms`.
    pub fn current_key(&self, base: &str, now_ms: u64) -> String {
        format!("{base}:{}", self.window_index(now_ms))
    }

    /// Key of the counter for the window before the one containing `now_ms`.
    pub fn previous_key(&self, base: &str, now_ms: u64) -> String {
        format!("{base}:{}", self.window_index(now_ms).saturating_sub(1))
    }

    /// Counter keys outlive their window so they can serve as the previous window.
    pub fn key_ttl_ms(&self) -> u64 {
        self.window_ms * 2 + 1_000
    }

    /// The previous window's share is rounded up so a partial request still
    /// counts against the quota.
    pub fn weighted_count(&self, previous: u64, current: u64, now_ms: u64) -> u64 {
        let elapsed = now_ms % self.window_ms;
        (previous * (self.window_ms - elapsed)).div_ceil(self.window_ms) + current
    }

    /// Evaluate a request given the raw counters.
    ///
    /// A denied request never increments the counter. When `consume` is set
    /// and the request is admitted the caller must increment the current
    /// window counter by one.
    pub fn evaluate(&self, previous: u64, current: u64, now_ms: u64, consume: bool) -> WindowOutcome {
        let used = self.weighted_count(previous, current, now_ms);
        let limit = u64::from(self.limit);
        if used >= limit {
            return WindowOutcome {
                admitted: false,
                remaining: 0,
            };
        }
        let used = if consume { used + 1 } else { used };
        WindowOutcome {
            admitted: true,
            remaining: (limit - used) as u32,
        }
    }
}
