//! Redis-backed counter store.
//!
//! Each evaluation runs one Lua script, so the read of both window counters,
//! the limit comparison, the increment and the expiry are applied atomically
//! by Redis. Instances of the service sharing a Redis therefore share quotas.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, IntoConnectionInfo, Script};

use super::sliding_window::{SlidingWindow, WindowOutcome};
use super::store::CounterStore;
use crate::utils::{AdmissionError, AdmissionResult};

// KEYS[1] current window, KEYS[2] previous window
// ARGV[1] limit, ARGV[2] now ms, ARGV[3] window ms, ARGV[4] consume flag, ARGV[5] ttl ms
const SLIDING_WINDOW_SCRIPT: &str = r#"
local limit = tonumber(ARGV[1])
local now = tonumber(ARGV[2])
local window = tonumber(ARGV[3])
local consume = tonumber(ARGV[4])
local ttl = tonumber(ARGV[5])

local current = tonumber(redis.call("GET", KEYS[1]) or "0")
local previous = tonumber(redis.call("GET", KEYS[2]) or "0")
local elapsed = now % window
local used = math.ceil(previous * (window - elapsed) / window) + current

if used >= limit then
  return {0, 0}
end
if consume == 0 then
  return {1, limit - used}
end

local updated = redis.call("INCR", KEYS[1])
if updated == 1 then
  redis.call("PEXPIRE", KEYS[1], ttl)
end
return {1, limit - (used + 1)}
"#;

/// Counter store talking to Redis through a reconnecting connection manager.
#[derive(Clone)]
pub struct RedisCounterStore {
    connection: ConnectionManager,
    script: Script,
    command_timeout: Duration,
}

impl RedisCounterStore {
    /// Connect to Redis. A non-empty `token` is sent as the connection password.
    pub async fn connect(url: &str, token: Option<&str>, command_timeout: Duration) -> AdmissionResult<Self> {
        let mut info = url.into_connection_info()?;
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            info.redis.password = Some(token.to_string());
        }
        let client = Client::open(info)?;
        let connection = tokio::time::timeout(command_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| AdmissionError::StoreTimeout(command_timeout))??;

        Ok(Self {
            connection,
            script: Script::new(SLIDING_WINDOW_SCRIPT),
            command_timeout,
        })
    }

    async fn evaluate(
        &self,
        key: &str,
        window: &SlidingWindow,
        now_ms: u64,
        consume: bool,
    ) -> AdmissionResult<WindowOutcome> {
        let mut conn = self.connection.clone();
        let mut invocation = self.script.prepare_invoke();
        invocation
            .key(window.current_key(key, now_ms))
            .key(window.previous_key(key, now_ms))
            .arg(window.limit())
            .arg(now_ms)
            .arg(window.window_ms())
            .arg(u8::from(consume))
            .arg(window.key_ttl_ms());

        let (admitted, remaining): (i64, i64) =
            tokio::time::timeout(self.command_timeout, invocation.invoke_async(&mut conn))
                .await
                .map_err(|_| AdmissionError::StoreTimeout(self.command_timeout))??;

        Ok(WindowOutcome {
            admitted: admitted == 1,
            remaining: remaining.clamp(0, i64::from(u32::MAX)) as u32,
        })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn hit(&self, key: &str, window: &SlidingWindow, now_ms: u64) -> AdmissionResult<WindowOutcome> {
        self.evaluate(key, window, now_ms, true).await
    }

    async fn peek(&self, key: &str, window: &SlidingWindow, now_ms: u64) -> AdmissionResult<WindowOutcome> {
        self.evaluate(key, window, now_ms, false).await
    }

    async fn reset(&self, key: &str, window: &SlidingWindow, now_ms: u64) -> AdmissionResult<()> {
        let mut conn = self.connection.clone();
        let keys = vec![window.current_key(key, now_ms), window.previous_key(key, now_ms)];
        tokio::time::timeout(self.command_timeout, conn.del::<_, ()>(keys))
            .await
            .map_err(|_| AdmissionError::StoreTimeout(self.command_timeout))??;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
