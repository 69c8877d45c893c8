use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::core::{FailurePolicy, RateLimitTier, TierQuota};
use crate::utils::{AdmissionError, AdmissionResult};

/// Configuration settings for the request admission service
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    /// Counter store configuration
    pub redis: RedisConfig,
    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
    /// CSRF guard configuration
    pub csrf: CsrfConfig,
    /// Server configuration
    pub server: ServerConfig,
}

/// Redis configuration settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis connection URL; rate limiting runs on the failure policy without it
    pub url: Option<String>,
    /// Access token sent as the connection password
    pub token: Option<String>,
    /// Upper bound for a single store round trip
    pub command_timeout_ms: u64,
}

impl RedisConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            token: env::var("REDIS_TOKEN").ok().filter(|v| !v.is_empty()),
            command_timeout_ms: 500,
        }
    }
}

/// Quota override for one tier; unset fields keep the tier's default
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct TierQuotaConfig {
    /// Maximum number of requests allowed per period
    pub max_requests: Option<u32>,
    /// Time period in seconds for rate limiting
    pub period_seconds: Option<u64>,
}

impl TierQuotaConfig {
    fn resolve(&self, default: TierQuota) -> TierQuota {
        TierQuota::new(
            self.max_requests.unwrap_or(default.limit),
            self.period_seconds
                .map(Duration::from_secs)
                .unwrap_or(default.window),
        )
    }
}

/// Rate limiting configuration settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Behaviour when the counter store is missing or failing
    pub failure_policy: FailurePolicy,
    /// Prefix for every counter key
    pub key_prefix: String,
    /// Read the client IP from `X-Forwarded-For` / `X-Real-IP`. Only enable
    /// behind a proxy that overwrites these headers.
    pub trust_proxy_headers: bool,
    pub strict: TierQuotaConfig,
    pub standard: TierQuotaConfig,
    pub generous: TierQuotaConfig,
}

impl RateLimitConfig {
    pub fn quota(&self, tier: RateLimitTier) -> TierQuota {
        let cfg = match tier {
            RateLimitTier::Strict => self.strict,
            RateLimitTier::Standard => self.standard,
            RateLimitTier::Generous => self.generous,
        };
        cfg.resolve(tier.default_quota())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::FailOpen,
            key_prefix: "ratelimit".to_string(),
            trust_proxy_headers: false,
            strict: TierQuotaConfig::default(),
            standard: TierQuotaConfig::default(),
            generous: TierQuotaConfig::default(),
        }
    }
}

/// CSRF guard configuration settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CsrfConfig {
    pub cookie_name: String,
    pub header_name: String,
    /// Random bytes per token before base64 encoding
    pub token_bytes: usize,
    pub max_age_seconds: u64,
    /// Emit the `Secure` cookie attribute; only disable for plain-HTTP development
    pub secure: bool,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            cookie_name: "csrf-token".to_string(),
            header_name: "x-csrf-token".to_string(),
            token_bytes: 32,
            max_age_seconds: 7 * 24 * 60 * 60,
            secure: true,
        }
    }
}

/// Server configuration settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind the server to
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
        }
    }
}

impl Settings {
    /// Load configuration from an optional config file and `APP_` environment
    /// variables, e.g. `APP_RATE_LIMIT__FAILURE_POLICY=fail_closed`
    pub fn load() -> AdmissionResult<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/admission").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that would make admission meaningless
    pub fn validate(&self) -> AdmissionResult<()> {
        for tier in RateLimitTier::ALL {
            let quota = self.rate_limit.quota(tier);
            if quota.limit == 0 {
                return Err(AdmissionError::InvalidConfig(format!("{tier} tier allows zero requests")));
            }
            if quota.window.is_zero() {
                return Err(AdmissionError::InvalidConfig(format!("{tier} tier has a zero period")));
            }
        }
        if self.csrf.token_bytes < 16 {
            return Err(AdmissionError::InvalidConfig(
                "csrf token_bytes must be at least 16".to_string(),
            ));
        }
        if self.csrf.cookie_name.trim().is_empty() || self.csrf.header_name.trim().is_empty() {
            return Err(AdmissionError::InvalidConfig(
                "csrf cookie and header names must not be empty".to_string(),
            ));
        }
        if axum::http::HeaderName::from_bytes(self.csrf.header_name.as_bytes()).is_err() {
            return Err(AdmissionError::InvalidConfig(format!(
                "'{}' is not a valid header name",
                self.csrf.header_name
            )));
        }
        Ok(())
    }
}
