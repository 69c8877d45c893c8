use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::utils::AdmissionError;

/// Named quota applied to a group of routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitTier {
    /// 10 requests per 10 seconds by default
    Strict,
    /// 100 requests per minute by default
    Standard,
    /// 1000 requests per hour by default
    Generous,
}

impl RateLimitTier {
    pub const ALL: [RateLimitTier; 3] = [Self::Strict, Self::Standard, Self::Generous];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Standard => "standard",
            Self::Generous => "generous",
        }
    }

    pub fn default_quota(&self) -> TierQuota {
        match self {
            Self::Strict => TierQuota::new(10, Duration::from_secs(10)),
            Self::Standard => TierQuota::new(100, Duration::from_secs(60)),
            Self::Generous => TierQuota::new(1000, Duration::from_secs(3600)),
        }
    }
}

impl fmt::Display for RateLimitTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RateLimitTier {
    type Err = AdmissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "standard" => Ok(Self::Standard),
            "generous" => Ok(Self::Generous),
            other => Err(AdmissionError::InvalidConfig(format!("unknown rate limit tier '{other}'"))),
        }
    }
}

/// Allowed request count per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierQuota {
    pub limit: u32,
    pub window: Duration,
}

impl TierQuota {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }
}
