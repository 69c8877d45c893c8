//! Configuration management for the request admission service.
//! This module handles loading and managing configuration settings
//! from environment variables and configuration files.

mod settings;

pub use settings::{CsrfConfig, RateLimitConfig, RedisConfig, ServerConfig, Settings, TierQuotaConfig};
