use std::env;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

use crate::core::{CsrfFailure, FailurePolicy, RateLimitDecision, RateLimitTier};

/// Initialize the logging system with the level taken from `RUST_LOG`.
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_logging() {
    // Get the log level from environment variable or default to INFO
    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_level(true)
        .try_init();

    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Create a new span for tracking request context
pub fn create_request_span(request_id: &str, method: &str, path: &str) -> tracing::Span {
    tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %path,
        timestamp = %chrono::Utc::now()
    )
}

/// Log a rate limit decision
pub fn log_rate_limit(identity: &str, tier: RateLimitTier, decision: &RateLimitDecision) {
    if decision.allowed {
        tracing::debug!(
            identity = %identity,
            tier = %tier,
            remaining = decision.remaining,
            limit = decision.limit,
            event = "rate_limit_check",
            timestamp = %chrono::Utc::now()
        );
    } else {
        tracing::warn!(
            identity = %identity,
            tier = %tier,
            limit = decision.limit,
            reset_at_epoch_ms = decision.reset_at_epoch_ms,
            event = "rate_limit_exceeded",
            timestamp = %chrono::Utc::now()
        );
    }
}

/// Log that the counter store could not be consulted and which policy was applied
pub fn log_store_failure(backend: &str, tier: RateLimitTier, policy: FailurePolicy, reason: &str) {
    tracing::warn!(
        backend = %backend,
        tier = %tier,
        policy = %policy,
        reason = %reason,
        event = "rate_limit_store_unavailable",
        timestamp = %chrono::Utc::now()
    );
}

/// Log a rejected CSRF check
pub fn log_csrf_rejection(method: &str, path: &str, failure: CsrfFailure) {
    tracing::warn!(
        method = %method,
        path = %path,
        reason = %failure,
        event = "csrf_rejected",
        timestamp = %chrono::Utc::now()
    );
}

/// Log a service lifecycle event
pub fn log_service_event(event_type: &str, success: bool, details: Option<&str>) {
    if success {
        tracing::info!(
            event_type = %event_type,
            success = %success,
            details = ?details,
            timestamp = %chrono::Utc::now()
        );
    } else {
        tracing::error!(
            event_type = %event_type,
            success = %success,
            details = ?details,
            timestamp = %chrono::Utc::now()
        );
    }
}
