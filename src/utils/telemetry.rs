//! Prometheus counters for admission decisions.
//!
//! - `admission_rate_limit_decisions_total{tier,outcome}`
//! - `admission_store_failures_total{backend}`
//! - `admission_csrf_rejections_total{reason}`

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::{CsrfFailure, DecisionSource, RateLimitDecision, RateLimitTier};
use crate::utils::{AdmissionError, AdmissionResult};

/// Install the global Prometheus recorder and return a handle for rendering.
pub fn install_prometheus_recorder() -> AdmissionResult<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| AdmissionError::Internal(format!("metrics recorder: {e}")))
}

pub fn record_rate_limit_decision(tier: RateLimitTier, decision: &RateLimitDecision) {
    let outcome = match (decision.allowed, decision.source) {
        (true, DecisionSource::Store) => "allowed",
        (false, DecisionSource::Store) => "rejected",
        (_, DecisionSource::FailOpen) => "fail_open",
        (_, DecisionSource::FailClosed) => "fail_closed",
    };
    metrics::increment_counter!(
        "admission_rate_limit_decisions_total",
        "tier" => tier.as_str(),
        "outcome" => outcome
    );
}

pub fn record_store_failure(backend: &'static str) {
    metrics::increment_counter!("admission_store_failures_total", "backend" => backend);
}

pub fn record_csrf_rejection(failure: CsrfFailure) {
    metrics::increment_counter!("admission_csrf_rejections_total", "reason" => failure.as_str());
}
