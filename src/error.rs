use std::fmt;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::core::{CsrfFailure, RateLimitDecision};
use crate::http::apply_rate_limit_headers;

/// Reasons a request is refused before its handler runs
#[derive(Debug, Clone)]
pub enum Rejection {
    /// Request rate limit has been exceeded
    RateLimited {
        decision: RateLimitDecision,
        retry_after_secs: u64,
    },
    /// Counter store unavailable and the failure policy is fail-closed
    StoreUnavailable {
        decision: RateLimitDecision,
        retry_after_secs: u64,
    },
    /// CSRF cookie or header missing, or the two differ
    CsrfRejected(CsrfFailure),
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Rejection::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Rejection::CsrfRejected(_) => StatusCode::FORBIDDEN,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Rejection::RateLimited { .. } => "rate_limited",
            Rejection::StoreUnavailable { .. } => "rate_limiter_unavailable",
            Rejection::CsrfRejected(_) => "csrf_invalid",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::RateLimited { retry_after_secs, .. } => {
                write!(f, "Too many requests, retry in {} seconds", retry_after_secs)
            }
            Rejection::StoreUnavailable { .. } => {
                write!(f, "Rate limiting is unavailable, try again later")
            }
            Rejection::CsrfRejected(CsrfFailure::MissingCookie) => write!(f, "CSRF cookie missing"),
            Rejection::CsrfRejected(CsrfFailure::MissingHeader) => write!(f, "CSRF token header missing"),
            Rejection::CsrfRejected(CsrfFailure::Mismatch) => write!(f, "CSRF token mismatch"),
        }
    }
}

impl std::error::Error for Rejection {}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.error_code(),
            "message": self.to_string(),
        }));
        let mut response = (self.status(), body).into_response();

        match &self {
            Rejection::RateLimited {
                decision,
                retry_after_secs,
            }
            | Rejection::StoreUnavailable {
                decision,
                retry_after_secs,
            } => {
                let headers = response.headers_mut();
                apply_rate_limit_headers(headers, decision);
                headers.insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
            }
            Rejection::CsrfRejected(_) => {}
        }
        response
    }
}
