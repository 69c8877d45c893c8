//! Request admission for the platform's HTTP handlers.
//!
//! Two checks run before a handler executes: a sliding-window rate limiter
//! evaluated against an external counter store, and a double-submit-cookie
//! CSRF guard. [`service::AdmissionService`] chains them and
//! [`http::admission_middleware`] applies them to axum routes.

pub mod config;
pub mod core;
pub mod error;
pub mod http;
pub mod service;
pub mod utils;

pub use crate::core::{
    ClientIdentity, CsrfGuard, FailurePolicy, RateLimitDecision, RateLimitTier, RateLimiter,
};
pub use error::Rejection;
pub use service::{AdmissionService, RoutePolicy};
