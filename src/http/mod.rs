//! HTTP surface: axum middleware, response headers and the demo router.

mod headers;
mod middleware;
mod routes;

pub use headers::{apply_rate_limit_headers, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET};
pub use middleware::{
    admission_middleware, request_identity, request_span_middleware, AuthenticatedUser, RouteGuard,
    REQUEST_ID_HEADER,
};
pub use routes::{build_router, AppState};
