//! axum middleware applying admission policies to route groups.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::request::Parts;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::Instrument;
use uuid::Uuid;

use super::headers::apply_rate_limit_headers;
use crate::core::ClientIdentity;
use crate::service::{AdmissionService, RequestContext, RoutePolicy};
use crate::utils::create_request_span;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// User id placed in request extensions by an upstream auth layer.
/// When present, quotas are counted per user instead of per IP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// Middleware state: the shared service plus the policy of one route group
#[derive(Clone)]
pub struct RouteGuard {
    admission: Arc<AdmissionService>,
    policy: RoutePolicy,
}

impl RouteGuard {
    pub fn new(admission: Arc<AdmissionService>, policy: RoutePolicy) -> Self {
        Self { admission, policy }
    }
}

/// Resolve who the request is counted against.
pub fn request_identity(parts: &Parts, trust_proxy_headers: bool) -> ClientIdentity {
    if let Some(AuthenticatedUser(id)) = parts.extensions.get::<AuthenticatedUser>() {
        return ClientIdentity::user(id.clone());
    }
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    ClientIdentity::from_headers(&parts.headers, peer, trust_proxy_headers)
}

/// Admit the request or answer with the rejection; rate limit headers are
/// added to the handler's response.
pub async fn admission_middleware(
    State(guard): State<RouteGuard>,
    request: Request<Body>,
    next: Next<Body>,
) -> Response {
    let (parts, body) = request.into_parts();
    let identity = request_identity(&parts, guard.admission.rate_limiter().trust_proxy_headers());
    let context = RequestContext {
        method: &parts.method,
        path: parts.uri.path(),
        headers: &parts.headers,
        identity: &identity,
    };

    let admission = match guard.admission.process_request(context, guard.policy).await {
        Ok(admission) => admission,
        Err(rejection) => return rejection.into_response(),
    };

    let mut response = next.run(Request::from_parts(parts, body)).await;
    apply_rate_limit_headers(response.headers_mut(), &admission.decision);
    response
}

/// Run each request inside a `request` span keyed by a request id.
///
/// An incoming `x-request-id` is reused; otherwise a UUID v4 is generated.
pub async fn request_span_middleware(request: Request<Body>, next: Next<Body>) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let span = create_request_span(&request_id, request.method().as_str(), request.uri().path());

    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = request_id.parse() {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
