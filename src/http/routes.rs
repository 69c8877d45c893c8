use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use super::middleware::{admission_middleware, request_span_middleware, RouteGuard};
use crate::core::RateLimitTier;
use crate::service::{AdmissionService, RoutePolicy};
use crate::utils::log_service_event;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub admission: Arc<AdmissionService>,
    /// Prometheus handle, `None` when no recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(admission: AdmissionService) -> Self {
        Self {
            admission: Arc::new(admission),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

fn guarded(state: &AppState, policy: RoutePolicy, routes: Router<AppState>) -> Router<AppState> {
    let guard = RouteGuard::new(state.admission.clone(), policy);
    routes.route_layer(from_fn_with_state(guard, admission_middleware))
}

/// Build the HTTP router.
///
/// - `GET /health`, `GET /metrics`: unguarded
/// - `GET /api/csrf-token`: generous tier, issues a token
/// - `POST /api/echo`: standard tier + CSRF
/// - `POST /api/expensive`: strict tier + CSRF
pub fn build_router(state: AppState) -> Router {
    let csrf_token = guarded(
        &state,
        RoutePolicy::new(RateLimitTier::Generous).without_csrf(),
        Router::new().route("/api/csrf-token", get(issue_csrf_token)),
    );
    let standard = guarded(
        &state,
        RoutePolicy::new(RateLimitTier::Standard),
        Router::new().route("/api/echo", post(echo)),
    );
    let strict = guarded(
        &state,
        RoutePolicy::new(RateLimitTier::Strict),
        Router::new().route("/api/expensive", post(echo)),
    );

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .merge(csrf_token)
        .merge(standard)
        .merge(strict)
        .layer(from_fn(request_span_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let limiter = state.admission.rate_limiter();
    Json(json!({
        "status": "ok",
        "rateLimitStore": limiter.has_store(),
        "failurePolicy": limiter.failure_policy().to_string(),
    }))
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn issue_csrf_token(State(state): State<AppState>) -> Response {
    match state.admission.issue_csrf_token() {
        Ok(issued) => (
            [(header::SET_COOKIE, issued.set_cookie)],
            Json(json!({ "csrfToken": issued.token.as_str() })),
        )
            .into_response(),
        Err(e) => {
            log_service_event("csrf_issue_failed", false, Some(&e.to_string()));
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal_error", "message": "Could not issue CSRF token" })),
            )
                .into_response()
        }
    }
}

async fn echo(Json(payload): Json<Value>) -> Json<Value> {
    Json(json!({ "received": payload }))
}
