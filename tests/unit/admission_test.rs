use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use request_admission::config::RateLimitConfig;
use request_admission::core::{ClientIdentity, CounterStore, FailurePolicy, InMemoryCounterStore};
use request_admission::http::build_router;
use request_admission::http::{request_identity, AuthenticatedUser, REQUEST_ID_HEADER};

use crate::test_utils::{
    app, header_u64, json_body, json_post, limiter_with_config, limiter_with_store, memory_limiter, metrics_handle,
    random_ip, send, state, text_body, WINDOW_START_MS,
};

#[test_log::test(tokio::test)]
async fn test_strict_route_rejects_eleventh_request_with_429() {
    let (limiter, clock) = memory_limiter(FailurePolicy::FailOpen);
    let app = app(limiter);
    let ip = random_ip();

    for i in 0..10u64 {
        let response = send(&app, json_post("/api/expensive", &ip, Some("tok"), Some("tok"))).await;
        assert_eq!(response.status(), StatusCode::OK, "request {i}");
        assert_eq!(header_u64(&response, "x-ratelimit-limit"), 10);
        assert_eq!(header_u64(&response, "x-ratelimit-remaining"), 9 - i);
        assert_eq!(header_u64(&response, "x-ratelimit-reset"), WINDOW_START_MS + 10_000);
        clock.advance(Duration::from_millis(50));
    }

    let response = send(&app, json_post("/api/expensive", &ip, Some("tok"), Some("tok"))).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header_u64(&response, "x-ratelimit-remaining"), 0);
    // 500ms into the window, 9.5s left, rounded up.
    assert_eq!(header_u64(&response, header::RETRY_AFTER.as_str()), 10);

    let body = json_body(response).await;
    assert_eq!(body["error"], "rate_limited");
    assert!(body["message"].as_str().unwrap().contains("retry in 10 seconds"));

    // Another client is unaffected.
    let response = send(&app, json_post("/api/expensive", &random_ip(), Some("tok"), Some("tok"))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit_is_checked_before_csrf() {
    let (limiter, _clock) = memory_limiter(FailurePolicy::FailOpen);
    let app = app(limiter);
    let ip = random_ip();

    for _ in 0..10 {
        let response = send(&app, json_post("/api/expensive", &ip, None, None)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
    // Rejected CSRF attempts still used quota, so the limiter answers first now.
    let response = send(&app, json_post("/api/expensive", &ip, None, None)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_missing_store_fails_open_and_keeps_headers() {
    let (limiter, _clock) = limiter_with_store(None, FailurePolicy::FailOpen);
    let app = app(limiter);

    let response = send(&app, json_post("/api/echo", &random_ip(), Some("tok"), Some("tok"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_u64(&response, "x-ratelimit-limit"), 100);
    assert_eq!(header_u64(&response, "x-ratelimit-remaining"), 100);
}

#[tokio::test]
async fn test_missing_store_fails_closed_with_503() {
    let (limiter, _clock) = limiter_with_store(None, FailurePolicy::FailClosed);
    let app = app(limiter);

    let response = send(&app, json_post("/api/echo", &random_ip(), Some("tok"), Some("tok"))).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
    assert_eq!(json_body(response).await["error"], "rate_limiter_unavailable");
}

#[tokio::test]
async fn test_health_is_not_rate_limited_and_reports_policy() {
    let (limiter, _clock) = limiter_with_store(None, FailurePolicy::FailClosed);
    let app = app(limiter);

    let response = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-ratelimit-limit").is_none());
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));

    let body = json_body(response).await;
    assert_eq!(body["rateLimitStore"], false);
    assert_eq!(body["failurePolicy"], "fail_closed");
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let (limiter, _clock) = memory_limiter(FailurePolicy::FailOpen);
    let app = app(limiter);

    let response = send(
        &app,
        Request::get("/health")
            .header(REQUEST_ID_HEADER, "req-123")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-123");
}

#[test]
fn test_identity_prefers_authenticated_user_then_headers_then_peer() {
    let peer: SocketAddr = "192.0.2.77:40000".parse().unwrap();

    let mut request = Request::get("/").header("x-real-ip", "203.0.113.9").body(()).unwrap();
    request.extensions_mut().insert(ConnectInfo(peer));
    let (parts, _) = request.into_parts();
    assert_eq!(request_identity(&parts, true), ClientIdentity::Ip("203.0.113.9".into()));

    let mut request = Request::get("/").body(()).unwrap();
    request.extensions_mut().insert(ConnectInfo(peer));
    let (parts, _) = request.into_parts();
    assert_eq!(request_identity(&parts, true), ClientIdentity::Ip("192.0.2.77".into()));

    let mut request = Request::get("/").header("x-real-ip", "203.0.113.9").body(()).unwrap();
    request.extensions_mut().insert(AuthenticatedUser("user-9".into()));
    let (parts, _) = request.into_parts();
    assert_eq!(request_identity(&parts, true), ClientIdentity::user("user-9"));
}

#[test]
fn test_identity_ignores_proxy_headers_when_untrusted() {
    let peer: SocketAddr = "192.0.2.77:40000".parse().unwrap();

    let mut request = Request::get("/")
        .header("x-forwarded-for", "203.0.113.9")
        .header("x-real-ip", "203.0.113.10")
        .body(())
        .unwrap();
    request.extensions_mut().insert(ConnectInfo(peer));
    let (parts, _) = request.into_parts();
    assert_eq!(request_identity(&parts, false), ClientIdentity::Ip("192.0.2.77".into()));
}

#[tokio::test]
async fn test_rotating_forwarded_for_does_not_bypass_limit_when_untrusted() {
    let store: Arc<dyn CounterStore> = Arc::new(InMemoryCounterStore::new());
    let config = RateLimitConfig {
        trust_proxy_headers: false,
        ..RateLimitConfig::default()
    };
    let (limiter, _clock) = limiter_with_config(Some(store), &config);
    let app = app(limiter);
    let peer: SocketAddr = "192.0.2.50:40000".parse().unwrap();

    let spoofed = |ip: String| {
        let mut request = json_post("/api/expensive", &ip, Some("tok"), Some("tok"));
        request.extensions_mut().insert(ConnectInfo(peer));
        request
    };

    for i in 0..10 {
        let response = send(&app, spoofed(random_ip())).await;
        assert_eq!(response.status(), StatusCode::OK, "request {i}");
    }
    let response = send(&app, spoofed(random_ip())).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_garbage_forwarded_for_shares_the_anonymous_bucket() {
    let (limiter, _clock) = memory_limiter(FailurePolicy::FailOpen);
    let app = app(limiter);

    // No peer address and no parseable header: every request is `anonymous`.
    for i in 0..10 {
        let junk = format!("client-{i}-{}", "x".repeat(512));
        let response = send(&app, json_post("/api/expensive", &junk, Some("tok"), Some("tok"))).await;
        assert_eq!(response.status(), StatusCode::OK, "request {i}");
    }
    let response = send(&app, json_post("/api/expensive", "not-an-ip", Some("tok"), Some("tok"))).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_metrics_endpoint_exports_admission_counters() {
    let handle = metrics_handle();
    let (limiter, _clock) = memory_limiter(FailurePolicy::FailOpen);
    let app = build_router(state(limiter).with_metrics(handle));

    let response = send(&app, json_post("/api/expensive", &random_ip(), None, None)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(&app, Request::get("/metrics").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = text_body(response).await;
    assert!(body.contains("admission_rate_limit_decisions_total"), "{body}");
    assert!(body.contains(r#"tier="strict""#), "{body}");
    assert!(body.contains("admission_csrf_rejections_total"), "{body}");
}
