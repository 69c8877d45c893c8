use std::hint::black_box;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use request_admission::core::{tokens_match, FailurePolicy};

use crate::test_utils::{app, json_body, json_post, memory_limiter, random_ip, send};

#[tokio::test]
async fn test_post_without_cookie_is_forbidden() {
    let (limiter, _clock) = memory_limiter(FailurePolicy::FailOpen);
    let app = app(limiter);

    let response = send(&app, json_post("/api/echo", &random_ip(), None, Some("token"))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = json_body(response).await;
    assert_eq!(body["error"], "csrf_invalid");
    assert_eq!(body["message"], "CSRF cookie missing");
}

#[tokio::test]
async fn test_post_without_header_is_forbidden() {
    let (limiter, _clock) = memory_limiter(FailurePolicy::FailOpen);
    let app = app(limiter);

    let response = send(&app, json_post("/api/echo", &random_ip(), Some("token"), None)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["message"], "CSRF token header missing");
}

#[tokio::test]
async fn test_tokens_differing_in_one_byte_are_forbidden() {
    let (limiter, _clock) = memory_limiter(FailurePolicy::FailOpen);
    let app = app(limiter);
    let ip = random_ip();

    for (cookie, token) in [("Zm9vYmFyYmF6", "Xm9vYmFyYmF6"), ("Zm9vYmFyYmF6", "Zm9vYmFyYmF7")] {
        let response = send(&app, json_post("/api/echo", &ip, Some(cookie), Some(token))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["message"], "CSRF token mismatch");
    }
}

#[tokio::test]
async fn test_issued_token_round_trip() {
    let (limiter, _clock) = memory_limiter(FailurePolicy::FailOpen);
    let app = app(limiter);
    let ip = random_ip();

    let issued = send(
        &app,
        Request::get("/api/csrf-token")
            .header("x-forwarded-for", &ip)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(issued.status(), StatusCode::OK);

    let set_cookie = issued.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("Secure"));
    assert!(set_cookie.contains("SameSite=Strict"));
    assert!(set_cookie.contains("Max-Age=604800"));

    let body = json_body(issued).await;
    let token = body["csrfToken"].as_str().unwrap().to_string();
    assert!(set_cookie.starts_with(&format!("csrf-token={token};")));

    let response = send(&app, json_post("/api/echo", &ip, Some(&token), Some(&token))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["received"]["title"], "quarterly report");
}

#[tokio::test]
async fn test_safe_methods_skip_the_guard() {
    let (limiter, _clock) = memory_limiter(FailurePolicy::FailOpen);
    let app = app(limiter);

    for method in [Method::GET, Method::HEAD] {
        let response = send(
            &app,
            Request::builder()
                .method(method)
                .uri("/api/csrf-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

fn fastest_run(a: &str, b: &str) -> Duration {
    (0..7)
        .map(|_| {
            let start = Instant::now();
            for _ in 0..20_000 {
                black_box(tokens_match(black_box(a), black_box(b)));
            }
            start.elapsed()
        })
        .min()
        .unwrap_or_default()
}

#[test]
fn test_comparison_time_does_not_depend_on_mismatch_position() {
    let reference = "k3J9QmP0xVYc2rD8uZt5LwEo1HbN6sAfGqTi4yMn7Ce=";
    let first_differs = format!("X{}", &reference[1..]);
    let last_differs = format!("{}X", &reference[..reference.len() - 1]);
    assert_eq!(first_differs.len(), last_differs.len());
    assert!(!tokens_match(reference, &first_differs));
    assert!(!tokens_match(reference, &last_differs));

    let first = fastest_run(reference, &first_differs).as_secs_f64();
    let last = fastest_run(reference, &last_differs).as_secs_f64();
    let ratio = first.max(last) / first.min(last).max(f64::EPSILON);
    assert!(ratio < 3.0, "timing ratio {ratio:.2} suggests an early exit");
}
