mod common;

use axum::http::{Method, StatusCode};

use common::app::{spawn_test_server, spawn_test_server_with_limits};
use common::http::{request, response_json};

#[tokio::test]
async fn it_rate_limit_triggers_429_with_headers() {
    let app = spawn_test_server_with_limits(3).await;

    let mut final_status = StatusCode::OK;
    let mut final_headers = axum::http::HeaderMap::new();
    let mut final_body = serde_json::json!({});

    for _ in 0..4 {
        let response = request(&app.app, Method::GET, "/api/issues?project=shop", None, &[]).await;
        let (status, headers, body) = response_json(response).await;
        final_status = status;
        final_headers = headers;
        final_body = body;
    }

    assert_eq!(final_status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(final_body["code"], "RATE_LIMITED");
    assert_eq!(
        final_headers.get("ratelimit-limit").unwrap().to_str().unwrap(),
        "3"
    );
    assert_eq!(
        final_headers
            .get("ratelimit-remaining")
            .unwrap()
            .to_str()
            .unwrap(),
        "0"
    );
    assert!(final_headers.contains_key("ratelimit-reset"));
    assert!(final_headers.contains_key("retry-after"));
}

#[tokio::test]
async fn it_rate_limit_headers_on_allowed_requests() {
    let app = spawn_test_server_with_limits(5).await;

    let response = request(&app.app, Method::GET, "/api/issues?project=shop", None, &[]).await;
    let (status, headers, _) = response_json(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("ratelimit-limit").unwrap().to_str().unwrap(), "5");
    assert_eq!(
        headers.get("ratelimit-remaining").unwrap().to_str().unwrap(),
        "4"
    );
}

#[tokio::test]
async fn it_health_is_not_rate_limited() {
    let app = spawn_test_server_with_limits(1).await;

    // Exhaust the API budget.
    request(&app.app, Method::GET, "/api/issues?project=shop", None, &[]).await;
    let limited = request(&app.app, Method::GET, "/api/issues?project=shop", None, &[]).await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);

    let health = request(&app.app, Method::GET, "/health/live", None, &[]).await;
    assert_eq!(health.status(), StatusCode::OK);
}

#[tokio::test]
async fn it_forwarded_ip_is_ignored_without_trust_proxy() {
    let app = spawn_test_server().await;

    // trust_proxy is off in tests, so a spoofed header cannot fork windows.
    let spoofed = request(
        &app.app,
        Method::GET,
        "/api/issues?project=shop",
        None,
        &[("x-forwarded-for", "203.0.113.7".to_string())],
    )
    .await;
    let (status, headers, _) = response_json(spoofed).await;
    assert_eq!(status, StatusCode::OK);

    let remaining: u64 = headers
        .get("ratelimit-remaining")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();

    let plain = request(&app.app, Method::GET, "/api/issues?project=shop", None, &[]).await;
    let (_, headers, _) = response_json(plain).await;
    let remaining_after: u64 = headers
        .get("ratelimit-remaining")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();

    // Same window: the second request consumed from the same budget.
    assert_eq!(remaining_after, remaining - 1);
}
