//! Probes, fallback, body limit, headers and rate limiting.

#![allow(clippy::unwrap_used)]

use insider_integration_tests::{PASSWORD, TestContext, new_client};
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn test_probes() {
    let ctx = TestContext::spawn().await;

    let resp = ctx.client.get(ctx.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "ok");

    let resp = ctx.client.get(ctx.url("/health/ready")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let (status, body) = ctx.get("/api/v1/public/up", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Up processed" }));
}

#[tokio::test]
async fn test_unknown_path_fallback() {
    let ctx = TestContext::spawn().await;

    let (status, body) = ctx.get("/api/v1/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body,
        json!({ "status": "fail", "message": "Can't find /api/v1/nope on this server!" })
    );
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let ctx = TestContext::spawn().await;

    let resp = ctx
        .client
        .post(ctx.url("/api/v1/auth/signin"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_body_limit() {
    let ctx = TestContext::spawn().await;
    let padding = "x".repeat(11 * 1024);

    let (status, _) = ctx
        .post(
            "/api/v1/auth/signin",
            None,
            &json!({ "email": "a@b.com", "password": padding }),
        )
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_response_headers() {
    let ctx = TestContext::spawn().await;

    let resp = ctx
        .client
        .get(ctx.url("/api/v1/public/up"))
        .header("x-request-id", "upstream-123")
        .send()
        .await
        .unwrap();
    let headers = resp.headers();
    assert_eq!(headers["x-request-id"], "upstream-123");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert!(headers.contains_key("strict-transport-security"));
}

#[tokio::test]
async fn test_cors_preflight_for_frontend() {
    let ctx = TestContext::spawn().await;

    let resp = ctx
        .client
        .request(reqwest::Method::OPTIONS, ctx.url("/api/v1/auth/signin"))
        .header("origin", "http://localhost:3000")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "authorization,content-type")
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers()["access-control-allow-origin"],
        "http://localhost:3000"
    );
    assert_eq!(resp.headers()["access-control-allow-credentials"], "true");
}

#[tokio::test]
async fn test_credential_endpoints_are_rate_limited() {
    let ctx = TestContext::spawn_with(|config| config.rate_limit = true).await;
    let client = new_client();
    let body = json!({ "email": "a@b.com", "password": PASSWORD });

    let mut statuses = Vec::new();
    for _ in 0..12 {
        let resp = client
            .post(ctx.url("/api/v1/auth/signin"))
            .header("x-forwarded-for", "203.0.113.50")
            .json(&body)
            .send()
            .await
            .unwrap();
        statuses.push(resp.status());
    }

    // Burst of 10, then refused
    assert!(statuses.iter().take(10).all(|s| *s == StatusCode::UNAUTHORIZED));
    assert_eq!(statuses.last(), Some(&StatusCode::TOO_MANY_REQUESTS));

    // Another client address is unaffected
    let resp = client
        .post(ctx.url("/api/v1/auth/signin"))
        .header("x-forwarded-for", "203.0.113.51")
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
