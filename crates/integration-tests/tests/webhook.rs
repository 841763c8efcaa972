//! Stripe webhook provisioning and post-checkout login over HTTP.

#![allow(clippy::unwrap_used)]

use insider_api::testing::checkout_session;
use insider_integration_tests::{
    INDIVIDUAL_PRODUCT, PASSWORD, TEAM_PRODUCT, TestContext, checkout_event, new_client,
    signature,
};
use reqwest::StatusCode;
use serde_json::json;

async fn signin(ctx: &TestContext, email: &str, password: &str) -> Option<String> {
    let (status, body) = ctx
        .post(
            "/api/v1/auth/signin",
            None,
            &json!({ "email": email, "password": password }),
        )
        .await;
    (status == StatusCode::OK).then(|| body["token"].as_str().unwrap().to_string())
}

#[tokio::test]
async fn test_new_buyer_is_provisioned_once() {
    let ctx = TestContext::spawn().await;

    let (status, body) = ctx.deliver_checkout("cs_1", "buyer@x.com", TEAM_PRODUCT).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["message"],
        "Webhook received, Payment received, creating new account"
    );

    let temp = ctx.mailer.last_temp_password().unwrap();
    let token = signin(&ctx, "buyer@x.com", &temp).await.unwrap();
    let licenses = ctx.licenses(&token).await;
    assert_eq!(licenses.len(), 1);
    assert_eq!(licenses[0]["type"], "team");
    assert_eq!(licenses[0]["teamMembers"].as_array().unwrap().len(), 1);

    // Redelivery of the same session is acknowledged and changes nothing
    let sent = ctx.mailer.sent().len();
    let (status, body) = ctx.deliver_checkout("cs_1", "buyer@x.com", TEAM_PRODUCT).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true }));
    assert_eq!(ctx.licenses(&token).await.len(), 1);
    assert_eq!(ctx.mailer.sent().len(), sent);
    assert_eq!(ctx.gateway.customers().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redeliveries_provision_once() {
    let ctx = TestContext::spawn().await;

    let (a, b, c) = tokio::join!(
        ctx.deliver_checkout("cs_1", "buyer@x.com", TEAM_PRODUCT),
        ctx.deliver_checkout("cs_1", "buyer@x.com", TEAM_PRODUCT),
        ctx.deliver_checkout("cs_1", "buyer@x.com", TEAM_PRODUCT),
    );
    let responses = [a, b, c];
    let created = responses
        .iter()
        .filter(|(_, body)| {
            body["message"] == "Webhook received, Payment received, creating new account"
        })
        .count();
    assert_eq!(created, 1, "{responses:?}");
    for (status, body) in &responses {
        assert!(
            *status == StatusCode::OK || *status == StatusCode::CONFLICT,
            "{status}: {body}"
        );
    }

    assert_eq!(ctx.gateway.customers(), vec!["buyer@x.com".to_string()]);
    assert_eq!(ctx.mailer.contacts(), vec!["buyer@x.com".to_string()]);
    assert_eq!(ctx.mailer.sent().len(), 1);

    let (status, body) = ctx.deliver_checkout("cs_1", "buyer@x.com", TEAM_PRODUCT).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true }));

    let temp = ctx.mailer.last_temp_password().unwrap();
    let token = signin(&ctx, "buyer@x.com", &temp).await.unwrap();
    assert_eq!(ctx.licenses(&token).await.len(), 1);
}

#[tokio::test]
async fn test_existing_buyer_gets_another_license() {
    let ctx = TestContext::spawn().await;
    let token = ctx.signup("buyer@x.com").await;

    let (status, body) = ctx
        .deliver_checkout("cs_2", "buyer@x.com", INDIVIDUAL_PRODUCT)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["message"],
        "Webhook received, Payment received, updating existing account"
    );
    assert_eq!(ctx.licenses(&token).await.len(), 1);

    // No temporary password; the account keeps its own
    assert!(ctx.mailer.last_temp_password().is_none());
    assert!(signin(&ctx, "buyer@x.com", PASSWORD).await.is_some());
}

#[tokio::test]
async fn test_bad_signature_is_rejected_before_any_write() {
    let ctx = TestContext::spawn().await;
    let body = checkout_event("cs_3", "buyer@x.com", TEAM_PRODUCT);

    let (status, _) = ctx.deliver_raw(&body, "t=1,v1=deadbeef").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut tampered = body.clone();
    tampered.extend_from_slice(b" ");
    let (status, _) = ctx.deliver_raw(&tampered, &signature(&body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let resp = new_client()
        .post(ctx.url("/webhook/stripe"))
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert!(ctx.gateway.customers().is_empty());
    assert!(ctx.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_unknown_product_writes_nothing() {
    let ctx = TestContext::spawn().await;

    let (status, _) = ctx.deliver_checkout("cs_4", "buyer@x.com", "prod_other").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(ctx.gateway.customers().is_empty());
    assert!(ctx.mailer.sent().is_empty());

    // Not recorded as processed: a corrected delivery would still provision
    let (status, _) = ctx.deliver_checkout("cs_4", "buyer@x.com", TEAM_PRODUCT).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_provider_failure_is_retryable() {
    let ctx = TestContext::spawn().await;
    ctx.gateway.fail_customers(true);

    let (status, _) = ctx.deliver_checkout("cs_5", "buyer@x.com", TEAM_PRODUCT).await;
    assert!(status.is_server_error());
    assert!(ctx.mailer.sent().is_empty());

    ctx.gateway.fail_customers(false);
    let (status, body) = ctx.deliver_checkout("cs_5", "buyer@x.com", TEAM_PRODUCT).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["message"],
        "Webhook received, Payment received, creating new account"
    );
}

#[tokio::test]
async fn test_other_events_are_acknowledged() {
    let ctx = TestContext::spawn().await;
    let body = serde_json::to_vec(&json!({
        "id": "evt_other",
        "type": "invoice.paid",
        "data": { "object": {} },
    }))
    .unwrap();

    let (status, resp) = ctx.deliver_raw(&body, &signature(&body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp, json!({ "received": true }));
}

#[tokio::test]
async fn test_verify_payment_logs_buyer_in() {
    let ctx = TestContext::spawn().await;
    ctx.deliver_checkout("cs_6", "buyer@x.com", TEAM_PRODUCT).await;
    ctx.gateway
        .put_session(checkout_session("cs_6", "buyer@x.com", TEAM_PRODUCT, true));

    let (status, body) = ctx
        .post(
            "/api/v1/payments/verify-payment",
            None,
            &json!({ "sessionId": "cs_6" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Payment verified and login tokens generated");
    let token = body["token"].as_str().unwrap();
    assert_eq!(ctx.licenses(token).await.len(), 1);

    // The 24 hour refresh cookie came with it
    let (status, _) = ctx.post("/api/v1/auth/refresh-token", None, &json!({})).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_verify_payment_errors() {
    let ctx = TestContext::spawn().await;

    let (status, body) = ctx
        .post("/api/v1/payments/verify-payment", None, &json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Session ID is required");

    ctx.gateway
        .put_session(checkout_session("cs_unpaid", "b@x.com", TEAM_PRODUCT, false));
    let (status, body) = ctx
        .post(
            "/api/v1/payments/verify-payment",
            None,
            &json!({ "sessionId": "cs_unpaid" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Payment not completed");

    // Paid at Stripe but the webhook has not been processed yet
    ctx.gateway
        .put_session(checkout_session("cs_early", "b@x.com", TEAM_PRODUCT, true));
    let (status, _) = ctx
        .post(
            "/api/v1/payments/verify-payment",
            None,
            &json!({ "sessionId": "cs_early" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_payment_link() {
    let ctx = TestContext::spawn().await;

    let (status, body) = ctx
        .post(
            "/api/v1/payments/create-payment-link",
            None,
            &json!({ "productId": TEAM_PRODUCT }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["url"],
        format!("https://checkout.stripe.test/{TEAM_PRODUCT}")
    );

    let (status, body) = ctx
        .post("/api/v1/payments/create-payment-link", None, &json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Product ID is required");
}
