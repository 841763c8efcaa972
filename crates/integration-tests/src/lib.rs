//! Integration tests for the Insider license backend.
//!
//! Each test spawns the real router on `127.0.0.1:0` backed by the
//! in-memory store and the fake Stripe and Mailjet clients, then drives
//! it over HTTP.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p insider-integration-tests
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use insider_api::config::ApiConfig;
use insider_api::db::MemoryStore;
use insider_api::state::AppState;
use insider_api::testing::{FakeGateway, FakeMailer, WEBHOOK_SECRET, api_config};
use reqwest::{Client, Response, StatusCode};
use serde_json::{Value, json};

pub use insider_api::testing::{INDIVIDUAL_PRODUCT, TEAM_PRODUCT};

pub const PASSWORD: &str = "correct-horse-battery";

/// A running server plus handles on its fakes.
pub struct TestContext {
    pub base_url: String,
    pub client: Client,
    pub gateway: Arc<FakeGateway>,
    pub mailer: Arc<FakeMailer>,
}

impl TestContext {
    /// Spawn with the default test configuration.
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    /// Spawn after letting the test adjust the configuration.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot bind.
    pub async fn spawn_with(configure: impl FnOnce(&mut ApiConfig)) -> Self {
        let mut config = api_config();
        configure(&mut config);

        let gateway = Arc::new(FakeGateway::default());
        let mailer = Arc::new(FakeMailer::default());
        let state = AppState::new(
            config,
            Arc::new(MemoryStore::new()),
            gateway.clone(),
            mailer.clone(),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        let app = insider_api::app(state);
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("test server");
        });

        Self {
            base_url: format!("http://{addr}"),
            client: new_client(),
            gateway,
            mailer,
        }
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// POST `body` as JSON, optionally with a bearer token.
    pub async fn post(&self, path: &str, token: Option<&str>, body: &Value) -> (StatusCode, Value) {
        let mut req = self.client.post(self.url(path)).json(body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        into_parts(req.send().await.expect("send")).await
    }

    /// PUT `body` as JSON with a bearer token.
    pub async fn put(&self, path: &str, token: &str, body: &Value) -> (StatusCode, Value) {
        let req = self.client.put(self.url(path)).bearer_auth(token).json(body);
        into_parts(req.send().await.expect("send")).await
    }

    /// GET, optionally with a bearer token.
    pub async fn get(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut req = self.client.get(self.url(path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        into_parts(req.send().await.expect("send")).await
    }

    /// Sign up `email` and return its access token.
    ///
    /// # Panics
    ///
    /// Panics if signup does not issue a token.
    pub async fn signup(&self, email: &str) -> String {
        let (status, body) = self
            .post(
                "/api/v1/auth/signup",
                None,
                &json!({ "email": email, "password": PASSWORD }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "signup {email}: {body}");
        body["token"].as_str().expect("token").to_string()
    }

    /// Activate a license of `license_type` for the holder of `token`; returns its id.
    pub async fn activate(&self, token: &str, license_type: &str) -> i64 {
        let (status, body) = self
            .post(
                "/api/v1/license/activate",
                Some(token),
                &json!({ "type": license_type }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "activate: {body}");
        body["license"]["id"].as_i64().expect("license id")
    }

    pub async fn add_member(&self, token: &str, license_id: i64, email: &str) -> (StatusCode, Value) {
        self.post(
            "/api/v1/license/add-team-member",
            Some(token),
            &json!({ "licenseId": license_id, "memberEmail": email }),
        )
        .await
    }

    pub async fn remove_member(
        &self,
        token: &str,
        license_id: i64,
        email: &str,
    ) -> (StatusCode, Value) {
        self.post(
            "/api/v1/license/remove-team-member",
            Some(token),
            &json!({ "licenseId": license_id, "memberEmail": email }),
        )
        .await
    }

    /// Licenses listed for the holder of `token`.
    pub async fn licenses(&self, token: &str) -> Vec<Value> {
        let (status, body) = self.get("/api/v1/license/", Some(token)).await;
        assert_eq!(status, StatusCode::OK, "list: {body}");
        body["licenses"].as_array().cloned().unwrap_or_default()
    }

    /// Deliver a signed `checkout.session.completed` event.
    pub async fn deliver_checkout(
        &self,
        session_id: &str,
        email: &str,
        product_id: &str,
    ) -> (StatusCode, Value) {
        let body = checkout_event(session_id, email, product_id);
        self.deliver_raw(&body, &signature(&body)).await
    }

    /// Deliver `body` with an explicit `Stripe-Signature` value.
    pub async fn deliver_raw(&self, body: &[u8], signature: &str) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(self.url("/webhook/stripe"))
            .header("content-type", "application/json")
            .header("stripe-signature", signature)
            .body(body.to_vec())
            .send()
            .await
            .expect("send");
        into_parts(resp).await
    }
}

/// Client with its own cookie jar.
///
/// # Panics
///
/// Panics if the TLS backend cannot initialise.
#[must_use]
pub fn new_client() -> Client {
    Client::builder()
        .cookie_store(true)
        .build()
        .expect("Failed to create HTTP client")
}

/// Status and JSON body (`Null` when the body is not JSON).
pub async fn into_parts(resp: Response) -> (StatusCode, Value) {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    (status, serde_json::from_str(&text).unwrap_or(Value::Null))
}

/// A paid `checkout.session.completed` event body.
///
/// # Panics
///
/// Never: the body is built from a JSON literal.
#[must_use]
pub fn checkout_event(session_id: &str, email: &str, product_id: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": format!("evt_{session_id}"),
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": session_id,
                "object": "checkout.session",
                "payment_status": "paid",
                "amount_total": 4900,
                "currency": "usd",
                "customer_details": { "email": email },
                "metadata": { "productId": product_id },
            }
        }
    }))
    .expect("serialize event")
}

/// `Stripe-Signature` header value for `body`, signed now with the test secret.
///
/// # Panics
///
/// Never: the test secret is a valid HMAC key.
#[must_use]
pub fn signature(body: &[u8]) -> String {
    let timestamp = chrono::Utc::now().timestamp().to_string();
    let v1 = insider_api::stripe::webhook::sign(body, &timestamp, WEBHOOK_SECRET)
        .expect("sign webhook body");
    format!("t={timestamp},v1={v1}")
}
