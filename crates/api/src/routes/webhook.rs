//! Stripe webhook endpoint.
//!
//! Mounted outside `/api` so the raw body reaches signature verification
//! untouched and the API body limit does not apply.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use serde_json::{Value, json};

use crate::error::Result;
use crate::services::payments::WebhookOutcome;
use crate::state::AppState;

/// Header carrying `t=<unix>,v1=<hex>`.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// `POST /webhook/stripe`
pub async fn stripe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = state.payments().handle_webhook(&body, signature).await?;

    Ok(Json(match outcome {
        WebhookOutcome::Provisioned {
            account_created: true,
        } => json!({ "message": "Webhook received, Payment received, creating new account" }),
        WebhookOutcome::Provisioned {
            account_created: false,
        } => json!({ "message": "Webhook received, Payment received, updating existing account" }),
        WebhookOutcome::Ignored | WebhookOutcome::Duplicate => json!({ "received": true }),
    }))
}
