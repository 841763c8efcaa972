//! Checkout handlers. Both routes are public: the buyer may not have an
//! account until the webhook has run.

use axum::{
    Json,
    extract::State,
    response::{AppendHeaders, IntoResponse, Response},
    http::header,
};
use serde::{Deserialize, Serialize};

use super::JsonBody;
use super::auth::refresh_cookie;
use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLinkRequest {
    #[serde(default)]
    pub product_id: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentLinkResponse {
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    #[serde(default)]
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub message: &'static str,
    pub token: String,
}

/// `POST /api/v1/payments/create-payment-link`
pub async fn create_payment_link(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<PaymentLinkRequest>,
) -> Result<Json<PaymentLinkResponse>> {
    let url = state.payments().create_payment_link(&req.product_id).await?;
    Ok(Json(PaymentLinkResponse { url }))
}

/// `POST /api/v1/payments/verify-payment`
pub async fn verify_payment(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<VerifyPaymentRequest>,
) -> Result<Response> {
    let (_user, tokens) = state.payments().verify_payment(&req.session_id).await?;
    let cookie = refresh_cookie(
        &tokens.refresh,
        tokens.refresh_ttl,
        state.config().environment.is_production(),
    );
    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(VerifyPaymentResponse {
            message: "Payment verified and login tokens generated",
            token: tokens.access,
        }),
    )
        .into_response())
}
