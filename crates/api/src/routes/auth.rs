//! Authentication route handlers.
//!
//! Signup and signin return an access token in the body and the refresh
//! token as an http-only `refreshToken` cookie.

use std::time::Duration;

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
    response::{AppendHeaders, IntoResponse, Response},
};
use cookie::Cookie;
use serde::{Deserialize, Serialize};

use insider_core::UserId;

use super::JsonBody;
use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::services::auth::{SignupOutcome, TokenPair};
use crate::state::AppState;

/// Name of the refresh-token cookie.
pub const REFRESH_COOKIE: &str = "refreshToken";

const USER_EXISTS: &str =
    "User already exists. Please signin or reset your password if you've forgotten your password.";
const RESET_SENT: &str = "If an account with this email exists, you will receive an email with instructions to reset your password.";

// =============================================================================
// Request / Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct UserRef {
    pub id: UserId,
}

/// Body returned whenever a new access token is issued.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub message: &'static str,
    pub token: String,
    pub user: UserRef,
}

// =============================================================================
// Cookies
// =============================================================================

/// `Set-Cookie` value carrying a refresh token.
pub(crate) fn refresh_cookie(token: &str, ttl: Duration, secure: bool) -> String {
    let max_age = cookie::time::Duration::seconds(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));
    Cookie::build((REFRESH_COOKIE, token))
        .http_only(true)
        .secure(secure)
        .path("/")
        .max_age(max_age)
        .build()
        .to_string()
}

/// Value of the named cookie from the request's `Cookie` headers.
pub(crate) fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(std::result::Result::ok)
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
}

/// Token body plus the refresh cookie.
pub(crate) fn token_response(
    state: &AppState,
    message: &'static str,
    user_id: UserId,
    tokens: TokenPair,
) -> Response {
    let cookie = refresh_cookie(
        &tokens.refresh,
        tokens.refresh_ttl,
        state.config().environment.is_production(),
    );
    (
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(TokenResponse {
            message,
            token: tokens.access,
            user: UserRef { id: user_id },
        }),
    )
        .into_response()
}

// =============================================================================
// Handlers
// =============================================================================

/// `POST /api/v1/auth/signup`
pub async fn signup(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CredentialsRequest>,
) -> Result<Response> {
    match state.auth().signup(&req.email, &req.password).await? {
        SignupOutcome::AlreadyExists => {
            Ok(Json(serde_json::json!({ "message": USER_EXISTS })).into_response())
        }
        SignupOutcome::Created(session) => Ok(token_response(
            &state,
            "Signed up successful",
            session.user.id,
            session.tokens,
        )),
    }
}

/// `POST /api/v1/auth/signin`
pub async fn signin(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CredentialsRequest>,
) -> Result<Response> {
    let session = state.auth().signin(&req.email, &req.password).await?;
    Ok(token_response(
        &state,
        "Login successful",
        session.user.id,
        session.tokens,
    ))
}

/// `POST /api/v1/auth/reset-password`
pub async fn reset_password(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ResetPasswordRequest>,
) -> Result<Json<serde_json::Value>> {
    state.auth().request_password_reset(&req.email).await?;
    Ok(Json(serde_json::json!({ "message": RESET_SENT })))
}

/// `POST /api/v1/auth/refresh-token`
pub async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>> {
    let cookie = read_cookie(&headers, REFRESH_COOKIE);
    let (user, token) = state.auth().refresh(cookie.as_deref()).await?;
    Ok(Json(TokenResponse {
        message: "Token refreshed successfully",
        token,
        user: UserRef { id: user.id },
    }))
}

/// `GET /api/v1/auth/status`
pub async fn status(RequireAuth(user): RequireAuth) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "User is authenticated",
        "user": { "id": user.id },
    }))
}
