//! HTTP route handlers for the license backend.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                              - Liveness
//! GET  /health/ready                        - Readiness (store ping)
//! POST /webhook/stripe                      - Stripe events (raw body, signed)
//!
//! # Auth (credential endpoints rate limited)
//! POST /api/v1/auth/signup
//! POST /api/v1/auth/signin
//! POST /api/v1/auth/reset-password
//! POST /api/v1/auth/refresh-token           - Reads the refreshToken cookie
//! GET  /api/v1/auth/status                  - Bearer
//!
//! # Licenses (bearer)
//! GET  /api/v1/license/
//! POST /api/v1/license/activate
//! POST /api/v1/license/add-team-member
//! POST /api/v1/license/remove-team-member
//! GET  /api/v1/license/check-active
//!
//! # Settings (bearer)
//! GET  /api/v1/settings/user
//! PUT  /api/v1/settings/update-name
//! PUT  /api/v1/settings/update-password
//!
//! # Payments
//! POST /api/v1/payments/create-payment-link
//! POST /api/v1/payments/verify-payment
//!
//! # Public
//! GET  /api/v1/public/up
//! ```

pub mod auth;
pub mod license;
pub mod payments;
pub mod public;
pub mod settings;
pub mod webhook;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, FromRequest, OriginalUri},
    http::{Request, StatusCode},
    middleware::from_fn,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::middleware::{
    api_rate_limiter, auth_rate_limiter, cors_layer, request_id_middleware,
    security_headers_middleware,
};
use crate::state::AppState;

/// Largest JSON body accepted under `/api`.
pub const API_BODY_LIMIT: usize = 10 * 1024;

/// `Json` extractor whose rejection renders as an [`AppError`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

/// Create the auth routes router.
pub fn auth_routes(rate_limit: bool) -> Router<AppState> {
    let mut credentials = Router::new()
        .route("/signup", post(auth::signup))
        .route("/signin", post(auth::signin))
        .route("/reset-password", post(auth::reset_password));
    if rate_limit {
        credentials = credentials.layer(auth_rate_limiter());
    }

    Router::new()
        .route("/refresh-token", post(auth::refresh_token))
        .route("/status", get(auth::status))
        .merge(credentials)
}

/// Create the license routes router.
///
/// Merged rather than nested: clients call the listing as `/license/`, and a
/// nested `/` only matches `/license`.
pub fn license_routes() -> Router<AppState> {
    Router::new()
        .route("/license", get(license::list))
        .route("/license/", get(license::list))
        .route("/license/activate", post(license::activate))
        .route("/license/add-team-member", post(license::add_team_member))
        .route("/license/remove-team-member", post(license::remove_team_member))
        .route("/license/check-active", get(license::check_active))
}

/// Create the settings routes router.
pub fn settings_routes() -> Router<AppState> {
    Router::new()
        .route("/user", get(settings::user))
        .route("/update-name", put(settings::update_name))
        .route("/update-password", put(settings::update_password))
}

/// Create the payment routes router.
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/create-payment-link", post(payments::create_payment_link))
        .route("/verify-payment", post(payments::verify_payment))
}

/// Create the public routes router.
pub fn public_routes() -> Router<AppState> {
    Router::new().route("/up", get(public::up))
}

/// Everything under `/api`.
pub fn api_routes(rate_limit: bool) -> Router<AppState> {
    let v1 = Router::new()
        .nest("/auth", auth_routes(rate_limit))
        .merge(license_routes())
        .nest("/settings", settings_routes())
        .nest("/payments", payment_routes())
        .nest("/public", public_routes());

    let api = Router::new()
        .nest("/v1", v1)
        .layer(DefaultBodyLimit::max(API_BODY_LIMIT));

    if rate_limit {
        api.layer(api_rate_limiter())
    } else {
        api
    }
}

/// JSON fallback for unknown paths.
async fn not_found(OriginalUri(uri): OriginalUri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "status": "fail",
            "message": format!("Can't find {} on this server!", uri.path()),
        })),
    )
}

/// Build the complete application router.
pub fn app(state: AppState) -> Router {
    let config = state.config();
    let cors = cors_layer(config);
    let rate_limit = config.rate_limit;

    Router::new()
        .route("/health", get(public::health))
        .route("/health/ready", get(public::readiness))
        .route("/webhook/stripe", post(webhook::stripe))
        .nest("/api", api_routes(rate_limit))
        .fallback(not_found)
        .layer(cors)
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                    user_id = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}
