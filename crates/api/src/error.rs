//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//! Every error body is JSON: `{ "message": "..." }`.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::auth::{AuthError, TokenError};
use crate::services::license::{LicenseError, MemberAction};
use crate::services::payments::PaymentError;

const INTERNAL: &str = "Internal server error";
const EXTERNAL: &str = "External service error";

/// Application-level error type for the API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication or account operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// License operation failed.
    #[error("License error: {0}")]
    License(#[from] LicenseError),

    /// Payment or webhook operation failed.
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request body over the `/api` limit.
    #[error("Payload too large")]
    PayloadTooLarge,
}

impl AppError {
    /// Status code and client-facing message.
    fn parts(&self) -> (StatusCode, String) {
        match self {
            Self::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.to_string()),
            Self::Auth(err) => auth_parts(err),
            Self::License(err) => license_parts(err),
            Self::Payment(err) => payment_parts(err),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large".to_string(),
            ),
        }
    }
}

fn auth_parts(err: &AuthError) -> (StatusCode, String) {
    match err {
        AuthError::InvalidEmail(_) => (StatusCode::BAD_REQUEST, "Invalid email address".to_string()),
        AuthError::InvalidCredentials => {
            (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string())
        }
        AuthError::UserNotFound => (StatusCode::UNAUTHORIZED, "User not found".to_string()),
        AuthError::WeakPassword(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        AuthError::MissingField(msg) => (StatusCode::BAD_REQUEST, (*msg).to_string()),
        AuthError::IncorrectPassword => {
            (StatusCode::BAD_REQUEST, "Old password is incorrect".to_string())
        }
        AuthError::Token(TokenError::Missing) => (
            StatusCode::UNAUTHORIZED,
            "Refresh token not provided".to_string(),
        ),
        AuthError::Token(TokenError::Expired) => {
            (StatusCode::UNAUTHORIZED, "Refresh token expired".to_string())
        }
        AuthError::Token(TokenError::Invalid) => {
            (StatusCode::UNAUTHORIZED, "Invalid refresh token".to_string())
        }
        AuthError::Payment(_) => (StatusCode::BAD_GATEWAY, EXTERNAL.to_string()),
        AuthError::Notify(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to send email".to_string(),
        ),
        AuthError::Token(TokenError::Signing(_))
        | AuthError::Repository(_)
        | AuthError::PasswordHash => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.to_string()),
    }
}

fn license_parts(err: &LicenseError) -> (StatusCode, String) {
    let (status, message) = match err {
        LicenseError::InvalidType(_) => (
            StatusCode::BAD_REQUEST,
            "Invalid license type. Choose either 'individual' or 'team'.",
        ),
        LicenseError::NotFound => (
            StatusCode::NOT_FOUND,
            "We couldn't find the license you're looking for. Please double-check and try again.",
        ),
        LicenseError::NotTeam(MemberAction::Add) => (
            StatusCode::BAD_REQUEST,
            "Oops! It looks like this isn't a team license. Only team licenses can add members.",
        ),
        LicenseError::NotTeam(MemberAction::Remove) => (
            StatusCode::BAD_REQUEST,
            "Oops! It looks like this isn't a team license. Only team licenses can remove members.",
        ),
        LicenseError::NotOwner(MemberAction::Add) => (
            StatusCode::FORBIDDEN,
            "Oops! It looks like you don't have permission to add team members. Only the license owner can do that. If you think this is a mistake, please contact the license owner or our support team.",
        ),
        LicenseError::NotOwner(MemberAction::Remove) => (
            StatusCode::FORBIDDEN,
            "Oops! It looks like you don't have permission to remove team members. Only the license owner can do that. If you think this is a mistake, please contact our support team.",
        ),
        LicenseError::TeamFull => (
            StatusCode::BAD_REQUEST,
            "Your team is full! Consider upgrading your plan to add more members.",
        ),
        LicenseError::MemberNotFound(MemberAction::Add) => (
            StatusCode::NOT_FOUND,
            "We couldn't find a user with that email. Make sure the email is correct and the user has an account with us.",
        ),
        LicenseError::MemberNotFound(MemberAction::Remove) => (
            StatusCode::NOT_FOUND,
            "We couldn't find a user with that email. Make sure the email is correct.",
        ),
        LicenseError::AlreadyMember => (
            StatusCode::BAD_REQUEST,
            "Good news! This user is already part of your team.",
        ),
        LicenseError::OwnerImmutable => (
            StatusCode::BAD_REQUEST,
            "The license owner cannot be removed from the team.",
        ),
        LicenseError::NotMember => (
            StatusCode::BAD_REQUEST,
            "This user is not part of your team.",
        ),
        LicenseError::AccountNotFound => (
            StatusCode::NOT_FOUND,
            "We couldn't find your user account. Please try logging in again.",
        ),
        LicenseError::Repository(_) => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL),
    };
    (status, message.to_string())
}

fn payment_parts(err: &PaymentError) -> (StatusCode, String) {
    match err {
        PaymentError::MissingField(msg) => (StatusCode::BAD_REQUEST, (*msg).to_string()),
        PaymentError::InvalidSignature(reason) => {
            (StatusCode::BAD_REQUEST, format!("Webhook Error: {reason}"))
        }
        PaymentError::MalformedEvent(_) => (
            StatusCode::BAD_REQUEST,
            "Webhook Error: malformed event".to_string(),
        ),
        PaymentError::MissingEmail => (
            StatusCode::BAD_REQUEST,
            "Checkout session has no customer email".to_string(),
        ),
        PaymentError::InvalidProduct(_) => {
            (StatusCode::BAD_REQUEST, "Invalid product ID".to_string())
        }
        PaymentError::SessionInProgress => (
            StatusCode::CONFLICT,
            "Checkout session is being processed".to_string(),
        ),
        PaymentError::NotPaid => (StatusCode::BAD_REQUEST, "Payment not completed".to_string()),
        PaymentError::PaymentNotFound => (StatusCode::NOT_FOUND, "User not found".to_string()),
        PaymentError::LoginWindowExpired => (
            StatusCode::BAD_REQUEST,
            "Payment login window has expired".to_string(),
        ),
        PaymentError::Provider(_) => (StatusCode::BAD_GATEWAY, EXTERNAL.to_string()),
        PaymentError::Token(_) | PaymentError::PasswordHash | PaymentError::Repository(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.to_string())
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge
        } else {
            Self::BadRequest(rejection.body_text())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.parts();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        (status, Json(serde_json::json!({ "message": message }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("license", "Added team member", Some(&[("license_id", "12")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
