//! Payment error types.

use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::auth::TokenError;
use crate::stripe::StripeError;

/// Errors that can occur while selling or provisioning licenses.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Required request field missing or blank.
    #[error("{0}")]
    MissingField(&'static str),

    /// Webhook signature header absent or not matching.
    #[error("invalid webhook signature: {0}")]
    InvalidSignature(String),

    /// Verified payload is not a usable event.
    #[error("malformed webhook event: {0}")]
    MalformedEvent(String),

    /// Completed checkout without a usable buyer email.
    #[error("checkout session has no customer email")]
    MissingEmail,

    /// Purchased product does not map to a license type.
    #[error("unknown product: {0}")]
    InvalidProduct(String),

    /// Another delivery of the same checkout session is provisioning it.
    #[error("checkout session is being processed")]
    SessionInProgress,

    /// Checkout session is not paid yet.
    #[error("payment not completed")]
    NotPaid,

    /// No stored payment carries the session id.
    #[error("payment not found")]
    PaymentNotFound,

    /// Post-checkout login attempted after the window closed.
    #[error("payment login window has expired")]
    LoginWindowExpired,

    /// Stripe call failed.
    #[error("payment provider error: {0}")]
    Provider(#[from] StripeError),

    /// Token signing failed.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}
