//! Authentication error types.

use thiserror::Error;

use super::tokens::TokenError;
use crate::db::RepositoryError;
use crate::services::notify::NotifyError;
use crate::stripe::StripeError;

/// Errors that can occur during authentication and account operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] insider_core::EmailError),

    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Token references a user that no longer exists.
    #[error("user not found")]
    UserNotFound,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Required request field missing or blank.
    #[error("{0}")]
    MissingField(&'static str),

    /// Current password did not match on a password change.
    #[error("current password is incorrect")]
    IncorrectPassword,

    /// Access or refresh token rejected.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Customer creation at the payment provider failed.
    #[error("payment provider error: {0}")]
    Payment(#[from] StripeError),

    /// Reset email could not be delivered.
    #[error("email delivery failed: {0}")]
    Notify(#[from] NotifyError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
