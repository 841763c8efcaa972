//! Authentication service.
//!
//! Password signup and signin, JWT access/refresh tokens, password reset,
//! and the account settings that touch credentials.

mod error;
pub mod tokens;

pub use error::AuthError;
pub use tokens::{Claims, TokenError, TokenPair};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::seq::IndexedRandom;
use tracing::instrument;

use insider_core::{Email, UserId};

use crate::config::TokenConfig;
use crate::db::{NewUser, RepositoryError, Store};
use crate::models::User;
use crate::services::notify::Notifier;
use crate::stripe::PaymentGateway;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Length of generated temporary passwords.
pub const TEMP_PASSWORD_LENGTH: usize = 12;

const TEMP_PASSWORD_CHARSET: &[u8] =
    b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz23456789!@#$%^*";

/// An authenticated user and a fresh token pair.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub tokens: TokenPair,
}

/// Result of a signup attempt.
#[derive(Debug, Clone)]
pub enum SignupOutcome {
    Created(Session),
    /// Email already registered; nothing was written.
    AlreadyExists,
}

/// Authentication service.
pub struct AuthService<'a> {
    store: &'a dyn Store,
    gateway: &'a dyn PaymentGateway,
    notifier: Notifier<'a>,
    tokens: &'a TokenConfig,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub fn new(
        store: &'a dyn Store,
        gateway: &'a dyn PaymentGateway,
        notifier: Notifier<'a>,
        tokens: &'a TokenConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            tokens,
        }
    }

    // =========================================================================
    // Password Authentication
    // =========================================================================

    /// Register a new user with email and password.
    ///
    /// Creates the payment-provider customer first; registering the mail
    /// contact is best-effort.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::Payment` if the customer cannot be created.
    #[instrument(skip(self, password))]
    pub async fn signup(&self, email: &str, password: &str) -> Result<SignupOutcome, AuthError> {
        let email = Email::parse(email)?;
        validate_password(password)?;

        if self.store.get_user_by_email(&email).await?.is_some() {
            return Ok(SignupOutcome::AlreadyExists);
        }

        let password_hash = hash_password(password)?;
        let stripe_customer_id = self.gateway.create_customer(&email).await?;
        self.notifier.register_contact(&email).await;

        let user = match self
            .store
            .create_user(NewUser {
                email,
                password_hash,
                stripe_customer_id,
            })
            .await
        {
            Ok(user) => user,
            // Lost a race with a concurrent signup for the same address.
            Err(RepositoryError::Conflict(_)) => return Ok(SignupOutcome::AlreadyExists),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(user_id = %user.id, "User signed up");
        let tokens = tokens::issue_pair(self.tokens, user.id)?;
        Ok(SignupOutcome::Created(Session { user, tokens }))
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` for an unknown email, a
    /// malformed email, or a wrong password alike.
    #[instrument(skip(self, password))]
    pub async fn signin(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let (user, password_hash) = self
            .store
            .get_credentials(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &password_hash)?;

        let tokens = tokens::issue_pair(self.tokens, user.id)?;
        Ok(Session { user, tokens })
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Token` if the token is absent, expired, or invalid.
    /// Returns `AuthError::UserNotFound` if its user no longer exists.
    pub async fn refresh(&self, refresh_token: Option<&str>) -> Result<(User, String), AuthError> {
        let token = refresh_token
            .filter(|t| !t.is_empty())
            .ok_or(TokenError::Missing)?;
        let claims = tokens::verify_refresh(self.tokens, token)?;

        let user = self
            .store
            .get_user(claims.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let access = tokens::issue_access(self.tokens, user.id)?;
        Ok((user, access))
    }

    /// Resolve a bearer access token to its user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Token` if the token is expired or invalid.
    /// Returns `AuthError::UserNotFound` if its user no longer exists.
    pub async fn authenticate(&self, access_token: &str) -> Result<User, AuthError> {
        let claims = tokens::verify_access(self.tokens, access_token)?;

        self.store
            .get_user(claims.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Replace the password of the account at `email` with a generated one
    /// and mail it.
    ///
    /// Unknown and malformed addresses succeed silently.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Notify` if the email cannot be sent; the new
    /// password is already stored at that point.
    #[instrument(skip(self))]
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let Ok(email) = Email::parse(email) else {
            return Ok(());
        };
        let Some(user) = self.store.get_user_by_email(&email).await? else {
            tracing::debug!("Password reset for unknown email");
            return Ok(());
        };

        let temp_password = generate_temp_password();
        let hash = hash_password(&temp_password)?;
        self.store.set_password_hash(user.id, &hash).await?;

        self.notifier
            .password_reset(&user.email, &temp_password)
            .await?;

        tracing::info!(user_id = %user.id, "Temporary password issued");
        Ok(())
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Change the password after checking the current one.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MissingField` if either password is blank.
    /// Returns `AuthError::IncorrectPassword` if `current` does not match.
    /// Returns `AuthError::WeakPassword` if `new` is too short.
    #[instrument(skip(self, current, new))]
    pub async fn update_password(
        &self,
        user_id: UserId,
        current: &str,
        new: &str,
    ) -> Result<(), AuthError> {
        if current.is_empty() || new.is_empty() {
            return Err(AuthError::MissingField(
                "Old and new passwords are required",
            ));
        }

        let stored = self
            .store
            .get_password_hash(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        verify_password(current, &stored).map_err(|_| AuthError::IncorrectPassword)?;

        validate_password(new)?;
        let hash = hash_password(new)?;
        self.store.set_password_hash(user_id, &hash).await?;

        tracing::info!(user_id = %user_id, "Password updated");
        Ok(())
    }

    /// Set the display name.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MissingField` if `name` is blank.
    pub async fn update_name(&self, user_id: UserId, name: &str) -> Result<User, AuthError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthError::MissingField("Name is required"));
        }

        self.store
            .set_name(user_id, name)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => AuthError::UserNotFound,
                other => AuthError::Repository(other),
            })
    }
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Hash a password using Argon2id.
pub(crate) fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

/// Random password for accounts created or reset on the user's behalf.
pub(crate) fn generate_temp_password() -> String {
    let mut rng = rand::rng();
    std::iter::repeat_with(|| TEMP_PASSWORD_CHARSET.choose(&mut rng).copied())
        .flatten()
        .take(TEMP_PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}
