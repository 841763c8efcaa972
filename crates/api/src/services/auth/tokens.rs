//! Signed access and refresh tokens (HS256 JWT).
//!
//! Access and refresh tokens use independent secrets, so one can never be
//! replayed as the other.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use insider_core::UserId;

use crate::config::TokenConfig;

/// Token validation failures.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token missing")]
    Missing,

    #[error("token expired")]
    Expired,

    #[error("token invalid")]
    Invalid,

    #[error("token signing failed: {0}")]
    Signing(String),
}

/// JWT payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: UserId,
    pub iat: i64,
    pub exp: i64,
}

/// An access token plus the refresh token that renews it.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
    pub refresh_ttl: Duration,
}

/// Issue an access token for `user_id`.
///
/// # Errors
///
/// Returns `TokenError::Signing` if encoding fails.
pub fn issue_access(config: &TokenConfig, user_id: UserId) -> Result<String, TokenError> {
    sign(&config.access_secret, user_id, config.access_ttl)
}

/// Issue a refresh token for `user_id` valid for `ttl`.
///
/// # Errors
///
/// Returns `TokenError::Signing` if encoding fails.
pub fn issue_refresh(
    config: &TokenConfig,
    user_id: UserId,
    ttl: Duration,
) -> Result<String, TokenError> {
    sign(&config.refresh_secret, user_id, ttl)
}

/// Issue an access token and a refresh token with the configured lifetimes.
///
/// # Errors
///
/// Returns `TokenError::Signing` if encoding fails.
pub fn issue_pair(config: &TokenConfig, user_id: UserId) -> Result<TokenPair, TokenError> {
    Ok(TokenPair {
        access: issue_access(config, user_id)?,
        refresh: issue_refresh(config, user_id, config.refresh_ttl)?,
        refresh_ttl: config.refresh_ttl,
    })
}

/// Validate an access token.
///
/// # Errors
///
/// Returns `TokenError::Expired` or `TokenError::Invalid`.
pub fn verify_access(config: &TokenConfig, token: &str) -> Result<Claims, TokenError> {
    verify(&config.access_secret, token)
}

/// Validate a refresh token.
///
/// # Errors
///
/// Returns `TokenError::Expired` or `TokenError::Invalid`.
pub fn verify_refresh(config: &TokenConfig, token: &str) -> Result<Claims, TokenError> {
    verify(&config.refresh_secret, token)
}

fn sign(secret: &SecretString, user_id: UserId, ttl: Duration) -> Result<String, TokenError> {
    let now = Utc::now().timestamp();
    let ttl = i64::try_from(ttl.as_secs()).map_err(|e| TokenError::Signing(e.to_string()))?;
    let claims = Claims {
        user_id,
        iat: now,
        exp: now + ttl,
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.expose_secret().as_bytes()),
    )
    .map_err(|e| TokenError::Signing(e.to_string()))
}

fn verify(secret: &SecretString, token: &str) -> Result<Claims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.expose_secret().as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Invalid,
    })
}
