//! License management commands.
//!
//! # Usage
//!
//! ```bash
//! insider-cli license grant -e buyer@example.com -t team
//! ```
//!
//! The account must already exist. The license is created exactly as the
//! API's activate endpoint would: the account owns it and is its first member.

use insider_api::config::{ConfigError, LicensePolicy, database_url_from_env};
use insider_api::db::{PgStore, RepositoryError, Store, create_pool};
use insider_core::{Email, EmailError, LicenseId, LicenseType};
use thiserror::Error;

/// Errors that can occur while granting a license.
#[derive(Debug, Error)]
pub enum LicenseCommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    #[error("Invalid license type: {0}. Valid types: individual, team")]
    InvalidType(String),

    #[error("No account with email: {0}")]
    UnknownAccount(String),
}

/// Grant a license of `license_type` to the account at `email`.
///
/// # Errors
///
/// Returns an error for an unknown type or account, or on storage failure.
pub async fn grant(email: &str, license_type: &str) -> Result<LicenseId, LicenseCommandError> {
    dotenvy::dotenv().ok();

    let license_type: LicenseType = license_type
        .parse()
        .map_err(|_| LicenseCommandError::InvalidType(license_type.to_owned()))?;
    let email = Email::parse(email)?;
    let policy = LicensePolicy::from_env()?;
    let database_url = database_url_from_env()?;

    tracing::info!("Connecting to database...");
    let store = PgStore::new(create_pool(&database_url).await?);

    let owner = store
        .get_user_by_email(&email)
        .await?
        .ok_or_else(|| LicenseCommandError::UnknownAccount(email.to_string()))?;

    let license = store
        .create_license(owner.id, license_type, policy.max_size_for(license_type))
        .await?;

    tracing::info!(
        license_id = %license.id,
        user_id = %owner.id,
        %license_type,
        "License granted"
    );
    Ok(license.id)
}
