//! Storage for accounts, licenses, and payments.
//!
//! # Database: `insider`
//!
//! ## Tables
//!
//! - `user` - Accounts and password hashes
//! - `license` - Licenses with type, owner, and capacity
//! - `license_member` - Roster rows, owner included; the only membership record
//! - `payment` - Checkout payments keyed by unique Stripe session id
//! - `checkout_claim` - Webhook deliveries currently provisioning a session
//!
//! # Migrations
//!
//! Migrations are stored in `crates/api/migrations/` and run via:
//! ```bash
//! cargo run -p insider-cli -- migrate
//! ```
//!
//! # Backends
//!
//! [`Store`] is implemented by [`PgStore`] for production and by
//! [`MemoryStore`] for tests and local experiments. Both give the same
//! answers for the same sequence of calls.

pub mod memory;
pub mod postgres;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use insider_core::{Email, LicenseId, LicenseType, UserId};

use crate::models::{License, MembershipOutcome, Payment, Provisioned, Purchase, User};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Shared handle to a storage backend.
pub type DynStore = Arc<dyn Store>;

/// Fields for a user created through signup.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: Email,
    pub password_hash: String,
    pub stripe_customer_id: String,
}

/// Storage backend.
///
/// Implementations must be thread-safe (`Send + Sync`); every request
/// handler holds the same instance. Roster mutations and purchase
/// provisioning are atomic: preconditions are re-checked at write time.
#[async_trait]
pub trait Store: Send + Sync {
    /// Round-trip to the backend, used by the readiness probe.
    async fn ping(&self) -> Result<(), RepositoryError>;

    // -- users ---------------------------------------------------------------

    /// Insert a user. `Conflict` if the email is taken.
    async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    async fn get_user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;

    /// Users for the given ids, in the order given; unknown ids are skipped.
    async fn get_users(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError>;

    /// User and password hash by email, for credential checks.
    async fn get_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError>;

    async fn get_password_hash(&self, id: UserId) -> Result<Option<String>, RepositoryError>;

    /// `NotFound` if the user does not exist.
    async fn set_password_hash(&self, id: UserId, hash: &str) -> Result<(), RepositoryError>;

    /// `NotFound` if the user does not exist.
    async fn set_name(&self, id: UserId, name: &str) -> Result<User, RepositoryError>;

    // -- licenses ------------------------------------------------------------

    /// Insert a license with `owner` as its first roster entry.
    async fn create_license(
        &self,
        owner: UserId,
        license_type: LicenseType,
        max_team_size: i32,
    ) -> Result<License, RepositoryError>;

    async fn get_license(&self, id: LicenseId) -> Result<Option<License>, RepositoryError>;

    /// Every license whose roster contains `user`, newest first.
    async fn licenses_for_user(&self, user: UserId) -> Result<Vec<License>, RepositoryError>;

    /// Add `member` to the roster if `owner` owns the team license, it has
    /// a free seat, and `member` is not on it.
    async fn add_member(
        &self,
        license: LicenseId,
        owner: UserId,
        member: UserId,
    ) -> Result<MembershipOutcome, RepositoryError>;

    /// Drop `member` from the roster if `owner` owns the team license and
    /// `member` is a non-owner entry on it.
    async fn remove_member(
        &self,
        license: LicenseId,
        owner: UserId,
        member: UserId,
    ) -> Result<MembershipOutcome, RepositoryError>;

    // -- payments ------------------------------------------------------------

    async fn get_payment_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<Payment>, RepositoryError>;

    async fn payments_for_user(&self, user: UserId) -> Result<Vec<Payment>, RepositoryError>;

    /// Reserve `session_id` for one webhook delivery.
    ///
    /// Returns `false` while another delivery holds a claim taken at or after
    /// `stale_before`. Older claims are taken over.
    async fn claim_checkout_session(
        &self,
        session_id: &str,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Drop the claim on `session_id` so a retry can take it.
    async fn release_checkout_session(&self, session_id: &str) -> Result<(), RepositoryError>;

    /// Record the payment, create the user if needed, grant the license, and
    /// mark the payment paid, all as one unit keyed by `purchase.session_id`.
    ///
    /// A session that is already recorded yields `Duplicate` and writes
    /// nothing.
    async fn provision_purchase(&self, purchase: &Purchase)
    -> Result<Provisioned, RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
