//! User domain types.

use chrono::{DateTime, Utc};

use insider_core::{Email, UserId};

/// An account (domain type).
///
/// The password hash is never part of this type; it is read separately
/// through the store when a credential check needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Login email, unique across users.
    pub email: Email,
    /// Display name, unset until the user picks one.
    pub name: Option<String>,
    /// Stripe customer reference. Immutable after creation.
    pub stripe_customer_id: String,
    /// Not enforced by any gate yet.
    pub is_verified: bool,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}
