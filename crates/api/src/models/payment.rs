//! Payment domain types and the webhook provisioning contract.

use chrono::{DateTime, Utc};

use insider_core::{Email, LicenseId, LicenseType, PaymentId, UserId};

use super::{License, User};

/// A recorded checkout payment.
///
/// `session_id` is unique across all payments and is the idempotency key
/// for webhook provisioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    pub id: PaymentId,
    pub user_id: UserId,
    /// Amount in the currency's minor unit.
    pub amount: i64,
    pub currency: String,
    pub product_id: String,
    pub session_id: String,
    /// Flips false to true once, when the license is granted.
    pub is_paid: bool,
    pub license_id: Option<LicenseId>,
    pub paid_at: DateTime<Utc>,
}

/// Account material for a buyer with no existing user.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub password_hash: String,
    pub stripe_customer_id: String,
}

/// Everything needed to provision one paid checkout session.
#[derive(Debug, Clone)]
pub struct Purchase {
    pub email: Email,
    pub session_id: String,
    pub amount: i64,
    pub currency: String,
    pub product_id: String,
    pub license_type: LicenseType,
    pub max_team_size: i32,
    /// Start of the post-checkout login window.
    pub paid_at: DateTime<Utc>,
    /// Used only when no user with `email` exists at write time.
    pub new_account: Option<NewAccount>,
}

/// Outcome of provisioning a purchase.
#[derive(Debug, Clone)]
pub enum Provisioned {
    /// Payment recorded and license granted in one unit.
    Granted {
        user: User,
        license: License,
        /// True when this call inserted the user.
        account_created: bool,
    },
    /// The session was already recorded; nothing was written.
    Duplicate { payment: Payment },
}
