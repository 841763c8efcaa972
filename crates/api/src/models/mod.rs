//! Domain models for the license backend.
//!
//! These types represent validated domain objects separate from database row types.

pub mod license;
pub mod payment;
pub mod user;

pub use license::{License, MembershipOutcome};
pub use payment::{NewAccount, Payment, Provisioned, Purchase};
pub use user::User;
