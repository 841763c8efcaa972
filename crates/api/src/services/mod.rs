//! Business logic services.
//!
//! # Services
//!
//! - `auth` - Signup, signin, JWT tokens, password reset, credential settings
//! - `license` - Activation, listing, team roster changes
//! - `payments` - Checkout links, post-checkout login, webhook provisioning
//! - `notify` - Transactional email rendering and delivery
//!
//! Services borrow what they need from [`AppState`](crate::state::AppState)
//! for the length of one request.

pub mod auth;
pub mod license;
pub mod notify;
pub mod payments;
