//! Insider license backend library.
//!
//! Accounts with JWT sessions, Stripe checkout with webhook provisioning,
//! and team licenses with a capped roster. The binary in `main.rs` wires
//! this library to `PostgreSQL`, Stripe and Mailjet; tests wire it to
//! in-memory fakes.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod mailjet;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod stripe;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use routes::app;
