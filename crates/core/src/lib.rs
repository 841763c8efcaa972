//! Insider Core - Shared domain types.
//!
//! This crate provides the types used across all Insider components:
//! - `api` - License backend HTTP server
//! - `cli` - Command-line tools for migrations and license operations
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, emails, and license types

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
