//! Core types for Insider.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod license;

pub use email::{Email, EmailError};
pub use id::*;
pub use license::{LicenseType, LicenseTypeError};
