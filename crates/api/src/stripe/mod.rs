//! Stripe REST client and webhook verification.
//!
//! # APIs
//!
//! - `POST /v1/customers` - one customer per account
//! - `GET /v1/products/{id}` - resolve a product's default price
//! - `POST /v1/checkout/sessions` - hosted checkout for one product
//! - `GET /v1/checkout/sessions/{id}` - payment status after redirect
//!
//! Webhook deliveries are authenticated with [`webhook::verify_signature`]
//! before their payload is parsed.

mod client;
pub mod types;
pub mod webhook;

pub use client::StripeClient;
pub use types::*;

use async_trait::async_trait;
use thiserror::Error;

use insider_core::Email;

/// Errors that can occur when interacting with Stripe.
#[derive(Debug, Error)]
pub enum StripeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse a response or webhook payload.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Webhook signature missing, malformed, stale, or wrong.
    #[error("Invalid Stripe signature: {0}")]
    InvalidSignature(String),
}

/// Payment provider operations the services depend on.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a customer record and return its id.
    async fn create_customer(&self, email: &Email) -> Result<String, StripeError>;

    /// Start a hosted checkout for `product_id` and return the checkout URL.
    async fn create_checkout_session(
        &self,
        product_id: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<String, StripeError>;

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, StripeError>;
}
