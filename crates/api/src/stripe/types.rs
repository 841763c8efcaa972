//! Stripe API object types (only the fields this crate reads).

use std::collections::HashMap;

use serde::Deserialize;

/// Value of `payment_status` once the buyer has paid.
pub const PAYMENT_STATUS_PAID: &str = "paid";

/// Event type that provisions a license.
pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

/// A Stripe customer.
#[derive(Debug, Clone, Deserialize)]
pub struct Customer {
    pub id: String,
}

/// A Stripe product.
#[derive(Debug, Clone, Deserialize)]
pub struct Product {
    pub id: String,
    pub default_price: Option<String>,
}

/// Buyer details captured by checkout.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerDetails {
    pub email: Option<String>,
}

/// A Checkout Session.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    pub payment_status: String,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.payment_status == PAYMENT_STATUS_PAID
    }

    #[must_use]
    pub fn customer_email(&self) -> Option<&str> {
        self.customer_details
            .as_ref()
            .and_then(|d| d.email.as_deref())
    }

    /// Product id stamped into metadata when the session was created.
    #[must_use]
    pub fn product_id(&self) -> Option<&str> {
        self.metadata.get("productId").map(String::as_str)
    }
}

/// A webhook event envelope. `data.object` is decoded per event type.
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

/// Error body returned by the Stripe API.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
}
