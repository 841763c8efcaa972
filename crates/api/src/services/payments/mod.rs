//! Payment service.
//!
//! Hosted checkout links, the post-checkout login, and provisioning of
//! accounts and licenses from Stripe webhooks.

mod error;
mod webhook;

pub use error::PaymentError;
pub use webhook::WebhookOutcome;

use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tracing::instrument;

use crate::config::ApiConfig;
use crate::db::Store;
use crate::models::User;
use crate::services::auth::{TokenPair, tokens};
use crate::services::notify::Notifier;
use crate::stripe::PaymentGateway;

/// Hours after payment during which the checkout success page may log the
/// buyer in.
pub const LOGIN_WINDOW_HOURS: i64 = 24;

/// Lifetime of the refresh token issued by the post-checkout login.
pub const CHECKOUT_REFRESH_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Payment service.
pub struct PaymentService<'a> {
    store: &'a dyn Store,
    gateway: &'a dyn PaymentGateway,
    notifier: Notifier<'a>,
    config: &'a ApiConfig,
}

impl<'a> PaymentService<'a> {
    #[must_use]
    pub fn new(
        store: &'a dyn Store,
        gateway: &'a dyn PaymentGateway,
        notifier: Notifier<'a>,
        config: &'a ApiConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            config,
        }
    }

    /// Start a hosted checkout for `product_id` and return its URL.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::MissingField` for a blank product id.
    /// Returns `PaymentError::Provider` if Stripe rejects the request.
    #[instrument(skip(self))]
    pub async fn create_payment_link(&self, product_id: &str) -> Result<String, PaymentError> {
        if product_id.trim().is_empty() {
            return Err(PaymentError::MissingField("Product ID is required"));
        }

        let success_url = self
            .config
            .frontend_link("/payment/success?session_id={CHECKOUT_SESSION_ID}");
        let cancel_url = self.config.frontend_link("/payment/cancelled");

        let url = self
            .gateway
            .create_checkout_session(product_id, &success_url, &cancel_url)
            .await?;
        Ok(url)
    }

    /// Log the buyer in from the checkout success page.
    ///
    /// The refresh token lives for [`CHECKOUT_REFRESH_TTL`].
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::NotPaid` if Stripe does not report the session paid.
    /// Returns `PaymentError::PaymentNotFound` if the webhook has not stored it.
    /// Returns `PaymentError::LoginWindowExpired` if it is older than [`LOGIN_WINDOW_HOURS`].
    #[instrument(skip(self))]
    pub async fn verify_payment(&self, session_id: &str) -> Result<(User, TokenPair), PaymentError> {
        if session_id.trim().is_empty() {
            return Err(PaymentError::MissingField("Session ID is required"));
        }

        let session = self.gateway.retrieve_checkout_session(session_id).await?;
        if !session.is_paid() {
            return Err(PaymentError::NotPaid);
        }

        let payment = self
            .store
            .get_payment_by_session(session_id)
            .await?
            .ok_or(PaymentError::PaymentNotFound)?;

        if Utc::now() - payment.paid_at > TimeDelta::hours(LOGIN_WINDOW_HOURS) {
            return Err(PaymentError::LoginWindowExpired);
        }

        let user = self
            .store
            .get_user(payment.user_id)
            .await?
            .ok_or(PaymentError::PaymentNotFound)?;

        let tokens = TokenPair {
            access: tokens::issue_access(&self.config.tokens, user.id)?,
            refresh: tokens::issue_refresh(&self.config.tokens, user.id, CHECKOUT_REFRESH_TTL)?,
            refresh_ttl: CHECKOUT_REFRESH_TTL,
        };

        tracing::info!(user_id = %user.id, "Post-checkout login");
        Ok((user, tokens))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::db::MemoryStore;
    use crate::testing::{FakeGateway, FakeMailer, api_config, checkout_session};

    pub use crate::testing::{INDIVIDUAL_PRODUCT, TEAM_PRODUCT, WEBHOOK_SECRET};

    pub struct Harness {
        pub store: MemoryStore,
        pub gateway: FakeGateway,
        pub mailer: FakeMailer,
        pub config: ApiConfig,
    }

    impl Harness {
        pub fn new() -> Self {
            Self {
                store: MemoryStore::new(),
                gateway: FakeGateway::default(),
                mailer: FakeMailer::default(),
                config: api_config(),
            }
        }

        pub fn payments(&self) -> PaymentService<'_> {
            PaymentService::new(
                &self.store,
                &self.gateway,
                Notifier::new(&self.mailer, self.config.frontend_link("/signin")),
                &self.config,
            )
        }
    }

    #[tokio::test]
    async fn test_create_payment_link() {
        let h = Harness::new();
        let url = h.payments().create_payment_link(TEAM_PRODUCT).await.unwrap();
        assert_eq!(url, "https://checkout.stripe.test/prod_team");

        assert!(matches!(
            h.payments().create_payment_link("  ").await,
            Err(PaymentError::MissingField("Product ID is required"))
        ));
    }

    #[tokio::test]
    async fn test_verify_payment_before_webhook() {
        let h = Harness::new();
        h.gateway
            .put_session(checkout_session("cs_1", "buyer@x.com", TEAM_PRODUCT, true));
        assert!(matches!(
            h.payments().verify_payment("cs_1").await,
            Err(PaymentError::PaymentNotFound)
        ));
    }

    #[tokio::test]
    async fn test_verify_unpaid_session() {
        let h = Harness::new();
        h.gateway
            .put_session(checkout_session("cs_1", "buyer@x.com", TEAM_PRODUCT, false));
        assert!(matches!(
            h.payments().verify_payment("cs_1").await,
            Err(PaymentError::NotPaid)
        ));
        assert!(matches!(
            h.payments().verify_payment("").await,
            Err(PaymentError::MissingField("Session ID is required"))
        ));
    }
}
