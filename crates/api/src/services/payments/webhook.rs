//! Stripe webhook ingestion.
//!
//! A completed, paid checkout provisions exactly one license per checkout
//! session. The session id is the idempotency key: a redelivery finds the
//! stored payment and changes nothing. A delivery claims the session before
//! it calls Stripe or Mailjet, so an overlapping redelivery backs off with
//! `SessionInProgress` instead of creating a second customer.

use chrono::{Duration, Utc};
use secrecy::ExposeSecret;
use tracing::instrument;

use insider_core::{Email, LicenseType};

use super::{PaymentError, PaymentService};
use crate::models::{NewAccount, Provisioned, Purchase};
use crate::services::auth::{generate_temp_password, hash_password};
use crate::stripe::{self, CHECKOUT_SESSION_COMPLETED, CheckoutSession, StripeError};

/// How long a claim blocks other deliveries before it counts as abandoned.
const CLAIM_TTL: Duration = Duration::minutes(10);

/// What a delivery did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Event type or payment state this service does not act on.
    Ignored,
    /// Session already provisioned by an earlier delivery.
    Duplicate,
    /// License granted; `account_created` when the buyer was new.
    Provisioned { account_created: bool },
}

impl PaymentService<'_> {
    /// Verify and process one webhook delivery.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::InvalidSignature` before touching any state if
    /// the signature is absent or wrong. Returns `PaymentError::MissingEmail`
    /// or `PaymentError::InvalidProduct` before any write for unusable
    /// sessions. Other errors are transient and safe to retry.
    #[instrument(skip_all)]
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, PaymentError> {
        let signature = signature
            .ok_or_else(|| PaymentError::InvalidSignature("missing signature header".to_string()))?;
        stripe::webhook::verify_signature(
            payload,
            signature,
            self.config.stripe.webhook_secret.expose_secret(),
            Utc::now().timestamp(),
        )
        .map_err(|e| match e {
            StripeError::InvalidSignature(reason) => PaymentError::InvalidSignature(reason),
            other => PaymentError::InvalidSignature(other.to_string()),
        })?;

        let event = stripe::webhook::parse_event(payload)
            .map_err(|e| PaymentError::MalformedEvent(e.to_string()))?;
        tracing::info!(event_id = %event.id, event_type = %event.event_type, "Webhook received");

        if event.event_type != CHECKOUT_SESSION_COMPLETED {
            return Ok(WebhookOutcome::Ignored);
        }
        let session: CheckoutSession = serde_json::from_value(event.data.object)
            .map_err(|e| PaymentError::MalformedEvent(e.to_string()))?;
        if !session.is_paid() {
            return Ok(WebhookOutcome::Ignored);
        }

        self.provision(&session).await
    }

    async fn provision(&self, session: &CheckoutSession) -> Result<WebhookOutcome, PaymentError> {
        let email = session
            .customer_email()
            .and_then(|e| Email::parse(e).ok())
            .ok_or(PaymentError::MissingEmail)?;

        let product_id = session.product_id().unwrap_or_default();
        let license_type = self
            .config
            .stripe
            .license_type_for(product_id)
            .ok_or_else(|| PaymentError::InvalidProduct(product_id.to_string()))?;

        if self.store.get_payment_by_session(&session.id).await?.is_some() {
            tracing::info!(session_id = %session.id, "Checkout session already provisioned");
            return Ok(WebhookOutcome::Duplicate);
        }

        if !self
            .store
            .claim_checkout_session(&session.id, Utc::now() - CLAIM_TTL)
            .await?
        {
            if self.store.get_payment_by_session(&session.id).await?.is_some() {
                return Ok(WebhookOutcome::Duplicate);
            }
            tracing::info!(session_id = %session.id, "Checkout session claimed by another delivery");
            return Err(PaymentError::SessionInProgress);
        }

        let result = self
            .provision_claimed(session, email, product_id, license_type)
            .await;
        if result.is_err() {
            self.release_claim(&session.id).await;
        }
        result
    }

    /// Let the provider's retry take the session again. A claim that cannot
    /// be dropped expires after `CLAIM_TTL`.
    async fn release_claim(&self, session_id: &str) {
        if let Err(e) = self.store.release_checkout_session(session_id).await {
            tracing::warn!(session_id, error = %e, "Failed to release checkout claim");
        }
    }

    async fn provision_claimed(
        &self,
        session: &CheckoutSession,
        email: Email,
        product_id: &str,
        license_type: LicenseType,
    ) -> Result<WebhookOutcome, PaymentError> {
        // New buyers get an account with a generated password.
        let mut temp_password = None;
        let new_account = if self.store.get_user_by_email(&email).await?.is_some() {
            None
        } else {
            let password = generate_temp_password();
            let password_hash =
                hash_password(&password).map_err(|_| PaymentError::PasswordHash)?;
            let stripe_customer_id = self.gateway.create_customer(&email).await?;
            self.notifier.register_contact(&email).await;
            temp_password = Some(password);
            Some(NewAccount {
                password_hash,
                stripe_customer_id,
            })
        };

        let purchase = Purchase {
            email,
            session_id: session.id.clone(),
            amount: session.amount_total.unwrap_or_default(),
            currency: session.currency.clone().unwrap_or_default(),
            product_id: product_id.to_string(),
            license_type,
            max_team_size: self.config.licenses.max_size_for(license_type),
            paid_at: Utc::now(),
            new_account,
        };

        match self.store.provision_purchase(&purchase).await? {
            Provisioned::Duplicate { .. } => {
                tracing::info!(session_id = %session.id, "Checkout session provisioned concurrently");
                Ok(WebhookOutcome::Duplicate)
            }
            Provisioned::Granted {
                user,
                license,
                account_created,
            } => {
                tracing::info!(
                    user_id = %user.id,
                    license_id = %license.id,
                    %license_type,
                    account_created,
                    "License provisioned"
                );

                let sent = match (account_created, temp_password.as_deref()) {
                    (true, Some(password)) => {
                        self.notifier.welcome_new_account(&user.email, password).await
                    }
                    _ => self.notifier.welcome_back(&user.email).await,
                };
                if let Err(e) = sent {
                    tracing::warn!(error = %e, "Failed to send purchase email");
                }

                Ok(WebhookOutcome::Provisioned { account_created })
            }
        }
    }
}
