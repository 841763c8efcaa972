//! In-process stand-ins for the payment and mail providers.
//!
//! Compiled for unit tests and, with the `test-support` feature, for the
//! integration test crate.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use secrecy::SecretString;

use insider_core::Email;

use crate::config::{
    ApiConfig, Environment, LicensePolicy, MailjetConfig, StripeConfig, TokenConfig,
};
use crate::mailjet::{MailjetError, Mailer, OutgoingEmail};
use crate::stripe::{CheckoutSession, CustomerDetails, PaymentGateway, StripeError};

/// Token configuration with fixed, distinct secrets.
#[must_use]
pub fn token_config() -> TokenConfig {
    TokenConfig {
        access_secret: SecretString::from("a7Kq9vLx2mPz4RtY8wNc3bHf6JdGs1Ue"),
        refresh_secret: SecretString::from("Zp5Wn8Qr2Tx6Lv9Bk3Hm7Jc4Fd1Gs0Ya"),
        access_ttl: Duration::from_secs(3600),
        refresh_ttl: Duration::from_secs(604_800),
    }
}

pub const INDIVIDUAL_PRODUCT: &str = "prod_individual";
pub const TEAM_PRODUCT: &str = "prod_team";
pub const WEBHOOK_SECRET: &str = "whsec_7f3a9c2e1b5d4f60";
pub const FRONTEND_URL: &str = "http://localhost:3000";

/// Complete configuration pointing at nothing real. Rate limiting is off.
///
/// # Panics
///
/// Never: [`FRONTEND_URL`] is a valid URL.
#[must_use]
pub fn api_config() -> ApiConfig {
    ApiConfig {
        database_url: SecretString::from("postgres://localhost/insider_test"),
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        environment: Environment::Development,
        frontend_url: url::Url::parse(FRONTEND_URL).expect("valid frontend url"),
        dev_origin: FRONTEND_URL.to_string(),
        tokens: token_config(),
        stripe: StripeConfig {
            secret_key: SecretString::from("sk_test_unused"),
            webhook_secret: SecretString::from(WEBHOOK_SECRET),
            individual_product_id: INDIVIDUAL_PRODUCT.to_string(),
            team_product_id: TEAM_PRODUCT.to_string(),
        },
        mailjet: MailjetConfig {
            api_key: "mj_key".to_string(),
            api_secret: SecretString::from("mj_secret"),
            from_email: "hello@uibeats.com".to_string(),
            from_name: "ui/beats".to_string(),
        },
        licenses: LicensePolicy::default(),
        rate_limit: false,
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// Records customers and serves checkout sessions registered by the test.
#[derive(Default)]
pub struct FakeGateway {
    customers: Mutex<Vec<String>>,
    sessions: Mutex<HashMap<String, CheckoutSession>>,
    fail_customers: AtomicBool,
}

impl FakeGateway {
    /// Emails customers were created for, in order.
    #[must_use]
    pub fn customers(&self) -> Vec<String> {
        self.customers.lock().clone()
    }

    /// Make `create_customer` fail.
    pub fn fail_customers(&self, fail: bool) {
        self.fail_customers.store(fail, Ordering::SeqCst);
    }

    /// Register a session that `retrieve_checkout_session` will return.
    pub fn put_session(&self, session: CheckoutSession) {
        self.sessions.lock().insert(session.id.clone(), session);
    }
}

/// A checkout session as the provider reports it after payment.
#[must_use]
pub fn checkout_session(id: &str, email: &str, product_id: &str, paid: bool) -> CheckoutSession {
    CheckoutSession {
        id: id.to_string(),
        url: None,
        payment_status: if paid { "paid" } else { "unpaid" }.to_string(),
        amount_total: Some(4900),
        currency: Some("usd".to_string()),
        customer_details: Some(CustomerDetails {
            email: Some(email.to_string()),
        }),
        metadata: HashMap::from([("productId".to_string(), product_id.to_string())]),
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_customer(&self, email: &Email) -> Result<String, StripeError> {
        // Suspend like a network call so concurrent callers interleave here.
        tokio::task::yield_now().await;
        if self.fail_customers.load(Ordering::SeqCst) {
            return Err(StripeError::Api {
                status: 500,
                message: "customer creation disabled".to_string(),
            });
        }
        let mut customers = self.customers.lock();
        customers.push(email.as_str().to_string());
        Ok(format!("cus_test_{}", customers.len()))
    }

    async fn create_checkout_session(
        &self,
        product_id: &str,
        _success_url: &str,
        _cancel_url: &str,
    ) -> Result<String, StripeError> {
        Ok(format!("https://checkout.stripe.test/{product_id}"))
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, StripeError> {
        self.sessions
            .lock()
            .get(session_id)
            .cloned()
            .ok_or_else(|| StripeError::Api {
                status: 404,
                message: format!("No such checkout.session: {session_id}"),
            })
    }
}

/// Records contacts and outgoing mail.
#[derive(Default)]
pub struct FakeMailer {
    contacts: Mutex<Vec<String>>,
    sent: Mutex<Vec<OutgoingEmail>>,
    fail_sends: AtomicBool,
}

impl FakeMailer {
    #[must_use]
    pub fn contacts(&self) -> Vec<String> {
        self.contacts.lock().clone()
    }

    #[must_use]
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().clone()
    }

    /// Messages sent to `to`.
    #[must_use]
    pub fn sent_to(&self, to: &str) -> Vec<OutgoingEmail> {
        self.sent.lock().iter().filter(|m| m.to == to).cloned().collect()
    }

    /// Make `send` fail.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// The temporary password carried by the most recent message, if any.
    #[must_use]
    pub fn last_temp_password(&self) -> Option<String> {
        let sent = self.sent.lock();
        let html = &sent.last()?.html;
        let start = html.find("monospace")?;
        let open = start + html.get(start..)?.find('>')? + 1;
        let close = open + html.get(open..)?.find("</p>")?;
        html.get(open..close).map(str::to_string)
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn add_contact(&self, email: &str) -> Result<(), MailjetError> {
        self.contacts.lock().push(email.to_string());
        Ok(())
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailjetError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(MailjetError::Api {
                status: 503,
                message: "delivery disabled".to_string(),
            });
        }
        self.sent.lock().push(email.clone());
        Ok(())
    }
}
