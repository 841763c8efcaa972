//! Stripe REST client.

use async_trait::async_trait;
use reqwest::Response;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::instrument;

use insider_core::Email;

use super::types::{ApiErrorBody, CheckoutSession, Customer, Product};
use super::{PaymentGateway, StripeError};
use crate::config::StripeConfig;

/// Stripe API base URL.
const BASE_URL: &str = "https://api.stripe.com/v1";

/// Stripe API client (form-encoded requests, bearer auth).
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    secret_key: SecretString,
    base_url: String,
}

impl StripeClient {
    /// Create a new Stripe API client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &StripeConfig) -> Result<Self, StripeError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            secret_key: config.secret_key.clone(),
            base_url: BASE_URL.to_string(),
        })
    }

    /// Fetch a product.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails.
    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: &str) -> Result<Product, StripeError> {
        let response = self
            .client
            .get(format!("{}/products/{product_id}", self.base_url))
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await?;

        parse_response(response).await
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    #[instrument(skip(self), fields(email = %email))]
    async fn create_customer(&self, email: &Email) -> Result<String, StripeError> {
        let response = self
            .client
            .post(format!("{}/customers", self.base_url))
            .bearer_auth(self.secret_key.expose_secret())
            .form(&[("email", email.as_str())])
            .send()
            .await?;

        let customer: Customer = parse_response(response).await?;
        tracing::debug!(customer_id = %customer.id, "Stripe customer created");
        Ok(customer.id)
    }

    #[instrument(skip(self))]
    async fn create_checkout_session(
        &self,
        product_id: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<String, StripeError> {
        let product = self.get_product(product_id).await?;
        let price = product.default_price.ok_or_else(|| StripeError::Api {
            status: 400,
            message: format!("product {product_id} has no default price"),
        })?;

        let response = self
            .client
            .post(format!("{}/checkout/sessions", self.base_url))
            .bearer_auth(self.secret_key.expose_secret())
            .form(&[
                ("mode", "payment"),
                ("payment_method_types[0]", "card"),
                ("line_items[0][price]", price.as_str()),
                ("line_items[0][quantity]", "1"),
                ("success_url", success_url),
                ("cancel_url", cancel_url),
                ("metadata[productId]", product_id),
            ])
            .send()
            .await?;

        let session: CheckoutSession = parse_response(response).await?;
        session
            .url
            .ok_or_else(|| StripeError::Parse("checkout session has no url".to_string()))
    }

    #[instrument(skip(self))]
    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, StripeError> {
        let response = self
            .client
            .get(format!("{}/checkout/sessions/{session_id}", self.base_url))
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await?;

        parse_response(response).await
    }
}

/// Decode a success body, or turn an error body into `StripeError::Api`.
async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T, StripeError> {
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(|b| b.error.message)
            .unwrap_or(body);
        return Err(StripeError::Api {
            status: status.as_u16(),
            message,
        });
    }

    response
        .json()
        .await
        .map_err(|e| StripeError::Parse(e.to_string()))
}
