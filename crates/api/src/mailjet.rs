//! Mailjet API client for contacts and transactional email.
//!
//! # APIs
//!
//! - `POST /v3/REST/contact` - register a contact (idempotent on our side)
//! - `POST /v3.1/send` - send one HTML message

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::config::MailjetConfig;

/// Mailjet API base URL.
const BASE_URL: &str = "https://api.mailjet.com";

/// Errors that can occur when interacting with Mailjet.
#[derive(Debug, Error)]
pub enum MailjetError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// A rendered message ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Email provider operations the services depend on.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Register `email` as a contact. Already-known contacts are not an error.
    async fn add_contact(&self, email: &str) -> Result<(), MailjetError>;

    /// Send a single message.
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailjetError>;
}

/// Mailjet API client.
#[derive(Clone)]
pub struct MailjetClient {
    client: reqwest::Client,
    api_key: String,
    api_secret: SecretString,
    from_email: String,
    from_name: String,
}

impl MailjetClient {
    /// Create a new Mailjet API client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &MailjetConfig) -> Result<Self, MailjetError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{BASE_URL}{path}"))
            .basic_auth(&self.api_key, Some(self.api_secret.expose_secret()))
    }
}

#[async_trait]
impl Mailer for MailjetClient {
    #[instrument(skip(self))]
    async fn add_contact(&self, email: &str) -> Result<(), MailjetError> {
        let response = self
            .post("/v3/REST/contact")
            .json(&serde_json::json!({ "Email": email }))
            .send()
            .await?;
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        if status.as_u16() == 400 && is_duplicate_contact(&message) {
            tracing::debug!("Mailjet contact already exists");
            return Ok(());
        }

        Err(MailjetError::Api {
            status: status.as_u16(),
            message,
        })
    }

    #[instrument(skip(self, email), fields(subject = %email.subject))]
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailjetError> {
        let body = SendRequest {
            messages: vec![Message {
                from: Address {
                    email: &self.from_email,
                    name: Some(&self.from_name),
                },
                to: vec![Address {
                    email: &email.to,
                    name: None,
                }],
                subject: &email.subject,
                html_part: &email.html,
            }],
        };

        let response = self.post("/v3.1/send").json(&body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MailjetError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let result: SendResponse = response
            .json()
            .await
            .map_err(|e| MailjetError::Parse(e.to_string()))?;

        match result.messages.first() {
            Some(m) if m.status == "success" => Ok(()),
            Some(m) => Err(MailjetError::Api {
                status: status.as_u16(),
                message: format!("message status {}", m.status),
            }),
            None => Err(MailjetError::Parse("empty send response".to_string())),
        }
    }
}

fn is_duplicate_contact(body: &str) -> bool {
    body.contains("already exists")
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendRequest<'a> {
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Message<'a> {
    from: Address<'a>,
    to: Vec<Address<'a>>,
    subject: &'a str,
    #[serde(rename = "HTMLPart")]
    html_part: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Address<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SendResponse {
    messages: Vec<MessageResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MessageResult {
    status: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_send_request_shape() {
        let body = SendRequest {
            messages: vec![Message {
                from: Address {
                    email: "hello@uibeats.com",
                    name: Some("ui/beats"),
                },
                to: vec![Address {
                    email: "buyer@example.com",
                    name: None,
                }],
                subject: "Welcome",
                html_part: "<p>hi</p>",
            }],
        };

        let json = serde_json::to_value(&body).unwrap();
        let message = &json["Messages"][0];
        assert_eq!(message["From"]["Email"], "hello@uibeats.com");
        assert_eq!(message["From"]["Name"], "ui/beats");
        assert_eq!(message["To"][0]["Email"], "buyer@example.com");
        assert!(message["To"][0].get("Name").is_none());
        assert_eq!(message["Subject"], "Welcome");
        assert_eq!(message["HTMLPart"], "<p>hi</p>");
    }

    #[test]
    fn test_send_response_parse() {
        let raw = r#"{"Messages":[{"Status":"success","To":[{"Email":"a@b.co"}]}]}"#;
        let parsed: SendResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.messages[0].status, "success");
    }

    #[test]
    fn test_duplicate_contact_detection() {
        assert!(is_duplicate_contact(
            r#"{"ErrorMessage":"MJ18 A Contact resource with value \"a@b.co\" for Email already exists."}"#
        ));
        assert!(!is_duplicate_contact(r#"{"ErrorMessage":"Invalid email"}"#));
    }
}
