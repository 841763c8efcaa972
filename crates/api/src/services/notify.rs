//! Transactional email.
//!
//! Renders the `templates/email/*` templates and hands them to a
//! [`Mailer`]. Callers decide whether a failed send is fatal.

use askama::Template;
use thiserror::Error;
use tracing::instrument;

use insider_core::Email;

use crate::mailjet::{MailjetError, Mailer, OutgoingEmail};

/// Subject shared by both purchase emails.
pub const WELCOME_SUBJECT: &str = "Welcome to ui/beats Insider";

/// Subject of the password reset email.
pub const RESET_SUBJECT: &str = "Temporary Password for Account Reset";

const TEAM_ADDED_SUBJECT: &str = "You've been added to a ui/beats Insider team";
const TEAM_REMOVED_SUBJECT: &str = "You've been removed from a ui/beats Insider team";

/// Errors that can occur while sending a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("template render failed: {0}")]
    Render(#[from] askama::Error),

    #[error("email delivery failed: {0}")]
    Delivery(#[from] MailjetError),
}

#[derive(Template)]
#[template(path = "email/welcome_back.html")]
struct WelcomeBackEmail<'a> {
    signin_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/welcome_new_account.html")]
struct WelcomeNewAccountEmail<'a> {
    signin_url: &'a str,
    temp_password: &'a str,
}

#[derive(Template)]
#[template(path = "email/password_reset.html")]
struct PasswordResetEmail<'a> {
    signin_url: &'a str,
    temp_password: &'a str,
}

#[derive(Template)]
#[template(path = "email/team_added.html")]
struct TeamAddedEmail<'a> {
    signin_url: &'a str,
    owner_email: &'a str,
}

#[derive(Template)]
#[template(path = "email/team_removed.html")]
struct TeamRemovedEmail<'a> {
    owner_email: &'a str,
}

/// Sends the account and team emails.
pub struct Notifier<'a> {
    mailer: &'a dyn Mailer,
    signin_url: String,
}

impl<'a> Notifier<'a> {
    #[must_use]
    pub fn new(mailer: &'a dyn Mailer, signin_url: String) -> Self {
        Self { mailer, signin_url }
    }

    /// Register `email` with the mail provider. Failures are logged, not returned.
    pub async fn register_contact(&self, email: &Email) {
        if let Err(e) = self.mailer.add_contact(email.as_str()).await {
            tracing::warn!(error = %e, "Failed to register mail contact");
        }
    }

    /// Purchase confirmation for an existing account.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError` if rendering or delivery fails.
    #[instrument(skip(self), fields(to = %to))]
    pub async fn welcome_back(&self, to: &Email) -> Result<(), NotifyError> {
        let html = WelcomeBackEmail {
            signin_url: &self.signin_url,
        }
        .render()?;
        self.deliver(to, WELCOME_SUBJECT, html).await
    }

    /// Purchase confirmation carrying the generated password of a new account.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError` if rendering or delivery fails.
    #[instrument(skip(self, temp_password), fields(to = %to))]
    pub async fn welcome_new_account(
        &self,
        to: &Email,
        temp_password: &str,
    ) -> Result<(), NotifyError> {
        let html = WelcomeNewAccountEmail {
            signin_url: &self.signin_url,
            temp_password,
        }
        .render()?;
        self.deliver(to, WELCOME_SUBJECT, html).await
    }

    /// Temporary password after a reset request.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError` if rendering or delivery fails.
    #[instrument(skip(self, temp_password), fields(to = %to))]
    pub async fn password_reset(&self, to: &Email, temp_password: &str) -> Result<(), NotifyError> {
        let html = PasswordResetEmail {
            signin_url: &self.signin_url,
            temp_password,
        }
        .render()?;
        self.deliver(to, RESET_SUBJECT, html).await
    }

    /// # Errors
    ///
    /// Returns `NotifyError` if rendering or delivery fails.
    #[instrument(skip(self), fields(to = %to))]
    pub async fn team_added(&self, to: &Email, owner: &Email) -> Result<(), NotifyError> {
        let html = TeamAddedEmail {
            signin_url: &self.signin_url,
            owner_email: owner.as_str(),
        }
        .render()?;
        self.deliver(to, TEAM_ADDED_SUBJECT, html).await
    }

    /// # Errors
    ///
    /// Returns `NotifyError` if rendering or delivery fails.
    #[instrument(skip(self), fields(to = %to))]
    pub async fn team_removed(&self, to: &Email, owner: &Email) -> Result<(), NotifyError> {
        let html = TeamRemovedEmail {
            owner_email: owner.as_str(),
        }
        .render()?;
        self.deliver(to, TEAM_REMOVED_SUBJECT, html).await
    }

    async fn deliver(&self, to: &Email, subject: &str, html: String) -> Result<(), NotifyError> {
        self.mailer
            .send(&OutgoingEmail {
                to: to.as_str().to_string(),
                subject: subject.to_string(),
                html,
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_account_email_contains_password() {
        let html = WelcomeNewAccountEmail {
            signin_url: "https://insider.uibeats.com/signin",
            temp_password: "Xy7#kQ2!pLm9",
        }
        .render()
        .unwrap();
        assert!(html.contains("Xy7#kQ2!pLm9"));
        assert!(html.contains("https://insider.uibeats.com/signin"));
    }

    #[test]
    fn test_team_email_escapes_owner() {
        let html = TeamAddedEmail {
            signin_url: "https://insider.uibeats.com/signin",
            owner_email: "<b>owner</b>@example.com",
        }
        .render()
        .unwrap();
        assert!(!html.contains("<b>owner</b>"));
    }
}
