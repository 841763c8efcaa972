//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::ApiConfig;
use crate::db::{DynStore, PgStore, Store};
use crate::mailjet::{MailjetClient, MailjetError, Mailer};
use crate::services::auth::AuthService;
use crate::services::license::LicenseService;
use crate::services::notify::Notifier;
use crate::services::payments::PaymentService;
use crate::stripe::{PaymentGateway, StripeClient, StripeError};

/// Error building provider clients.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("stripe client: {0}")]
    Stripe(#[from] StripeError),
    #[error("mailjet client: {0}")]
    Mailjet(#[from] MailjetError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like storage, provider clients, and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ApiConfig,
    store: DynStore,
    gateway: Arc<dyn PaymentGateway>,
    mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// Create application state from explicit parts.
    #[must_use]
    pub fn new(
        config: ApiConfig,
        store: DynStore,
        gateway: Arc<dyn PaymentGateway>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                gateway,
                mailer,
            }),
        }
    }

    /// Production state: `PostgreSQL` storage, Stripe and Mailjet clients.
    ///
    /// # Errors
    ///
    /// Returns an error if a provider client cannot be built.
    pub fn connect(config: ApiConfig, pool: PgPool) -> Result<Self, StateError> {
        let gateway = Arc::new(StripeClient::new(&config.stripe)?);
        let mailer = Arc::new(MailjetClient::new(&config.mailjet)?);
        Ok(Self::new(config, Arc::new(PgStore::new(pool)), gateway, mailer))
    }

    /// Get a reference to the API configuration.
    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    /// Get a reference to the storage backend.
    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    #[must_use]
    pub fn gateway(&self) -> &dyn PaymentGateway {
        self.inner.gateway.as_ref()
    }

    #[must_use]
    pub fn mailer(&self) -> &dyn Mailer {
        self.inner.mailer.as_ref()
    }

    /// Notifier whose links point at the frontend sign-in page.
    #[must_use]
    pub fn notifier(&self) -> Notifier<'_> {
        Notifier::new(self.mailer(), self.config().frontend_link("/signin"))
    }

    #[must_use]
    pub fn auth(&self) -> AuthService<'_> {
        AuthService::new(
            self.store(),
            self.gateway(),
            self.notifier(),
            &self.config().tokens,
        )
    }

    #[must_use]
    pub fn licenses(&self) -> LicenseService<'_> {
        LicenseService::new(self.store(), self.config().licenses, self.notifier())
    }

    #[must_use]
    pub fn payments(&self) -> PaymentService<'_> {
        PaymentService::new(self.store(), self.gateway(), self.notifier(), self.config())
    }
}
