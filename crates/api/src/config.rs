//! API configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `INSIDER_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `INSIDER_ACCESS_TOKEN_SECRET` - Access token signing secret (min 32 chars, high entropy)
//! - `INSIDER_REFRESH_TOKEN_SECRET` - Refresh token signing secret (min 32 chars, high entropy)
//! - `INSIDER_FRONTEND_URL` - Public frontend origin (CORS and checkout redirects)
//! - `STRIPE_SECRET_KEY` - Stripe API secret key
//! - `STRIPE_WEBHOOK_SECRET` - Stripe webhook signing secret (`whsec_...`)
//! - `STRIPE_INDIVIDUAL_PRODUCT_ID` - Product id that grants an individual license
//! - `STRIPE_TEAM_PRODUCT_ID` - Product id that grants a team license
//! - `MAILJET_API_KEY` - Mailjet public API key
//! - `MAILJET_API_SECRET` - Mailjet private API key
//!
//! ## Optional
//! - `INSIDER_HOST` - Bind address (default: 127.0.0.1)
//! - `INSIDER_PORT` - Listen port (default: 3500)
//! - `INSIDER_ENV` - `production` or `development` (default: development)
//! - `INSIDER_DEV_ORIGIN` - Extra CORS origin (default: `http://localhost:3000`)
//! - `INSIDER_ACCESS_TOKEN_TTL_SECS` - Access token lifetime (default: 3600)
//! - `INSIDER_REFRESH_TOKEN_TTL_SECS` - Refresh token lifetime (default: 604800)
//! - `INSIDER_TEAM_MAX_SIZE` - Team license capacity, owner included (default: 11)
//! - `INSIDER_INDIVIDUAL_MAX_SIZE` - Individual license capacity (default: 1)
//! - `INSIDER_RATE_LIMIT` - Enable per-IP rate limiting (default: true)
//! - `MAILJET_FROM_EMAIL` - Sender address (default: hello@uibeats.com)
//! - `MAILJET_FROM_NAME` - Sender name (default: ui/beats)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use insider_core::LicenseType;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const MIN_TOKEN_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Cookies carry the `Secure` attribute only in production.
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

/// API application configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Deployment environment
    pub environment: Environment,
    /// Production frontend origin
    pub frontend_url: Url,
    /// Extra origin allowed by CORS (local frontend dev server)
    pub dev_origin: String,
    /// Token signing configuration
    pub tokens: TokenConfig,
    /// Stripe configuration
    pub stripe: StripeConfig,
    /// Mailjet configuration
    pub mailjet: MailjetConfig,
    /// License capacity policy
    pub licenses: LicensePolicy,
    /// Whether per-IP rate limiting is applied
    pub rate_limit: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

/// Signing secrets and lifetimes for access and refresh tokens.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct TokenConfig {
    pub access_secret: SecretString,
    pub refresh_secret: SecretString,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_secret", &"[REDACTED]")
            .field("refresh_secret", &"[REDACTED]")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

/// Stripe API configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct StripeConfig {
    /// Secret API key (`sk_...`)
    pub secret_key: SecretString,
    /// Webhook endpoint signing secret (`whsec_...`)
    pub webhook_secret: SecretString,
    /// Product that grants an individual license
    pub individual_product_id: String,
    /// Product that grants a team license
    pub team_product_id: String,
}

impl StripeConfig {
    /// Map a purchased product to the license it grants.
    #[must_use]
    pub fn license_type_for(&self, product_id: &str) -> Option<LicenseType> {
        if product_id == self.individual_product_id {
            Some(LicenseType::Individual)
        } else if product_id == self.team_product_id {
            Some(LicenseType::Team)
        } else {
            None
        }
    }
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .field("individual_product_id", &self.individual_product_id)
            .field("team_product_id", &self.team_product_id)
            .finish()
    }
}

/// Mailjet API configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct MailjetConfig {
    pub api_key: String,
    pub api_secret: SecretString,
    pub from_email: String,
    pub from_name: String,
}

impl std::fmt::Debug for MailjetConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailjetConfig")
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("from_email", &self.from_email)
            .field("from_name", &self.from_name)
            .finish()
    }
}

/// Capacity assigned to a license at creation, owner included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LicensePolicy {
    pub team_max_size: i32,
    pub individual_max_size: i32,
}

impl LicensePolicy {
    #[must_use]
    pub const fn max_size_for(&self, license_type: LicenseType) -> i32 {
        match license_type {
            LicenseType::Team => self.team_max_size,
            LicenseType::Individual => self.individual_max_size,
        }
    }
}

impl LicensePolicy {
    /// Capacities from `INSIDER_TEAM_MAX_SIZE` and `INSIDER_INDIVIDUAL_MAX_SIZE`.
    ///
    /// # Errors
    ///
    /// Returns an error if either is set but not a positive integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            team_max_size: parse_positive_env("INSIDER_TEAM_MAX_SIZE", "11")?,
            individual_max_size: parse_positive_env("INSIDER_INDIVIDUAL_MAX_SIZE", "1")?,
        })
    }
}

impl Default for LicensePolicy {
    fn default() -> Self {
        Self {
            team_max_size: 11,
            individual_max_size: 1,
        }
    }
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("INSIDER_DATABASE_URL")?;
        let host = parse_env("INSIDER_HOST", "127.0.0.1")?;
        let port = parse_env("INSIDER_PORT", "3500")?;
        let environment = match get_env_or_default("INSIDER_ENV", "development").as_str() {
            "production" => Environment::Production,
            "development" => Environment::Development,
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "INSIDER_ENV".to_string(),
                    format!("expected production or development, got {other}"),
                ));
            }
        };
        let frontend_url = get_required_env("INSIDER_FRONTEND_URL")?
            .parse::<Url>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("INSIDER_FRONTEND_URL".to_string(), e.to_string())
            })?;
        let dev_origin = get_env_or_default("INSIDER_DEV_ORIGIN", "http://localhost:3000");

        let tokens = TokenConfig::from_env()?;
        let stripe = StripeConfig::from_env()?;
        let mailjet = MailjetConfig::from_env()?;
        let licenses = LicensePolicy::from_env()?;
        let rate_limit = parse_env("INSIDER_RATE_LIMIT", "true")?;

        Ok(Self {
            database_url,
            host,
            port,
            environment,
            frontend_url,
            dev_origin,
            tokens,
            stripe,
            mailjet,
            licenses,
            rate_limit,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Frontend URL with `path` appended, without a doubled slash.
    #[must_use]
    pub fn frontend_link(&self, path: &str) -> String {
        format!(
            "{}{}",
            self.frontend_url.as_str().trim_end_matches('/'),
            path
        )
    }
}

impl TokenConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let access_secret = get_validated_secret("INSIDER_ACCESS_TOKEN_SECRET")?;
        validate_token_secret(&access_secret, "INSIDER_ACCESS_TOKEN_SECRET")?;
        let refresh_secret = get_validated_secret("INSIDER_REFRESH_TOKEN_SECRET")?;
        validate_token_secret(&refresh_secret, "INSIDER_REFRESH_TOKEN_SECRET")?;

        if access_secret.expose_secret() == refresh_secret.expose_secret() {
            return Err(ConfigError::InsecureSecret(
                "INSIDER_REFRESH_TOKEN_SECRET".to_string(),
                "must differ from INSIDER_ACCESS_TOKEN_SECRET".to_string(),
            ));
        }

        Ok(Self {
            access_secret,
            refresh_secret,
            access_ttl: Duration::from_secs(parse_env("INSIDER_ACCESS_TOKEN_TTL_SECS", "3600")?),
            refresh_ttl: Duration::from_secs(parse_env(
                "INSIDER_REFRESH_TOKEN_TTL_SECS",
                "604800",
            )?),
        })
    }
}

impl StripeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            secret_key: get_validated_secret("STRIPE_SECRET_KEY")?,
            webhook_secret: get_validated_secret("STRIPE_WEBHOOK_SECRET")?,
            individual_product_id: get_required_env("STRIPE_INDIVIDUAL_PRODUCT_ID")?,
            team_product_id: get_required_env("STRIPE_TEAM_PRODUCT_ID")?,
        })
    }
}

impl MailjetConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: get_required_env("MAILJET_API_KEY")?,
            api_secret: get_validated_secret("MAILJET_API_SECRET")?,
            from_email: get_env_or_default("MAILJET_FROM_EMAIL", "hello@uibeats.com"),
            from_name: get_env_or_default("MAILJET_FROM_NAME", "ui/beats"),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// `INSIDER_DATABASE_URL`, falling back to `DATABASE_URL`.
///
/// # Errors
///
/// Returns an error if neither is set.
pub fn database_url_from_env() -> Result<SecretString, ConfigError> {
    get_database_url("INSIDER_DATABASE_URL")
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable (or its default) into `T`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse a capacity value; zero or negative capacities are rejected.
fn parse_positive_env(key: &str, default: &str) -> Result<i32, ConfigError> {
    let value: i32 = parse_env(key, default)?;
    if value < 1 {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("must be at least 1 (got {value})"),
        ));
    }
    Ok(value)
}

/// Validate that a token secret meets minimum length requirements.
fn validate_token_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_TOKEN_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_TOKEN_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
