//! # Stripe Configuration
//!
//! Configuration management for Stripe integration.
//! All secrets are loaded from environment variables.

use pay_core::PaymentError;
use std::env;
use std::time::Duration;

const DEFAULT_API_BASE_URL: &str = "https://api.stripe.com";
const DEFAULT_API_VERSION: &str = "2024-12-18.acacia";

/// Upper bound on `STRIPE_MAX_RETRIES`
pub const MAX_RETRIES_LIMIT: u32 = 5;

/// Stripe API configuration
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Secret API key (sk_test_... or sk_live_...)
    pub secret_key: String,

    /// Webhook signing secret (whsec_...); `None` disables signature checks
    pub webhook_secret: Option<String>,

    /// API base URL (for testing/mocking)
    pub api_base_url: String,

    /// API version
    pub api_version: String,

    /// Per-attempt request timeout
    pub timeout: Duration,

    /// Extra attempts after a transient failure
    pub max_retries: u32,

    /// Backoff before the first retry, doubled on each further attempt
    pub retry_backoff: Duration,

    /// Maximum age of a webhook signature timestamp, in seconds
    pub webhook_tolerance_secs: i64,
}

impl StripeConfig {
    /// Load configuration from environment variables.
    ///
    /// Required env vars:
    /// - `STRIPE_SECRET_KEY`
    ///
    /// Optional:
    /// - `STRIPE_WEBHOOK_SECRET`
    /// - `STRIPE_API_BASE`, `STRIPE_API_VERSION`
    /// - `STRIPE_TIMEOUT_SECS`, `STRIPE_MAX_RETRIES`, `STRIPE_WEBHOOK_TOLERANCE_SECS`
    pub fn from_env() -> Result<Self, PaymentError> {
        dotenvy::dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PaymentError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret_key = lookup("STRIPE_SECRET_KEY").ok_or_else(|| {
            PaymentError::Configuration("STRIPE_SECRET_KEY not set".to_string())
        })?;

        if !secret_key.starts_with("sk_test_") && !secret_key.starts_with("sk_live_") {
            return Err(PaymentError::Configuration(
                "STRIPE_SECRET_KEY must start with sk_test_ or sk_live_".to_string(),
            ));
        }

        // An empty value in .env means "not configured"
        let webhook_secret = lookup("STRIPE_WEBHOOK_SECRET").filter(|s| !s.trim().is_empty());

        if let Some(secret) = &webhook_secret {
            if !secret.starts_with("whsec_") {
                return Err(PaymentError::Configuration(
                    "STRIPE_WEBHOOK_SECRET must start with whsec_".to_string(),
                ));
            }
        }

        let mut config = Self::new(secret_key);
        config.webhook_secret = webhook_secret;

        if let Some(url) = lookup("STRIPE_API_BASE") {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(version) = lookup("STRIPE_API_VERSION") {
            config.api_version = version;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "STRIPE_TIMEOUT_SECS")? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = parse_var::<u32, _>(&lookup, "STRIPE_MAX_RETRIES")? {
            if retries > MAX_RETRIES_LIMIT {
                return Err(PaymentError::Configuration(format!(
                    "STRIPE_MAX_RETRIES must be at most {}, got {}",
                    MAX_RETRIES_LIMIT, retries
                )));
            }
            config.max_retries = retries;
        }
        if let Some(tolerance) = parse_var(&lookup, "STRIPE_WEBHOOK_TOLERANCE_SECS")? {
            config.webhook_tolerance_secs = tolerance;
        }

        Ok(config)
    }

    /// Create config with explicit values (for testing)
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            webhook_secret: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_backoff: Duration::from_millis(250),
            webhook_tolerance_secs: 300,
        }
    }

    /// Check if using test keys
    pub fn is_test_mode(&self) -> bool {
        self.secret_key.starts_with("sk_test_")
    }

    /// Check if using live keys
    pub fn is_live_mode(&self) -> bool {
        self.secret_key.starts_with("sk_live_")
    }

    /// Get authorization header value
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.secret_key)
    }

    /// Builder: set webhook signing secret
    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }

    /// Builder: set custom API base URL (for testing)
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Builder: set retry policy
    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries.min(MAX_RETRIES_LIMIT);
        self.retry_backoff = backoff;
        self
    }

    /// Builder: set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, PaymentError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| PaymentError::Configuration(format!("{} has an invalid value: {}", key, raw))),
    }
}
