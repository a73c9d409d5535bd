//! # Application State
//!
//! Configuration is read once at startup and shared immutably with every
//! handler through `AppState`.

use anyhow::Context;
use pay_core::{BoxedPaymentStrategy, CheckoutUrls};
use pay_stripe::{DeduplicatingHandler, LoggingWebhookHandler, StripeCheckoutStrategy, WebhookHandler};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address to bind to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public origin used to build the redirect URLs
    pub domain: String,
    /// Directory holding index.html, success.html and error.html
    pub static_dir: PathBuf,
    /// Environment (development, staging, production)
    pub environment: String,
}

impl AppConfig {
    /// Load from environment variables (and `.env` if present)
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host: IpAddr = match lookup("HOST") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("HOST is not an IP address: {}", raw))?,
            None => IpAddr::from([0, 0, 0, 0]),
        };

        let port: u16 = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("PORT is not a valid port: {}", raw))?,
            None => 3000,
        };

        let domain = lookup("DOMAIN")
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            host,
            port,
            domain,
            static_dir: lookup("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("client")),
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
        })
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Hosted checkout provider
    pub strategy: BoxedPaymentStrategy,
    /// Fulfillment hook for webhook events
    pub webhook_handler: Arc<dyn WebhookHandler>,
    /// Success/cancel redirect targets
    pub urls: CheckoutUrls,
    /// Application config
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Build state from the environment with the Stripe strategy and the
    /// logging fulfillment hook
    pub fn new() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let stripe_strategy = StripeCheckoutStrategy::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to initialize Stripe: {}", e))?;

        Ok(Self::from_parts(
            config,
            Arc::new(stripe_strategy),
            Arc::new(DeduplicatingHandler::new(LoggingWebhookHandler)),
        ))
    }

    pub fn from_parts(
        config: AppConfig,
        strategy: BoxedPaymentStrategy,
        webhook_handler: Arc<dyn WebhookHandler>,
    ) -> Self {
        Self {
            strategy,
            webhook_handler,
            urls: CheckoutUrls::new(&config.domain),
            config: Arc::new(config),
        }
    }

    pub fn success_url(&self) -> String {
        self.urls.success_url()
    }

    pub fn cancel_url(&self) -> String {
        self.urls.cancel_url()
    }
}
