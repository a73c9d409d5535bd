//! # Payment Strategy Trait
//!
//! The seam between the HTTP layer and a hosted-checkout provider.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PaymentStrategy (trait)                  │
//! │  ├── create_checkout()                                      │
//! │  ├── verify_webhook()                                       │
//! │  └── provider_name()                                        │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                    ┌───────┴───────┐
//!                    │StripeCheckout │
//!                    │   Strategy    │
//!                    └───────────────┘
//! ```

use crate::error::PaymentResult;
use crate::order::{CheckoutSession, Order, WebhookEvent};
use async_trait::async_trait;
use std::sync::Arc;

/// Core trait for payment provider implementations.
#[async_trait]
pub trait PaymentStrategy: Send + Sync {
    /// Create a hosted checkout session.
    ///
    /// # Arguments
    /// * `order` - The order to check out
    /// * `success_url` - URL to redirect after successful payment
    /// * `cancel_url` - URL to redirect if customer cancels
    async fn create_checkout(
        &self,
        order: &Order,
        success_url: &str,
        cancel_url: &str,
    ) -> PaymentResult<CheckoutSession>;

    /// Authenticate a webhook delivery and parse the event.
    ///
    /// `payload` must be the raw request body. When the provider has a signing
    /// secret the `signature` header is required and checked; without one the
    /// body is parsed as-is and the event is marked
    /// [`Verification::TrustedByConfiguration`](crate::Verification).
    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> PaymentResult<WebhookEvent>;

    /// Whether webhook signatures are being checked.
    fn webhook_signing_enabled(&self) -> bool;

    /// Get the provider name (for logging).
    fn provider_name(&self) -> &'static str;
}

/// Type alias for a boxed payment strategy (dynamic dispatch)
pub type BoxedPaymentStrategy = Arc<dyn PaymentStrategy>;

/// Redirect targets handed to the hosted payment page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutUrls {
    /// Public origin of this server (e.g., "https://shop.example.com")
    pub base_url: String,
    /// Success page path
    pub success_path: String,
    /// Cancel page path
    pub cancel_path: String,
}

impl CheckoutUrls {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            success_path: "/success".to_string(),
            cancel_path: "/cancel".to_string(),
        }
    }

    pub fn success_url(&self) -> String {
        format!("{}{}", self.base_url, self.success_path)
    }

    pub fn cancel_url(&self) -> String {
        format!("{}{}", self.base_url, self.cancel_path)
    }
}

impl Default for CheckoutUrls {
    fn default() -> Self {
        Self::new("http://localhost:3000")
    }
}
