//! # pay-stripe
//!
//! Stripe payment strategy for the hosted checkout server.
//!
//! **StripeCheckoutStrategy** creates card-only, manual-capture Checkout
//! Sessions and authenticates webhook deliveries.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pay_stripe::StripeCheckoutStrategy;
//! use pay_core::{LineItem, Order, PaymentStrategy};
//!
//! let strategy = StripeCheckoutStrategy::from_env()?;
//!
//! let order = Order::from_items([LineItem::new(2, 799, "Pin", "eur")]);
//! let session = strategy.create_checkout(
//!     &order,
//!     "https://example.com/success",
//!     "https://example.com/cancel",
//! ).await?;
//! ```
//!
//! ## Webhook Handling
//!
//! ```rust,ignore
//! use pay_stripe::{dispatch_webhook_event, CheckoutCompletedData, DeduplicatingHandler, WebhookHandler};
//!
//! struct Warehouse;
//!
//! impl WebhookHandler for Warehouse {
//!     fn on_checkout_completed(&self, data: CheckoutCompletedData) -> PaymentResult<()> {
//!         // Ship the order, then capture the payment intent
//!         Ok(())
//!     }
//! }
//!
//! let handler = DeduplicatingHandler::new(Warehouse);
//!
//! // In your webhook endpoint, with the raw body:
//! let event = strategy.verify_webhook(&body, signature).await?;
//! dispatch_webhook_event(&handler, event)?;
//! ```

pub mod checkout;
pub mod config;
pub mod webhook;

// Re-exports
pub use checkout::StripeCheckoutStrategy;
pub use config::StripeConfig;
pub use webhook::{
    dispatch_webhook_event, signature_header, CheckoutCompletedData, DeduplicatingHandler,
    LoggingWebhookHandler, WebhookHandler, REQUIRED_WEBHOOK_EVENTS, SIGNATURE_HEADER,
};
