//! # pay-core
//!
//! Core types and traits for the hosted checkout server.
//!
//! This crate provides:
//! - `PaymentStrategy` trait for hosted-checkout providers
//! - `LineItem`, `Order`, and `CheckoutSession` for the checkout flow
//! - `WebhookEvent` for asynchronous payment notifications
//! - `PaymentError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use pay_core::{CheckoutUrls, LineItem, Order, PaymentStrategy};
//!
//! let order = Order::from_items([LineItem::new(2, 799, "Pin", "eur")]);
//! let urls = CheckoutUrls::new("https://shop.example.com");
//!
//! let session = strategy
//!     .create_checkout(&order, &urls.success_url(), &urls.cancel_url())
//!     .await?;
//!
//! // Hand session.session_id back to the browser
//! ```

pub mod error;
pub mod order;
pub mod strategy;

// Re-exports for convenience
pub use error::{PaymentError, PaymentResult};
pub use order::{
    CaptureMethod, CheckoutSession, LineItem, Order, Verification, WebhookEvent,
    WebhookEventType, CHECKOUT_SESSION_COMPLETED,
};
pub use strategy::{BoxedPaymentStrategy, CheckoutUrls, PaymentStrategy};
