//! # Order Types
//!
//! Cart, order, checkout session and webhook event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A line item as supplied by the browser.
///
/// Amounts are in the smallest currency unit (cents for EUR/USD). Values are
/// passed through to the provider, which enforces its own limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Number of units
    pub quantity: u32,
    /// Unit amount in minor currency units
    pub amount: i64,
    /// Display name on the hosted payment page
    pub name: String,
    /// ISO 4217 currency code
    pub currency: String,
}

impl LineItem {
    pub fn new(quantity: u32, amount: i64, name: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            quantity,
            amount,
            name: name.into(),
            currency: currency.into(),
        }
    }

    /// Currency code in the lowercase form Stripe expects
    pub fn currency_code(&self) -> String {
        self.currency.trim().to_ascii_lowercase()
    }

    /// Total for this line in minor units
    pub fn total(&self) -> i64 {
        self.amount.saturating_mul(self.quantity as i64)
    }
}

/// When authorized funds are moved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMethod {
    /// Authorize now, capture later in a separate fulfillment step
    #[default]
    Manual,
    /// Capture immediately on authorization
    Automatic,
}

impl CaptureMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureMethod::Manual => "manual",
            CaptureMethod::Automatic => "automatic",
        }
    }
}

/// An order to be checked out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Unique order ID (generated)
    pub id: String,

    /// Line items, in cart order
    pub line_items: Vec<LineItem>,

    /// Capture instruction passed to the payment intent
    #[serde(default)]
    pub capture_method: CaptureMethod,

    /// Accepted payment methods
    pub payment_method_types: Vec<String>,

    /// Idempotency key (prevents duplicate sessions on retried requests)
    pub idempotency_key: String,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Create an empty card-only, manual-capture order
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            line_items: Vec::new(),
            capture_method: CaptureMethod::Manual,
            payment_method_types: vec!["card".to_string()],
            idempotency_key: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
        }
    }

    /// Build an order from a cart
    pub fn from_items(items: impl IntoIterator<Item = LineItem>) -> Self {
        let mut order = Self::new();
        for item in items {
            order.add_item(item);
        }
        order
    }

    /// Use a caller-supplied idempotency key instead of the generated one
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = key.into();
        self
    }

    /// Add a line item
    pub fn add_item(&mut self, item: LineItem) {
        self.line_items.push(item);
    }

    /// Check if order is empty
    pub fn is_empty(&self) -> bool {
        self.line_items.is_empty()
    }

    /// Get item count
    pub fn item_count(&self) -> u64 {
        self.line_items
            .iter()
            .fold(0u64, |count, item| count.saturating_add(u64::from(item.quantity)))
    }
}

impl Default for Order {
    fn default() -> Self {
        Self::new()
    }
}

/// A checkout session created by a payment provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Provider's session ID
    pub session_id: String,

    /// Our internal order ID
    pub order_id: String,

    /// Provider name (e.g., "stripe")
    pub provider: String,

    /// Hosted payment page to redirect the customer to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,

    /// When the session expires
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

/// Stripe tag for a completed checkout
pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

/// Webhook event types we dispatch on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventType {
    /// Customer finished the hosted payment page
    CheckoutCompleted,
    /// Everything else, acknowledged but not acted on
    Other(String),
}

impl WebhookEventType {
    pub fn from_stripe(tag: &str) -> Self {
        match tag {
            CHECKOUT_SESSION_COMPLETED => WebhookEventType::CheckoutCompleted,
            other => WebhookEventType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            WebhookEventType::CheckoutCompleted => CHECKOUT_SESSION_COMPLETED,
            WebhookEventType::Other(tag) => tag,
        }
    }
}

impl std::fmt::Display for WebhookEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an event came to be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    /// Signature checked against the signing secret
    Signed,
    /// No signing secret configured; body taken at face value.
    /// Local development only.
    TrustedByConfiguration,
}

/// A parsed webhook event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Event ID from provider (absent in hand-crafted unsigned bodies)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,

    /// Event type
    pub event_type: WebhookEventType,

    /// Provider name
    pub provider: String,

    /// Which branch of verification produced this event
    pub verification: Verification,

    /// Related session ID (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Related payment intent ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,

    /// Amount in smallest unit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_total: Option<i64>,

    /// The event's `data.object`, opaque
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<serde_json::Value>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_item_deserializes_client_shape() {
        let item: LineItem = serde_json::from_str(
            r#"{"quantity": 2, "amount": 799, "name": "Pin", "currency": "EUR"}"#,
        )
        .unwrap();

        assert_eq!(item, LineItem::new(2, 799, "Pin", "EUR"));
        assert_eq!(item.currency_code(), "eur");
        assert_eq!(item.total(), 1598);
    }

    #[test]
    fn test_order_defaults() {
        let order = Order::from_items([
            LineItem::new(2, 799, "Pin", "eur"),
            LineItem::new(1, 1500, "Shirt", "eur"),
        ]);

        assert_eq!(order.capture_method, CaptureMethod::Manual);
        assert_eq!(order.payment_method_types, vec!["card"]);
        assert_eq!(order.item_count(), 3);
        assert!(!order.is_empty());
        assert_ne!(order.id, order.idempotency_key);
    }

    #[test]
    fn test_capture_method_default_is_manual() {
        assert_eq!(CaptureMethod::default(), CaptureMethod::Manual);
    }

    #[test]
    fn test_with_idempotency_key() {
        let order = Order::from_items([LineItem::new(1, 500, "Mug", "usd")])
            .with_idempotency_key("cart-42");

        assert_eq!(order.idempotency_key, "cart-42");
        assert_eq!(order.item_count(), 1);
    }

    #[test]
    fn test_item_count_does_not_overflow() {
        let order = Order::from_items([
            LineItem::new(u32::MAX, 1, "Bolt", "eur"),
            LineItem::new(u32::MAX, 1, "Nut", "eur"),
        ]);

        assert_eq!(order.item_count(), 2 * u64::from(u32::MAX));
    }

    #[test]
    fn test_event_type_mapping() {
        assert_eq!(
            WebhookEventType::from_stripe("checkout.session.completed"),
            WebhookEventType::CheckoutCompleted
        );
        let other = WebhookEventType::from_stripe("payment_intent.canceled");
        assert_eq!(other, WebhookEventType::Other("payment_intent.canceled".into()));
        assert_eq!(other.to_string(), "payment_intent.canceled");
    }
}
