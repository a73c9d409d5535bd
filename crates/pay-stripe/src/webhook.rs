//! # Stripe Webhook Handling
//!
//! Signature verification, event parsing and dispatch for Stripe webhooks.
//!
//! Stripe signs every delivery with the endpoint's signing secret:
//!
//! ```text
//! Stripe-Signature: t=1492774577,v1=5257a869e7ec...,v0=6ffbb59b2300...
//!
//! v1 = hex(HMAC-SHA256(secret, "{t}.{raw body}"))
//! ```
//!
//! Verification must run over the exact bytes received; a re-serialized JSON
//! body will not match.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use pay_core::{
    PaymentError, PaymentResult, Verification, WebhookEvent, WebhookEventType,
    CHECKOUT_SESSION_COMPLETED,
};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Header Stripe puts the signature in
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Events that should be enabled on the Stripe webhook endpoint
pub const REQUIRED_WEBHOOK_EVENTS: &[&str] = &[CHECKOUT_SESSION_COMPLETED];

// =============================================================================
// Signature Verification
// =============================================================================

#[derive(Debug)]
struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<String>,
}

fn parse_signature_header(header: &str) -> PaymentResult<SignatureHeader> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => signatures.push(value.to_string()),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        PaymentError::WebhookVerificationFailed("Missing timestamp in signature".to_string())
    })?;

    if signatures.is_empty() {
        return Err(PaymentError::WebhookVerificationFailed(
            "No v1 signature found".to_string(),
        ));
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

fn signed_payload_mac(secret: &str, timestamp: i64, payload: &[u8]) -> PaymentResult<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::Internal(format!("Invalid HMAC key: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Compute the hex `v1` signature Stripe would send for `payload` at `timestamp`.
pub fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> PaymentResult<String> {
    let mac = signed_payload_mac(secret, timestamp, payload)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Build a complete `Stripe-Signature` header value (local tooling and tests).
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> PaymentResult<String> {
    Ok(format!(
        "t={},v1={}",
        timestamp,
        compute_signature(secret, timestamp, payload)?
    ))
}

/// Verify a `Stripe-Signature` header against the raw body.
///
/// Passes when the timestamp is within `tolerance_secs` of `now` and any of
/// the `v1` signatures matches. Comparison is constant-time.
pub fn verify_signature(
    secret: &str,
    tolerance_secs: i64,
    payload: &[u8],
    header: &str,
    now: DateTime<Utc>,
) -> PaymentResult<()> {
    let parsed = parse_signature_header(header)?;

    let within_tolerance = now
        .timestamp()
        .checked_sub(parsed.timestamp)
        .map(i64::unsigned_abs)
        .is_some_and(|age| age <= tolerance_secs.unsigned_abs());

    if !within_tolerance {
        return Err(PaymentError::WebhookVerificationFailed(
            "Timestamp outside tolerance".to_string(),
        ));
    }

    let mac = signed_payload_mac(secret, parsed.timestamp, payload)?;

    let valid = parsed
        .signatures
        .iter()
        .filter_map(|sig| hex::decode(sig).ok())
        .any(|sig| mac.clone().verify_slice(&sig).is_ok());

    if !valid {
        return Err(PaymentError::WebhookVerificationFailed(
            "Signature mismatch".to_string(),
        ));
    }

    Ok(())
}

// =============================================================================
// Event Parsing
// =============================================================================

#[derive(Debug, Deserialize)]
struct StripeEventEnvelope {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    created: Option<i64>,
    #[serde(default)]
    data: serde_json::Value,
}

/// Parse an event body. Only `type` is required.
pub fn parse_event(payload: &[u8], verification: Verification) -> PaymentResult<WebhookEvent> {
    let envelope: StripeEventEnvelope = serde_json::from_slice(payload).map_err(|e| {
        PaymentError::WebhookParseError(format!("Failed to parse webhook: {}", e))
    })?;

    let object = envelope.data.get("object").cloned();

    let field = |name: &str| {
        object
            .as_ref()
            .and_then(|o| o.get(name))
            .and_then(|v| v.as_str())
            .map(String::from)
    };

    let session_id = field("id");
    let payment_intent_id = field("payment_intent");
    let amount_total = object
        .as_ref()
        .and_then(|o| o.get("amount_total"))
        .and_then(|v| v.as_i64());

    let timestamp = envelope
        .created
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .unwrap_or_else(Utc::now);

    debug!("Parsed webhook event: type={}", envelope.event_type);

    Ok(WebhookEvent {
        event_id: envelope.id,
        event_type: WebhookEventType::from_stripe(&envelope.event_type),
        provider: "stripe".to_string(),
        verification,
        session_id,
        payment_intent_id,
        amount_total,
        raw_data: object,
        timestamp,
    })
}

/// Parsed checkout.session.completed event data
#[derive(Debug, Clone, Default)]
pub struct CheckoutCompletedData {
    pub event_id: Option<String>,
    pub session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub customer_email: Option<String>,
    pub amount_total: i64,
    pub currency: Option<String>,
    pub payment_status: String,
    pub metadata: HashMap<String, String>,
}

impl CheckoutCompletedData {
    /// Pull the fulfillment fields out of the event's session object
    pub fn from_event(event: &WebhookEvent) -> Self {
        let obj = event.raw_data.as_ref().and_then(|d| d.as_object());

        let str_field = |name: &str| {
            obj.and_then(|o| o.get(name))
                .and_then(|v| v.as_str())
                .map(String::from)
        };

        let customer_email = obj
            .and_then(|o| o.get("customer_details"))
            .and_then(|cd| cd.get("email"))
            .and_then(|v| v.as_str())
            .map(String::from);

        let metadata = obj
            .and_then(|o| o.get("metadata"))
            .and_then(|m| m.as_object())
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            event_id: event.event_id.clone(),
            session_id: str_field("id"),
            payment_intent_id: str_field("payment_intent"),
            customer_email,
            amount_total: event.amount_total.unwrap_or(0),
            currency: str_field("currency"),
            payment_status: str_field("payment_status").unwrap_or_else(|| "unknown".to_string()),
            metadata,
        }
    }

    /// Get the internal order ID from metadata
    pub fn order_id(&self) -> Option<&str> {
        self.metadata.get("order_id").map(|s| s.as_str())
    }

    /// Key identifying this completion across redeliveries
    pub fn dedup_key(&self) -> Option<&str> {
        self.event_id.as_deref().or(self.session_id.as_deref())
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// Fulfillment hooks for webhook events.
///
/// Under manual capture a completed checkout means funds are authorized;
/// capturing them is up to the implementation.
#[allow(unused_variables)]
pub trait WebhookHandler: Send + Sync {
    /// Called when a checkout session is completed
    fn on_checkout_completed(&self, data: CheckoutCompletedData) -> PaymentResult<()> {
        info!(
            "Checkout completed: session={:?}, amount={}",
            data.session_id, data.amount_total
        );
        Ok(())
    }

    /// Called for every other event type
    fn on_other_event(&self, event: &WebhookEvent) -> PaymentResult<()> {
        debug!("Unhandled webhook event: {}", event.event_type);
        Ok(())
    }
}

/// Default fulfillment hook (just logs events)
pub struct LoggingWebhookHandler;

impl WebhookHandler for LoggingWebhookHandler {
    fn on_checkout_completed(&self, data: CheckoutCompletedData) -> PaymentResult<()> {
        info!(
            session = ?data.session_id,
            payment_intent = ?data.payment_intent_id,
            amount = data.amount_total,
            currency = ?data.currency,
            "💰 Customer provided payment details, capture pending"
        );
        Ok(())
    }
}

/// Wraps a handler so a redelivered completion runs fulfillment once.
///
/// Keys are claimed before the inner hook runs and released if it fails, so a
/// concurrent duplicate is skipped and a later redelivery can retry. At most
/// `capacity` keys are remembered; the oldest are forgotten first.
pub struct DeduplicatingHandler<H> {
    inner: H,
    seen: Mutex<SeenKeys>,
}

struct SeenKeys {
    capacity: usize,
    order: VecDeque<String>,
    keys: HashSet<String>,
}

impl SeenKeys {
    fn claim(&mut self, key: &str) -> bool {
        if self.keys.contains(key) {
            return false;
        }
        self.keys.insert(key.to_string());
        self.order.push_back(key.to_string());
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.keys.remove(&oldest);
            }
        }
        true
    }

    fn release(&mut self, key: &str) {
        if self.keys.remove(key) {
            self.order.retain(|k| k != key);
        }
    }
}

impl<H: WebhookHandler> DeduplicatingHandler<H> {
    pub const DEFAULT_CAPACITY: usize = 10_000;

    pub fn new(inner: H) -> Self {
        Self::with_capacity(inner, Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(inner: H, capacity: usize) -> Self {
        Self {
            inner,
            seen: Mutex::new(SeenKeys {
                capacity: capacity.max(1),
                order: VecDeque::new(),
                keys: HashSet::new(),
            }),
        }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }

    fn with_seen<T>(&self, f: impl FnOnce(&mut SeenKeys) -> T) -> T {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut seen)
    }
}

impl<H: WebhookHandler> WebhookHandler for DeduplicatingHandler<H> {
    fn on_checkout_completed(&self, data: CheckoutCompletedData) -> PaymentResult<()> {
        let Some(key) = data.dedup_key().map(String::from) else {
            warn!("Completed checkout without event or session id, cannot deduplicate");
            return self.inner.on_checkout_completed(data);
        };

        if !self.with_seen(|seen| seen.claim(&key)) {
            info!("Duplicate delivery of {}, fulfillment already done", key);
            return Ok(());
        }

        let result = self.inner.on_checkout_completed(data);
        if result.is_err() {
            self.with_seen(|seen| seen.release(&key));
        }
        result
    }

    fn on_other_event(&self, event: &WebhookEvent) -> PaymentResult<()> {
        self.inner.on_other_event(event)
    }
}

/// Dispatch a webhook event to the appropriate handler method
pub fn dispatch_webhook_event(
    handler: &dyn WebhookHandler,
    event: WebhookEvent,
) -> PaymentResult<()> {
    match &event.event_type {
        WebhookEventType::CheckoutCompleted => {
            let data = CheckoutCompletedData::from_event(&event);
            handler.on_checkout_completed(data)
        }
        WebhookEventType::Other(_) => handler.on_other_event(&event),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SECRET: &str = "whsec_test_secret";

    fn completed_body() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "evt_test_1",
            "type": "checkout.session.completed",
            "created": 1700000000,
            "data": {
                "object": {
                    "id": "cs_test_123",
                    "payment_intent": "pi_test_456",
                    "customer_details": { "email": "test@example.com" },
                    "amount_total": 1598,
                    "currency": "eur",
                    "payment_status": "unpaid",
                    "metadata": { "order_id": "ord_abc" }
                }
            }
        }))
        .unwrap()
    }

    #[derive(Default)]
    struct CountingHandler {
        completed: AtomicUsize,
        other: AtomicUsize,
        fail: bool,
    }

    impl WebhookHandler for CountingHandler {
        fn on_checkout_completed(&self, _data: CheckoutCompletedData) -> PaymentResult<()> {
            self.completed.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PaymentError::Fulfillment("warehouse down".into()));
            }
            Ok(())
        }

        fn on_other_event(&self, _event: &WebhookEvent) -> PaymentResult<()> {
            self.other.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_parse_signature_header() {
        let header = "t=1234567890, v1=abc123,v1=def456,v0=legacy";
        let parsed = parse_signature_header(header).unwrap();

        assert_eq!(parsed.timestamp, 1234567890);
        assert_eq!(parsed.signatures, vec!["abc123", "def456"]);
    }

    #[test]
    fn test_parse_signature_header_errors() {
        assert!(parse_signature_header("v1=abc").is_err());
        assert!(parse_signature_header("t=123").is_err());
        assert!(parse_signature_header("garbage").is_err());
    }

    #[test]
    fn test_compute_signature_is_hex_sha256() {
        let sig = compute_signature(SECRET, 1234567890, b"{}").unwrap();
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_verify_valid_signature() {
        let body = completed_body();
        let now = Utc::now();
        let header = signature_header(SECRET, now.timestamp(), &body).unwrap();

        assert!(verify_signature(SECRET, 300, &body, &header, now).is_ok());
    }

    #[test]
    fn test_verify_accepts_any_matching_v1() {
        let body = completed_body();
        let now = Utc::now();
        let good = compute_signature(SECRET, now.timestamp(), &body).unwrap();
        let header = format!("t={},v1={},v1={}", now.timestamp(), "00".repeat(32), good);

        assert!(verify_signature(SECRET, 300, &body, &header, now).is_ok());
    }

    #[test]
    fn test_verify_rejects_tampered_body() {
        let body = completed_body();
        let now = Utc::now();
        let header = signature_header(SECRET, now.timestamp(), &body).unwrap();

        let mut tampered = body.clone();
        tampered.push(b' ');

        let err = verify_signature(SECRET, 300, &tampered, &header, now).unwrap_err();
        assert!(matches!(err, PaymentError::WebhookVerificationFailed(_)));
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let body = completed_body();
        let now = Utc::now();
        let header = signature_header("whsec_other", now.timestamp(), &body).unwrap();

        assert!(verify_signature(SECRET, 300, &body, &header, now).is_err());
    }

    #[test]
    fn test_verify_rejects_stale_timestamp() {
        let body = completed_body();
        let now = Utc::now();
        let header = signature_header(SECRET, now.timestamp() - 301, &body).unwrap();

        let err = verify_signature(SECRET, 300, &body, &header, now).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Webhook verification failed: Timestamp outside tolerance"
        );
    }

    #[test]
    fn test_verify_rejects_extreme_timestamps() {
        let body = completed_body();
        let now = Utc::now();

        for t in [i64::MIN, i64::MAX] {
            let header = format!("t={},v1={}", t, "00".repeat(32));
            let err = verify_signature(SECRET, 300, &body, &header, now).unwrap_err();
            assert_eq!(
                err.to_string(),
                "Webhook verification failed: Timestamp outside tolerance"
            );
        }
    }

    #[test]
    fn test_parse_event() {
        let event = parse_event(&completed_body(), Verification::Signed).unwrap();

        assert_eq!(event.event_id.as_deref(), Some("evt_test_1"));
        assert_eq!(event.event_type, WebhookEventType::CheckoutCompleted);
        assert_eq!(event.verification, Verification::Signed);
        assert_eq!(event.session_id.as_deref(), Some("cs_test_123"));
        assert_eq!(event.payment_intent_id.as_deref(), Some("pi_test_456"));
        assert_eq!(event.amount_total, Some(1598));
        assert_eq!(event.timestamp.timestamp(), 1700000000);
    }

    #[test]
    fn test_parse_minimal_event() {
        let event = parse_event(
            br#"{"type": "payment_intent.created"}"#,
            Verification::TrustedByConfiguration,
        )
        .unwrap();

        assert!(event.event_id.is_none());
        assert!(event.raw_data.is_none());
        assert_eq!(
            event.event_type,
            WebhookEventType::Other("payment_intent.created".into())
        );
    }

    #[test]
    fn test_parse_event_rejects_malformed() {
        assert!(matches!(
            parse_event(b"not json", Verification::Signed),
            Err(PaymentError::WebhookParseError(_))
        ));
        assert!(parse_event(br#"{"data": {}}"#, Verification::Signed).is_err());
    }

    #[test]
    fn test_checkout_completed_data() {
        let event = parse_event(&completed_body(), Verification::Signed).unwrap();
        let data = CheckoutCompletedData::from_event(&event);

        assert_eq!(data.session_id.as_deref(), Some("cs_test_123"));
        assert_eq!(data.customer_email.as_deref(), Some("test@example.com"));
        assert_eq!(data.currency.as_deref(), Some("eur"));
        assert_eq!(data.payment_status, "unpaid");
        assert_eq!(data.order_id(), Some("ord_abc"));
        assert_eq!(data.dedup_key(), Some("evt_test_1"));
    }

    #[test]
    fn test_dispatch_by_type() {
        let handler = CountingHandler::default();

        let completed = parse_event(&completed_body(), Verification::Signed).unwrap();
        dispatch_webhook_event(&handler, completed).unwrap();

        let other = parse_event(br#"{"type": "charge.succeeded"}"#, Verification::Signed).unwrap();
        dispatch_webhook_event(&handler, other).unwrap();

        assert_eq!(handler.completed.load(Ordering::SeqCst), 1);
        assert_eq!(handler.other.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dedup_runs_fulfillment_once() {
        let handler = DeduplicatingHandler::new(CountingHandler::default());

        for _ in 0..3 {
            let event = parse_event(&completed_body(), Verification::Signed).unwrap();
            dispatch_webhook_event(&handler, event).unwrap();
        }

        assert_eq!(handler.inner().completed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dedup_releases_key_on_failure() {
        let handler = DeduplicatingHandler::new(CountingHandler {
            fail: true,
            ..Default::default()
        });

        for _ in 0..2 {
            let event = parse_event(&completed_body(), Verification::Signed).unwrap();
            assert!(dispatch_webhook_event(&handler, event).is_err());
        }

        assert_eq!(handler.inner().completed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dedup_capacity_evicts_oldest() {
        let handler = DeduplicatingHandler::with_capacity(CountingHandler::default(), 1);
        let data = |id: &str| CheckoutCompletedData {
            event_id: Some(id.to_string()),
            ..Default::default()
        };

        handler.on_checkout_completed(data("evt_a")).unwrap();
        handler.on_checkout_completed(data("evt_b")).unwrap();
        // evt_a was evicted by evt_b
        handler.on_checkout_completed(data("evt_a")).unwrap();

        assert_eq!(handler.inner().completed.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_dedup_without_key_always_runs() {
        let handler = DeduplicatingHandler::new(CountingHandler::default());

        handler.on_checkout_completed(CheckoutCompletedData::default()).unwrap();
        handler.on_checkout_completed(CheckoutCompletedData::default()).unwrap();

        assert_eq!(handler.inner().completed.load(Ordering::SeqCst), 2);
    }
}
