//! # Stripe Checkout Sessions
//!
//! Implementation of the Stripe Checkout Sessions API.
//! Sessions are card-only and use manual capture.

use crate::config::StripeConfig;
use crate::webhook::{parse_event, verify_signature};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pay_core::{
    CheckoutSession, Order, PaymentError, PaymentResult, PaymentStrategy, Verification,
    WebhookEvent,
};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info, instrument, warn};

/// Stripe Checkout Session strategy
///
/// Uses Stripe's hosted checkout page; card data never touches this server.
pub struct StripeCheckoutStrategy {
    config: StripeConfig,
    client: Client,
}

impl StripeCheckoutStrategy {
    /// Create a new Stripe checkout strategy
    pub fn new(config: StripeConfig) -> PaymentResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PaymentError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Create from environment variables
    pub fn from_env() -> PaymentResult<Self> {
        let config = StripeConfig::from_env()?;
        Self::new(config)
    }

    /// Form params for `POST /v1/checkout/sessions`
    fn session_params(order: &Order, success_url: &str, cancel_url: &str) -> Vec<(String, String)> {
        let mut form_params: Vec<(String, String)> = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), success_url.to_string()),
            ("cancel_url".to_string(), cancel_url.to_string()),
            (
                "payment_intent_data[capture_method]".to_string(),
                order.capture_method.as_str().to_string(),
            ),
            ("metadata[order_id]".to_string(), order.id.clone()),
        ];

        for (i, method) in order.payment_method_types.iter().enumerate() {
            form_params.push((format!("payment_method_types[{}]", i), method.clone()));
        }

        for (i, item) in order.line_items.iter().enumerate() {
            form_params.push((
                format!("line_items[{}][price_data][currency]", i),
                item.currency_code(),
            ));
            form_params.push((
                format!("line_items[{}][price_data][unit_amount]", i),
                item.amount.to_string(),
            ));
            form_params.push((
                format!("line_items[{}][price_data][product_data][name]", i),
                item.name.clone(),
            ));
            form_params.push((
                format!("line_items[{}][quantity]", i),
                item.quantity.to_string(),
            ));
        }

        form_params
    }

    /// One POST to Stripe, no retries
    async fn post_session(
        &self,
        form_params: &[(String, String)],
        idempotency_key: &str,
    ) -> PaymentResult<StripeCheckoutSessionResponse> {
        let url = format!("{}/v1/checkout/sessions", self.config.api_base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.config.auth_header())
            .header("Stripe-Version", &self.config.api_version)
            .header("Idempotency-Key", idempotency_key)
            .form(form_params)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            error!("Stripe API error: status={}, body={}", status, body);

            let message = serde_json::from_str::<StripeErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| body.clone());

            return Err(PaymentError::ProviderError {
                provider: "stripe".to_string(),
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            PaymentError::Serialization(format!("Failed to parse Stripe response: {}", e))
        })
    }
}

fn transport_error(e: reqwest::Error) -> PaymentError {
    if e.is_timeout() {
        PaymentError::Timeout(e.to_string())
    } else {
        PaymentError::NetworkError(e.to_string())
    }
}

#[async_trait]
impl PaymentStrategy for StripeCheckoutStrategy {
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn create_checkout(
        &self,
        order: &Order,
        success_url: &str,
        cancel_url: &str,
    ) -> PaymentResult<CheckoutSession> {
        if order.is_empty() {
            return Err(PaymentError::InvalidRequest(
                "Order has no items".to_string(),
            ));
        }

        let form_params = Self::session_params(order, success_url, cancel_url);

        debug!(
            "Creating Stripe checkout session: {} line items, capture={}",
            order.line_items.len(),
            order.capture_method.as_str()
        );

        // The idempotency key stays the same across attempts, so a retry after
        // a lost response returns the session Stripe already created.
        let mut attempt = 0;
        let session_response = loop {
            match self.post_session(&form_params, &order.idempotency_key).await {
                Ok(session) => break session,
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.retry_backoff * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    warn!(
                        "Stripe call failed ({}), retry {}/{} in {:?}",
                        e, attempt, self.config.max_retries, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        };

        info!(
            "Created Stripe checkout session: id={}, url={:?}",
            session_response.id, session_response.url
        );

        Ok(CheckoutSession {
            session_id: session_response.id,
            order_id: order.id.clone(),
            provider: "stripe".to_string(),
            checkout_url: session_response.url,
            expires_at: session_response
                .expires_at
                .and_then(|ts| DateTime::from_timestamp(ts, 0)),
            created_at: Utc::now(),
        })
    }

    #[instrument(skip(self, payload, signature))]
    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> PaymentResult<WebhookEvent> {
        let Some(secret) = self.config.webhook_secret.as_deref() else {
            return parse_event(payload, Verification::TrustedByConfiguration);
        };

        let signature = signature.ok_or_else(|| {
            PaymentError::WebhookVerificationFailed("Missing Stripe-Signature header".to_string())
        })?;

        verify_signature(
            secret,
            self.config.webhook_tolerance_secs,
            payload,
            signature,
            Utc::now(),
        )?;

        parse_event(payload, Verification::Signed)
    }

    fn webhook_signing_enabled(&self) -> bool {
        self.config.webhook_secret.is_some()
    }

    fn provider_name(&self) -> &'static str {
        "stripe"
    }
}

// =============================================================================
// Stripe API Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct StripeCheckoutSessionResponse {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    message: String,
}
