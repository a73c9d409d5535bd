//! # Request Handlers
//!
//! Axum request handlers for session creation and webhooks.
//! Static pages are plain file services wired up in `routes`.

use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use pay_core::{LineItem, Order, PaymentError, Verification};
use pay_stripe::{dispatch_webhook_event, SIGNATURE_HEADER};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Create session request, as posted by the checkout page
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Items to purchase
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

/// Create session response
#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    /// Checkout Session ID
    pub session: String,
    /// Hosted payment page (redirect user here)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
        }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Client-supplied key for repeated submissions of the same cart
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Stripe rejects idempotency keys longer than this
const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

fn payment_error_to_response(err: PaymentError) -> ApiError {
    let code = err.status_code();
    let response = ErrorResponse::new(err.to_string(), code);
    (
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(response),
    )
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "checkout-server",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Create a hosted Checkout Session for the posted cart
#[instrument(skip(state, request), fields(items = request.line_items.len()))]
pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    if request.line_items.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("No items in checkout request (provide 'lineItems')", 400)),
        ));
    }

    let mut order = Order::from_items(request.line_items);

    if let Some(key) = headers.get(IDEMPOTENCY_KEY_HEADER) {
        let key = key
            .to_str()
            .ok()
            .map(str::trim)
            .filter(|k| !k.is_empty() && k.len() <= MAX_IDEMPOTENCY_KEY_LEN)
            .ok_or_else(|| {
                (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse::new("Invalid Idempotency-Key header", 400)),
                )
            })?;
        order = order.with_idempotency_key(key);
    }
    let success_url = state.success_url();
    let cancel_url = state.cancel_url();

    info!(
        "Creating checkout: order={}, {} units, success_url={}",
        order.id,
        order.item_count(),
        success_url
    );

    let session = state
        .strategy
        .create_checkout(&order, &success_url, &cancel_url)
        .await
        .map_err(|e| {
            error!("Failed to create checkout: {}", e);
            payment_error_to_response(e)
        })?;

    info!("Created checkout session: {}", session.session_id);

    Ok(Json(CreateSessionResponse {
        session: session.session_id,
        url: session.checkout_url,
    }))
}

/// Handle a payment platform webhook.
///
/// Takes the body as raw `Bytes`; signatures are computed over the exact
/// bytes sent.
#[instrument(skip(state, headers, body), fields(len = body.len()))]
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let event = state
        .strategy
        .verify_webhook(&body, signature)
        .await
        .map_err(|e| {
            match &e {
                PaymentError::WebhookVerificationFailed(_) => {
                    warn!("⚠️  Webhook signature verification failed: {}", e)
                }
                _ => warn!("Rejected webhook body: {}", e),
            }
            payment_error_to_response(e)
        })?;

    if event.verification == Verification::TrustedByConfiguration {
        warn!("Webhook accepted without signature check (no signing secret configured)");
    }

    info!(
        "Received webhook: type={}, id={:?}",
        event.event_type, event.event_id
    );

    dispatch_webhook_event(state.webhook_handler.as_ref(), event).map_err(|e| {
        error!("Webhook handler error: {}", e);
        payment_error_to_response(e)
    })?;

    Ok(StatusCode::OK)
}
