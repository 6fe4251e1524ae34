//! Stripe webhook handler.
//!
//! The raw body is verified against the signing secret before anything is
//! parsed; deliveries that fail verification get a 400 with no detail. Once
//! verified, the response is always a receipt acknowledgment — internal
//! processing problems are logged, never surfaced, because the conditions
//! they represent are already idempotent-safe and a 5xx would only make the
//! provider redeliver them.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use crate::confirm::{self, ConfirmError, PaidSession};
use crate::error::ApiError;
use crate::state::AppState;
use crate::stripe::{SessionMetadata, WebhookEvent};

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was received.
    pub received: bool,
}

/// Handle Stripe webhooks.
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Missing Stripe signature".into()))?;

    // No configured secret means no way to authenticate the delivery, so it
    // is rejected rather than trusted.
    let stripe = state
        .stripe
        .as_ref()
        .ok_or_else(|| ApiError::BadRequest("Webhooks not configured".into()))?;

    stripe
        .verify_webhook_signature(&body, signature)
        .map_err(|e| {
            tracing::warn!(error = %e, "Invalid Stripe webhook signature");
            ApiError::BadRequest("Invalid webhook signature".into())
        })?;

    let event: WebhookEvent =
        serde_json::from_str(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::info!(
        event_type = %event.event_type,
        event_id = %event.id,
        "Received Stripe webhook"
    );

    match event.event_type.as_str() {
        "checkout.session.completed" => {
            handle_checkout_completed(&state, &event.data.object);
        }
        "checkout.session.expired" => {
            handle_checkout_expired(&state, &event.data.object);
        }
        "payment_intent.payment_failed" => {
            handle_payment_failed(&state, &event.data.object);
        }
        _ => {
            tracing::debug!(event_type = %event.event_type, "Unhandled Stripe event");
        }
    }

    Ok(Json(WebhookResponse { received: true }))
}

fn handle_checkout_completed(state: &AppState, object: &serde_json::Value) {
    let session_id = object
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");

    let payment_status = object
        .get("payment_status")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");

    // Only process if payment is complete
    if payment_status != "paid" {
        tracing::info!(
            session_id = %session_id,
            payment_status = %payment_status,
            "Checkout session not paid yet, skipping"
        );
        return;
    }

    let metadata = object
        .get("metadata")
        .and_then(SessionMetadata::from_value);
    let Some(metadata) = metadata else {
        tracing::error!(
            session_id = %session_id,
            "Checkout session missing correlation metadata, unprocessable"
        );
        return;
    };

    let paid = PaidSession {
        session_id: session_id.to_string(),
        payment_intent: object
            .get("payment_intent")
            .and_then(|v| v.as_str())
            .map(String::from),
        metadata,
    };

    match confirm::credit_paid_session(state.store.as_ref(), &paid) {
        Ok(outcome) => {
            tracing::debug!(session_id = %session_id, outcome = ?outcome, "Checkout completion handled");
        }
        Err(ConfirmError::UnknownTransaction(id)) => {
            tracing::error!(
                session_id = %session_id,
                transaction_id = %id,
                "Checkout completion for unknown transaction"
            );
        }
        Err(e) => {
            tracing::error!(
                session_id = %session_id,
                error = %e,
                "Failed to process checkout completion"
            );
        }
    }
}

fn handle_checkout_expired(state: &AppState, object: &serde_json::Value) {
    let Some(session_id) = object.get("id").and_then(|v| v.as_str()) else {
        tracing::error!("Checkout expiry event without a session id");
        return;
    };

    if let Err(e) = confirm::expire_session(state.store.as_ref(), session_id) {
        tracing::error!(
            session_id = %session_id,
            error = %e,
            "Failed to process checkout expiry"
        );
    }
}

fn handle_payment_failed(state: &AppState, object: &serde_json::Value) {
    let Some(payment_intent_id) = object.get("id").and_then(|v| v.as_str()) else {
        tracing::error!("Payment-failed event without a payment intent id");
        return;
    };

    if let Err(e) = confirm::fail_payment(state.store.as_ref(), payment_intent_id) {
        tracing::error!(
            payment_intent_id = %payment_intent_id,
            error = %e,
            "Failed to process payment failure"
        );
    }
}
