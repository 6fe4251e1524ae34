//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, chat, credits, health, payments, webhooks};
use crate::state::AppState;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `GET /v1/payments/plans` - Credit-pack catalog
///
/// ## Accounts (JWT auth)
/// - `POST /v1/accounts` - Register account (idempotent)
/// - `GET /v1/accounts/me` - Get current user's account
///
/// ## Credits (JWT auth)
/// - `GET /v1/credits/balance` - Current balance
/// - `GET /v1/credits/ledger` - Ledger audit trail
///
/// ## Payments (JWT auth)
/// - `POST /v1/payments/checkout` - Initiate credit purchase
/// - `GET /v1/payments/verify/{session_id}` - Verify a checkout session
/// - `GET /v1/payments/history` - Completed purchases
///
/// ## Chat (JWT auth)
/// - `GET|POST /v1/conversations` - List/create conversations
/// - `PUT|DELETE /v1/conversations/{id}` - Rename/delete a conversation
/// - `GET|POST /v1/conversations/{id}/messages` - List/send messages
///
/// ## Webhooks (signature verification)
/// - `POST /webhooks/stripe` - Stripe webhooks
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    // Build CORS layer
    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    Router::new()
        // Health (public)
        .route("/health", get(health::health))
        // Accounts
        .route("/v1/accounts", post(accounts::create_account))
        .route("/v1/accounts/me", get(accounts::get_account))
        // Credits
        .route("/v1/credits/balance", get(credits::get_balance))
        .route("/v1/credits/ledger", get(credits::list_ledger))
        // Payments
        .route("/v1/payments/plans", get(payments::list_plans))
        .route("/v1/payments/checkout", post(payments::create_checkout))
        .route(
            "/v1/payments/verify/:session_id",
            get(payments::verify_session),
        )
        .route("/v1/payments/history", get(payments::payment_history))
        // Chat
        .route("/v1/conversations", get(chat::list_conversations))
        .route("/v1/conversations", post(chat::create_conversation))
        .route("/v1/conversations/:id", put(chat::rename_conversation))
        .route("/v1/conversations/:id", delete(chat::delete_conversation))
        .route("/v1/conversations/:id/messages", get(chat::list_messages))
        .route("/v1/conversations/:id/messages", post(chat::send_message))
        // Webhooks
        .route("/webhooks/stripe", post(webhooks::stripe_webhook))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
