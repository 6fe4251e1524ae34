//! Tally HTTP API Service.
//!
//! This crate provides the HTTP API for the tally credit service, including:
//!
//! - Account registration and lookup
//! - Credit balance and the ledger audit trail
//! - Checkout initiation and payment confirmation (Stripe)
//! - Chat conversations with per-message credit debiting
//! - Stripe webhooks
//!
//! # Authentication
//!
//! End-user requests carry a Bearer JWT (HS256, shared secret); the webhook
//! endpoint authenticates by provider signature instead.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers stay async for axum routing consistency

pub mod ai;
pub mod auth;
pub mod confirm;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod stripe;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
pub use stripe::{StripeClient, StripeError};
