//! Stripe integration for payments and customer management.
//!
//! Stripe handles:
//! - Customer registration (lazy, on first checkout)
//! - Credit purchases via Checkout
//! - Webhook delivery of payment events

pub mod client;
pub mod types;

pub use client::StripeClient;
pub use client::StripeError;
pub use types::*;
