//! Application state.

use std::sync::Arc;

use tally_store::Store;

use crate::config::ServiceConfig;
use crate::stripe::StripeClient;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Stripe client for payments (optional).
    pub stripe: Option<Arc<StripeClient>>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        // Create Stripe client if configured
        let stripe = config.stripe_api_key.as_ref().map(|key| {
            tracing::info!("Stripe integration enabled");
            Arc::new(
                StripeClient::new(key, config.stripe_webhook_secret.clone())
                    .with_base_url(&config.stripe_api_base),
            )
        });

        if stripe.is_none() {
            tracing::warn!("Stripe not configured - payments will not be available");
        }

        Self {
            store,
            config,
            stripe,
        }
    }

    /// Check if Stripe is configured.
    #[must_use]
    pub fn has_stripe(&self) -> bool {
        self.stripe.is_some()
    }
}
