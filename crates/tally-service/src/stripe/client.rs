//! Stripe API client implementation.

use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;

use tally_core::Plan;

use super::types::{CheckoutSession, Customer, StripeErrorResponse};

/// Error type for Stripe operations.
#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Stripe API returned an error.
    #[error("Stripe API error: {error_type} - {message}")]
    Api {
        /// Error type.
        error_type: String,
        /// Error message.
        message: String,
        /// Error code.
        code: Option<String>,
    },

    /// Invalid webhook signature.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Stripe API client.
#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    api_key: String,
    webhook_secret: Option<String>,
    base_url: String,
}

impl StripeClient {
    /// Stripe API base URL.
    const BASE_URL: &'static str = "https://api.stripe.com/v1";

    /// Create a new Stripe client.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Stripe secret API key (`sk_test_...` or `sk_live_...`)
    /// * `webhook_secret` - Optional webhook signing secret (whsec_...)
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>, webhook_secret: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key: api_key.into(),
            webhook_secret,
            base_url: Self::BASE_URL.to_string(),
        }
    }

    /// Override the API base URL (tests point this at a mock server).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Create a new Stripe customer.
    ///
    /// # Arguments
    ///
    /// * `user_id` - Our internal user ID (stored as metadata)
    /// * `email` - Customer email
    pub async fn create_customer(
        &self,
        user_id: &str,
        email: &str,
    ) -> Result<Customer, StripeError> {
        let mut params = HashMap::new();
        params.insert("metadata[user_id]", user_id.to_string());
        params.insert("email", email.to_string());

        let response = self
            .client
            .post(format!("{}/customers", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&params)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Create a Checkout session for purchasing a credit pack.
    ///
    /// The session metadata carries the full correlation contract
    /// (`user_id`, `plan_id`, `credits`, `transaction_id`) because the
    /// confirmer has nothing but the session payload to work from.
    ///
    /// # Arguments
    ///
    /// * `customer_id` - Stripe customer ID
    /// * `user_id` - Our internal user ID (`client_reference_id`)
    /// * `plan` - The credit pack being purchased
    /// * `transaction_id` - Our transaction record for this attempt
    /// * `success_url` / `cancel_url` - Redirect targets
    pub async fn create_checkout_session(
        &self,
        customer_id: &str,
        user_id: &str,
        plan: &Plan,
        transaction_id: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession, StripeError> {
        let params = vec![
            ("mode", "payment".to_string()),
            ("customer", customer_id.to_string()),
            ("success_url", success_url.to_string()),
            ("cancel_url", cancel_url.to_string()),
            ("client_reference_id", user_id.to_string()),
            (
                "line_items[0][price_data][currency]",
                plan.currency.clone(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                plan.name.clone(),
            ),
            (
                "line_items[0][price_data][product_data][description]",
                plan.description.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]",
                plan.amount_cents.to_string(),
            ),
            ("line_items[0][quantity]", "1".to_string()),
            ("metadata[user_id]", user_id.to_string()),
            ("metadata[plan_id]", plan.id.clone()),
            ("metadata[credits]", plan.credits.to_string()),
            ("metadata[transaction_id]", transaction_id.to_string()),
        ];

        tracing::debug!(
            user_id = %user_id,
            plan_id = %plan.id,
            amount_cents = %plan.amount_cents,
            transaction_id = %transaction_id,
            "Creating Stripe checkout session"
        );

        let response = self
            .client
            .post(format!("{}/checkout/sessions", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&params)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Retrieve a Checkout session by ID.
    pub async fn get_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, StripeError> {
        let response = self
            .client
            .get(format!("{}/checkout/sessions/{}", self.base_url, session_id))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Verify a webhook signature.
    ///
    /// # Arguments
    ///
    /// * `payload` - Raw request body
    /// * `signature` - Value of the `Stripe-Signature` header
    ///
    /// # Errors
    ///
    /// Returns `StripeError::InvalidSignature` if no candidate signature
    /// matches, or `StripeError::Configuration` without a webhook secret.
    pub fn verify_webhook_signature(
        &self,
        payload: &str,
        signature: &str,
    ) -> Result<(), StripeError> {
        let secret = self
            .webhook_secret
            .as_ref()
            .ok_or_else(|| StripeError::Configuration("Webhook secret not configured".into()))?;

        // Parse the signature header
        // Format: t=timestamp,v1=signature,v1=signature2,...
        let mut timestamp: Option<&str> = None;
        let mut signatures: Vec<&str> = Vec::new();

        for part in signature.split(',') {
            let mut kv = part.splitn(2, '=');
            match (kv.next(), kv.next()) {
                (Some("t"), Some(ts)) => timestamp = Some(ts),
                (Some("v1"), Some(sig)) => signatures.push(sig),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(StripeError::InvalidSignature)?;

        if signatures.is_empty() {
            return Err(StripeError::InvalidSignature);
        }

        // Compute expected signature
        let signed_payload = format!("{timestamp}.{payload}");
        let expected = compute_hmac_sha256(secret, &signed_payload);

        // Check if any signature matches (constant-time comparison)
        let valid = signatures.iter().any(|sig| constant_time_eq(&expected, sig));

        if valid {
            Ok(())
        } else {
            Err(StripeError::InvalidSignature)
        }
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, StripeError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        // Try to parse error response
        let error_body: Result<StripeErrorResponse, _> = response.json().await;

        match error_body {
            Ok(stripe_error) => Err(StripeError::Api {
                error_type: stripe_error.error.error_type,
                message: stripe_error.error.message,
                code: stripe_error.error.code,
            }),
            Err(_) => Err(StripeError::Api {
                error_type: "unknown".to_string(),
                message: format!("HTTP {status}"),
                code: None,
            }),
        }
    }
}

/// HMAC block size for SHA256 is 64 bytes.
const HMAC_BLOCK_SIZE: usize = 64;

/// Compute HMAC-SHA256 and return hex-encoded result.
fn compute_hmac_sha256(secret: &str, message: &str) -> String {
    use sha2::{Digest, Sha256};

    let key = secret.as_bytes();
    let message = message.as_bytes();

    // If key is longer than block size, hash it first
    let key = if key.len() > HMAC_BLOCK_SIZE {
        let mut hasher = Sha256::new();
        hasher.update(key);
        hasher.finalize().to_vec()
    } else {
        key.to_vec()
    };

    // Pad key to block size
    let mut key_padded = [0u8; HMAC_BLOCK_SIZE];
    key_padded[..key.len()].copy_from_slice(&key);

    // Create inner and outer padded keys
    let mut i_key_pad = [0x36u8; HMAC_BLOCK_SIZE];
    let mut o_key_pad = [0x5cu8; HMAC_BLOCK_SIZE];

    for i in 0..HMAC_BLOCK_SIZE {
        i_key_pad[i] ^= key_padded[i];
        o_key_pad[i] ^= key_padded[i];
    }

    // Inner hash: H(i_key_pad || message)
    let mut inner_hasher = Sha256::new();
    inner_hasher.update(i_key_pad);
    inner_hasher.update(message);
    let inner_hash = inner_hasher.finalize();

    // Outer hash: H(o_key_pad || inner_hash)
    let mut outer_hasher = Sha256::new();
    outer_hasher.update(o_key_pad);
    outer_hasher.update(inner_hash);
    let hmac = outer_hasher.finalize();

    // Convert to hex
    hex::encode(hmac)
}

/// Constant-time string comparison.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        let client = StripeClient::new("sk_test_xxx", None);
        assert!(client.webhook_secret.is_none());
        assert_eq!(client.base_url, StripeClient::BASE_URL);
    }

    #[test]
    fn base_url_override() {
        let client = StripeClient::new("sk_test_xxx", None).with_base_url("http://localhost:9999");
        assert_eq!(client.base_url, "http://localhost:9999");
    }

    #[test]
    fn hmac_sha256_known_vector() {
        // RFC 2202 test case 2
        let result = compute_hmac_sha256("Jefe", "what do ya want for nothing?");
        assert_eq!(
            result,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn webhook_signature_roundtrip() {
        let client = StripeClient::new("sk_test_xxx", Some("whsec_test".to_string()));
        let payload = r#"{"id":"evt_1","type":"checkout.session.completed"}"#;
        let timestamp = "1700000000";

        let signature = compute_hmac_sha256("whsec_test", &format!("{timestamp}.{payload}"));
        let header = format!("t={timestamp},v1={signature}");

        assert!(client.verify_webhook_signature(payload, &header).is_ok());

        let bad_header = format!("t={timestamp},v1=deadbeef");
        assert!(matches!(
            client.verify_webhook_signature(payload, &bad_header),
            Err(StripeError::InvalidSignature)
        ));

        // A tampered payload must fail against the original signature.
        let tampered = payload.replace("evt_1", "evt_2");
        assert!(client.verify_webhook_signature(&tampered, &header).is_err());
    }

    #[test]
    fn signature_header_without_timestamp_is_invalid() {
        let client = StripeClient::new("sk_test_xxx", Some("whsec_test".to_string()));
        assert!(matches!(
            client.verify_webhook_signature("{}", "v1=abc"),
            Err(StripeError::InvalidSignature)
        ));
    }

    #[test]
    fn constant_time_eq_works() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "ab"));
    }
}
