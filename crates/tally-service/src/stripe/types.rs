//! Stripe API types.

use serde::Deserialize;

use tally_core::{TransactionId, UserId};

/// Stripe customer object.
#[derive(Debug, Clone, Deserialize)]
pub struct Customer {
    /// Stripe customer ID.
    pub id: String,
    /// Customer email.
    #[serde(default)]
    pub email: Option<String>,
    /// Metadata attached to the customer.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Stripe Checkout session object.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    /// Session ID.
    pub id: String,
    /// Checkout URL to redirect the user to.
    #[serde(default)]
    pub url: Option<String>,
    /// Payment status ("paid", "unpaid", "no_payment_required").
    #[serde(default)]
    pub payment_status: Option<String>,
    /// Customer ID.
    #[serde(default)]
    pub customer: Option<String>,
    /// Total amount in cents.
    #[serde(default)]
    pub amount_total: Option<i64>,
    /// Client reference ID (our `user_id`).
    #[serde(default)]
    pub client_reference_id: Option<String>,
    /// Session status.
    #[serde(default)]
    pub status: Option<String>,
    /// Payment intent ID.
    #[serde(default)]
    pub payment_intent: Option<String>,
    /// Metadata.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Stripe webhook event.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Event ID.
    pub id: String,
    /// Event type (e.g., "checkout.session.completed").
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event data.
    pub data: WebhookEventData,
}

/// Webhook event data container.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    /// The event object.
    pub object: serde_json::Value,
}

/// Stripe API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorResponse {
    /// Error details.
    pub error: StripeErrorDetail,
}

/// Stripe error detail.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorDetail {
    /// Error type.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error message.
    pub message: String,
    /// Error code.
    #[serde(default)]
    pub code: Option<String>,
}

/// The correlation metadata a checkout session must carry.
///
/// The confirmer only ever sees the session payload, so these four keys are
/// the whole correlation contract; a session missing any of them is
/// unprocessable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMetadata {
    /// The purchasing user.
    pub user_id: UserId,
    /// Catalog plan ID.
    pub plan_id: String,
    /// Credits the plan grants.
    pub credits: i64,
    /// Our transaction ID.
    pub transaction_id: TransactionId,
}

impl SessionMetadata {
    /// Parse the metadata object from a session payload.
    ///
    /// Returns `None` if any of the four required keys is missing or
    /// malformed. Stripe metadata values are always strings.
    #[must_use]
    pub fn from_value(metadata: &serde_json::Value) -> Option<Self> {
        let user_id = metadata.get("user_id")?.as_str()?.parse().ok()?;
        let plan_id = metadata.get("plan_id")?.as_str()?.to_string();
        let credits = metadata.get("credits")?.as_str()?.parse().ok()?;
        let transaction_id = metadata.get("transaction_id")?.as_str()?.parse().ok()?;

        Some(Self {
            user_id,
            plan_id,
            credits,
            transaction_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn session_metadata_requires_all_keys() {
        let user_id = UserId::generate();
        let txn_id = TransactionId::generate();

        let full = json!({
            "user_id": user_id.to_string(),
            "plan_id": "starter",
            "credits": "500",
            "transaction_id": txn_id.to_string(),
        });
        let parsed = SessionMetadata::from_value(&full).unwrap();
        assert_eq!(parsed.user_id, user_id);
        assert_eq!(parsed.credits, 500);
        assert_eq!(parsed.transaction_id, txn_id);

        for missing in ["user_id", "plan_id", "credits", "transaction_id"] {
            let mut partial = full.clone();
            partial.as_object_mut().unwrap().remove(missing);
            assert!(
                SessionMetadata::from_value(&partial).is_none(),
                "metadata without {missing} must be unprocessable"
            );
        }
    }

    #[test]
    fn session_metadata_rejects_bad_credits() {
        let meta = json!({
            "user_id": UserId::generate().to_string(),
            "plan_id": "starter",
            "credits": "lots",
            "transaction_id": TransactionId::generate().to_string(),
        });
        assert!(SessionMetadata::from_value(&meta).is_none());
    }
}
