//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use tally_store::StoreError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden - valid credentials but the account may not act.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Unknown plan identifier.
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// Insufficient credits.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// The checkout session has not been paid.
    #[error("payment not completed")]
    PaymentNotCompleted,

    /// Checkout session creation failed. The message is logged, never sent.
    #[error("checkout session error: {0}")]
    CheckoutSession(String),

    /// Payment verification failed. The message is logged, never sent.
    #[error("verify payment error: {0}")]
    VerifyPayment(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound("not found".into()),
            StoreError::InsufficientCredits { balance, required } => {
                Self::InsufficientCredits { balance, required }
            }
            StoreError::Database(msg)
            | StoreError::Serialization(msg) => Self::Internal(msg),
            StoreError::DuplicateLedgerEntry { ref_type, ref_id } => {
                // Callers convert duplicates to no-ops before this point;
                // reaching here means a path forgot to.
                Self::Internal(format!("unexpected duplicate ledger entry {ref_type}:{ref_id}"))
            }
        }
    }
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone(), None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::InvalidPlan(plan) => (
                StatusCode::BAD_REQUEST,
                "invalid_plan",
                format!("Unknown plan: {plan}"),
                None,
            ),
            Self::InsufficientCredits { balance, required } => (
                StatusCode::PAYMENT_REQUIRED,
                "insufficient_credits",
                "Insufficient credits".to_string(),
                Some(serde_json::json!({
                    "balance": balance,
                    "required": required
                })),
            ),
            Self::PaymentNotCompleted => (
                StatusCode::BAD_REQUEST,
                "payment_not_completed",
                "Payment not completed".to_string(),
                None,
            ),
            Self::CheckoutSession(msg) => {
                tracing::error!(error = %msg, "Checkout session creation failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "checkout_session_error",
                    "Failed to create checkout session".to_string(),
                    None,
                )
            }
            Self::VerifyPayment(msg) => {
                tracing::error!(error = %msg, "Payment verification failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "verify_payment_error",
                    "Failed to verify payment".to_string(),
                    None,
                )
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}
