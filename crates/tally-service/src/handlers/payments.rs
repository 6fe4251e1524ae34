//! Payment handlers: plan catalog, checkout initiation, synchronous
//! verification, and purchase history.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use tally_core::{Transaction, TransactionStatus};

use crate::auth::AuthUser;
use crate::confirm::{self, ConfirmError, ConfirmOutcome, PaidSession};
use crate::error::ApiError;
use crate::state::AppState;
use crate::stripe::SessionMetadata;

/// One plan in the catalog listing.
#[derive(Debug, Serialize)]
pub struct PlanResponse {
    /// Catalog ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Display description.
    pub description: String,
    /// Credits granted.
    pub credits: i64,
    /// Price in cents.
    pub amount_cents: i64,
    /// Price formatted as dollars.
    pub price_formatted: String,
    /// Currency.
    pub currency: String,
    /// Marketing highlight flag.
    pub popular: bool,
}

/// Plan catalog response.
#[derive(Debug, Serialize)]
pub struct ListPlansResponse {
    /// Available plans.
    pub plans: Vec<PlanResponse>,
}

/// List the purchasable credit packs.
pub async fn list_plans(State(state): State<Arc<AppState>>) -> Json<ListPlansResponse> {
    let plans = state
        .config
        .plans
        .all()
        .iter()
        .map(|plan| PlanResponse {
            id: plan.id.clone(),
            name: plan.name.clone(),
            description: plan.description.clone(),
            credits: plan.credits,
            amount_cents: plan.amount_cents,
            price_formatted: format!("${:.2}", plan.amount_cents as f64 / 100.0),
            currency: plan.currency.clone(),
            popular: plan.popular,
        })
        .collect();

    Json(ListPlansResponse { plans })
}

/// Checkout request.
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    /// Catalog plan ID.
    pub plan_id: String,
}

/// Checkout response.
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    /// Stripe checkout session ID.
    pub session_id: String,
    /// Checkout URL to redirect the user to.
    pub url: String,
}

/// Initiate a credit purchase.
///
/// Creates the transaction first, then opens the checkout session carrying
/// `{user_id, plan_id, credits, transaction_id}` as metadata, then binds
/// the session ID back onto the transaction. A transaction stranded in
/// `Created` by a failure after step one grants nothing and reads exactly
/// like an abandoned checkout.
pub async fn create_checkout(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let plan = state
        .config
        .plans
        .get(&body.plan_id)
        .ok_or_else(|| ApiError::InvalidPlan(body.plan_id.clone()))?
        .clone();

    let stripe = state
        .stripe
        .as_ref()
        .ok_or_else(|| ApiError::CheckoutSession("Stripe not configured".into()))?;

    let mut account = state
        .store
        .get_account(&auth.user_id)?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    // Lazily create the billing customer; once set it is reused for every
    // future purchase.
    let customer_id = match account.stripe_customer_id.clone() {
        Some(id) => id,
        None => {
            let customer = stripe
                .create_customer(&auth.user_id.to_string(), &account.email)
                .await
                .map_err(|e| ApiError::CheckoutSession(e.to_string()))?;

            account.stripe_customer_id = Some(customer.id.clone());
            account.updated_at = chrono::Utc::now();
            state.store.put_account(&account)?;

            tracing::info!(
                user_id = %auth.user_id,
                customer_id = %customer.id,
                "Stripe customer created"
            );
            customer.id
        }
    };

    let mut txn = Transaction::for_plan(auth.user_id, &plan);
    state.store.put_transaction(&txn)?;

    tracing::info!(
        user_id = %auth.user_id,
        plan_id = %plan.id,
        transaction_id = %txn.id,
        amount_cents = %plan.amount_cents,
        "Initiating credit purchase"
    );

    let success_url = format!(
        "{}/purchase-success?session_id={{CHECKOUT_SESSION_ID}}",
        state.config.frontend_url
    );
    let cancel_url = format!("{}/purchase-credits?canceled=true", state.config.frontend_url);

    let session = stripe
        .create_checkout_session(
            &customer_id,
            &auth.user_id.to_string(),
            &plan,
            &txn.id.to_string(),
            &success_url,
            &cancel_url,
        )
        .await
        .map_err(|e| ApiError::CheckoutSession(e.to_string()))?;

    let url = session
        .url
        .clone()
        .ok_or_else(|| ApiError::CheckoutSession("Stripe returned no checkout URL".into()))?;

    txn.bind_session(&session.id)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    state.store.put_transaction(&txn)?;

    tracing::info!(
        user_id = %auth.user_id,
        transaction_id = %txn.id,
        session_id = %session.id,
        "Stripe checkout session created"
    );

    Ok(Json(CheckoutResponse {
        session_id: session.id,
        url,
    }))
}

/// Verify response.
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    /// Human-readable outcome.
    pub message: String,
    /// Whether an earlier attempt already granted the credits.
    pub already_processed: bool,
    /// Credits granted by the purchase.
    pub credits: i64,
    /// Current balance, when this call granted the credits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<i64>,
}

/// Synchronously verify a checkout session (redirect/polling path).
///
/// Safe against the browser re-invoking it: the crediting sequence it
/// shares with the webhook no-ops on duplicates.
pub async fn verify_session(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let stripe = state
        .stripe
        .as_ref()
        .ok_or_else(|| ApiError::VerifyPayment("Stripe not configured".into()))?;

    let session = stripe
        .get_checkout_session(&session_id)
        .await
        .map_err(|e| ApiError::VerifyPayment(e.to_string()))?;

    if session.payment_status.as_deref() != Some("paid") {
        return Err(ApiError::PaymentNotCompleted);
    }

    let metadata = SessionMetadata::from_value(&session.metadata)
        .ok_or_else(|| ApiError::BadRequest("Session metadata is incomplete".into()))?;

    let paid = PaidSession {
        session_id: session.id.clone(),
        payment_intent: session.payment_intent.clone(),
        metadata,
    };

    let outcome = confirm::credit_paid_session(state.store.as_ref(), &paid).map_err(|e| match e {
        ConfirmError::UnknownTransaction(id) => {
            ApiError::NotFound(format!("Transaction not found: {id}"))
        }
        ConfirmError::OwnerMismatch { .. } => {
            ApiError::BadRequest("Session metadata is inconsistent".into())
        }
        ConfirmError::Store(err) => err.into(),
    })?;

    let response = match outcome {
        ConfirmOutcome::Credited {
            credits, balance, ..
        } => VerifyResponse {
            message: "Payment verified and credits added".into(),
            already_processed: false,
            credits,
            balance: Some(balance),
        },
        ConfirmOutcome::AlreadyProcessed => VerifyResponse {
            message: "Payment already processed".into(),
            already_processed: true,
            credits: paid.metadata.credits,
            balance: None,
        },
    };

    Ok(Json(response))
}

/// Payment history query parameters.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Maximum number of purchases to return (default: 10, max: 100).
    #[serde(default = "default_history_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_history_limit() -> usize {
    10
}

/// One purchase in the history listing.
#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    /// Transaction ID.
    pub id: String,
    /// Plan bought.
    pub plan_id: String,
    /// Credits granted.
    pub credits: i64,
    /// Price in cents.
    pub amount_cents: i64,
    /// Currency.
    pub currency: String,
    /// Transaction status.
    pub status: String,
    /// Timestamp.
    pub created_at: String,
}

impl From<&Transaction> for PurchaseResponse {
    fn from(txn: &Transaction) -> Self {
        Self {
            id: txn.id.to_string(),
            plan_id: txn.plan_id.clone(),
            credits: txn.credits,
            amount_cents: txn.amount_cents,
            currency: txn.currency.clone(),
            status: format!("{:?}", txn.status).to_lowercase(),
            created_at: txn.created_at.to_rfc3339(),
        }
    }
}

/// Payment history response.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// Completed purchases (newest first).
    pub payments: Vec<PurchaseResponse>,
    /// Whether there are more purchases.
    pub has_more: bool,
}

/// List the user's completed purchases.
pub async fn payment_history(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let limit = query.limit.min(100);

    // Over-fetch because non-paid attempts are filtered out of the page.
    let transactions =
        state
            .store
            .list_transactions_by_user(&auth.user_id, limit * 2 + 1, query.offset)?;

    let paid: Vec<_> = transactions
        .iter()
        .filter(|t| t.status == TransactionStatus::Paid)
        .collect();

    let has_more = paid.len() > limit;
    let payments: Vec<_> = paid
        .into_iter()
        .take(limit)
        .map(PurchaseResponse::from)
        .collect();

    Ok(Json(HistoryResponse { payments, has_more }))
}
