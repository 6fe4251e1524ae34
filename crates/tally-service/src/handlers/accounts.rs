//! Account registration and lookup handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use tally_core::Account;

use crate::auth::{AuthSubject, AuthUser};
use crate::error::ApiError;
use crate::state::AppState;

/// Account registration request.
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    /// Contact email.
    pub email: String,
}

/// Account response.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// User ID.
    pub user_id: String,
    /// Contact email.
    pub email: String,
    /// Spendable credit balance.
    pub credits: i64,
    /// Lifetime purchased credits.
    pub total_purchased: i64,
    /// When the account was created.
    pub created_at: String,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            user_id: account.user_id.to_string(),
            email: account.email.clone(),
            credits: account.credits,
            total_purchased: account.total_purchased,
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

/// Register the authenticated user's account.
///
/// Idempotent: re-registering an existing account returns it unchanged, so
/// the signup grant cannot be farmed by repeating the call.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    auth: AuthSubject,
    Json(body): Json<CreateAccountRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    if body.email.trim().is_empty() {
        return Err(ApiError::BadRequest("Email is required".into()));
    }

    if let Some(existing) = state.store.get_account(&auth.user_id)? {
        return Ok(Json(AccountResponse::from(&existing)));
    }

    let account = Account::new(auth.user_id, body.email.trim());
    state.store.put_account(&account)?;

    tracing::info!(
        user_id = %account.user_id,
        credits = %account.credits,
        "Account created with signup grant"
    );

    Ok(Json(AccountResponse::from(&account)))
}

/// Get the authenticated user's account.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state
        .store
        .get_account(&auth.user_id)?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    Ok(Json(AccountResponse::from(&account)))
}
