//! Credit balance and ledger handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use tally_core::LedgerEntry;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Spendable credit balance.
    pub credits: i64,
    /// Lifetime purchased credits.
    pub total_purchased: i64,
}

/// Get current credit balance.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let account = state
        .store
        .get_account(&auth.user_id)?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    Ok(Json(BalanceResponse {
        credits: account.credits,
        total_purchased: account.total_purchased,
    }))
}

/// Ledger list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListLedgerQuery {
    /// Maximum number of entries to return (default: 50).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// Ledger entry response.
#[derive(Debug, Serialize)]
pub struct LedgerEntryResponse {
    /// Entry ID.
    pub id: String,
    /// Signed credit delta.
    pub delta: i64,
    /// Why the balance changed.
    pub reason: String,
    /// Kind of the causing record.
    pub ref_type: String,
    /// ID of the causing record.
    pub ref_id: String,
    /// Timestamp.
    pub created_at: String,
}

impl From<&LedgerEntry> for LedgerEntryResponse {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            delta: entry.delta,
            reason: format!("{:?}", entry.reason).to_lowercase(),
            ref_type: entry.reference.ref_type.as_str().to_string(),
            ref_id: entry.reference.ref_id.clone(),
            created_at: entry.created_at.to_rfc3339(),
        }
    }
}

/// Ledger list response.
#[derive(Debug, Serialize)]
pub struct ListLedgerResponse {
    /// Entries (newest first).
    pub entries: Vec<LedgerEntryResponse>,
    /// Whether there are more entries.
    pub has_more: bool,
}

/// List the user's ledger audit trail.
pub async fn list_ledger(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<ListLedgerQuery>,
) -> Result<Json<ListLedgerResponse>, ApiError> {
    // Verify account exists
    state
        .store
        .get_account(&auth.user_id)?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    // Fetch one more than requested to determine has_more
    let limit = query.limit.min(100);
    let entries = state
        .store
        .list_ledger_by_user(&auth.user_id, limit + 1, query.offset)?;

    let has_more = entries.len() > limit;
    let entries: Vec<_> = entries
        .iter()
        .take(limit)
        .map(LedgerEntryResponse::from)
        .collect();

    Ok(Json(ListLedgerResponse { entries, has_more }))
}
