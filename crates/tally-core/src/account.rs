//! Account types for tally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// Credits granted to every account at signup.
pub const SIGNUP_GRANT: i64 = 1250;

/// A user's credit account.
///
/// The balance is authoritative and spendable; it is only ever mutated
/// through the store's atomic delta operations, never by rewriting the
/// whole record around a stale read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// The user ID (from the auth layer).
    pub user_id: UserId,

    /// Contact email, also used for the billing customer.
    pub email: String,

    /// Current spendable credit balance. Never negative.
    pub credits: i64,

    /// Lifetime credits purchased. Monotonically non-decreasing.
    pub total_purchased: i64,

    /// Stripe customer ID. Created lazily on first checkout and stable
    /// once set.
    pub stripe_customer_id: Option<String>,

    /// Whether the account may act. Inactive accounts are rejected by auth.
    pub is_active: bool,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with the signup credit grant.
    #[must_use]
    pub fn new(user_id: UserId, email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            email: email.into(),
            credits: SIGNUP_GRANT,
            total_purchased: 0,
            stripe_customer_id: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check whether the account can cover a deduction.
    #[must_use]
    pub fn has_sufficient_credits(&self, amount: i64) -> bool {
        self.credits >= amount
    }
}
