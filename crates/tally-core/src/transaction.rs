//! Purchase transactions and their state machine.
//!
//! A `Transaction` records one checkout attempt. Its status moves from
//! `Created` toward `{Paid | Failed | Expired}`, and `Paid` is absorbing:
//! the transition methods reject every move out of it, so the confirmer
//! cannot regress a paid transaction no matter how late a failure or expiry
//! event arrives. `Failed` is not absorbing because the provider lets the
//! user retry payment within the same checkout session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Plan, TransactionId, UserId};

/// One credit-purchase attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID (ULID for time-ordering).
    pub id: TransactionId,

    /// The purchasing user.
    pub user_id: UserId,

    /// The plan bought, by catalog ID.
    pub plan_id: String,

    /// Credits to grant on successful payment. Copied from the plan at
    /// creation so confirmation never re-resolves the catalog.
    pub credits: i64,

    /// Price charged, in cents.
    pub amount_cents: i64,

    /// Price currency (lowercase ISO code).
    pub currency: String,

    /// Stripe Checkout session ID. Assigned once the session is opened,
    /// immutable thereafter.
    pub session_id: Option<String>,

    /// Stripe payment-intent ID. Assigned on confirmation.
    pub payment_intent_id: Option<String>,

    /// Current lifecycle status.
    pub status: TransactionStatus,

    /// Mirror of "status is still in flight".
    pub pending: bool,

    /// When the transaction was created.
    pub created_at: DateTime<Utc>,

    /// When the transaction was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a transaction in `Created` state for a plan purchase.
    #[must_use]
    pub fn for_plan(user_id: UserId, plan: &Plan) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::generate(),
            user_id,
            plan_id: plan.id.clone(),
            credits: plan.credits,
            amount_cents: plan.amount_cents,
            currency: plan.currency.clone(),
            session_id: None,
            payment_intent_id: None,
            status: TransactionStatus::Created,
            pending: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Bind the external checkout session ID.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError::SessionAlreadyBound` if a session ID was
    /// already assigned.
    pub fn bind_session(&mut self, session_id: impl Into<String>) -> Result<(), TransitionError> {
        if self.session_id.is_some() {
            return Err(TransitionError::SessionAlreadyBound { id: self.id });
        }
        self.session_id = Some(session_id.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Transition to `Paid`, recording the payment intent when the provider
    /// reported one.
    ///
    /// Allowed from any non-`Paid` state: a payment-failed event can precede
    /// a successful retry on the same checkout session, so `Failed` must not
    /// block confirmation.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError::AlreadyTerminal` if the transaction is
    /// already `Paid`.
    pub fn mark_paid(&mut self, payment_intent_id: Option<String>) -> Result<(), TransitionError> {
        if self.status == TransactionStatus::Paid {
            return Err(TransitionError::AlreadyTerminal {
                id: self.id,
                status: self.status,
            });
        }
        self.status = TransactionStatus::Paid;
        self.pending = false;
        if payment_intent_id.is_some() {
            self.payment_intent_id = payment_intent_id;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Transition `Created -> Expired`.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError::AlreadyTerminal` unless the transaction is
    /// still `Created`.
    pub fn mark_expired(&mut self) -> Result<(), TransitionError> {
        if self.status != TransactionStatus::Created {
            return Err(TransitionError::AlreadyTerminal {
                id: self.id,
                status: self.status,
            });
        }
        self.status = TransactionStatus::Expired;
        self.pending = false;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Transition to `Failed` from any non-`Paid` state.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError::AlreadyTerminal` if the transaction is
    /// already `Paid`.
    pub fn mark_failed(&mut self) -> Result<(), TransitionError> {
        if self.status == TransactionStatus::Paid {
            return Err(TransitionError::AlreadyTerminal {
                id: self.id,
                status: self.status,
            });
        }
        self.status = TransactionStatus::Failed;
        self.pending = false;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Lifecycle status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Checkout initiated; no payment outcome yet.
    Created,

    /// Payment confirmed and credits granted (or granting).
    Paid,

    /// Payment failed at the provider.
    Failed,

    /// Checkout session expired without payment.
    Expired,
}

impl TransactionStatus {
    /// Whether this status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Created)
    }
}

/// An invalid state-machine transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// The transaction already reached a terminal status.
    #[error("transaction {id} is already {status:?}")]
    AlreadyTerminal {
        /// The transaction.
        id: TransactionId,
        /// Its current status.
        status: TransactionStatus,
    },

    /// The checkout session ID was already assigned.
    #[error("transaction {id} already has a checkout session bound")]
    SessionAlreadyBound {
        /// The transaction.
        id: TransactionId,
    },
}
