//! The credit ledger.
//!
//! Every granted purchase produces exactly one `LedgerEntry`, keyed by the
//! `(ref_type, ref_id)` pair of its cause. The store enforces that pair's
//! uniqueness, which is what makes crediting idempotent: of any number of
//! concurrent confirmation attempts for one transaction, exactly one ledger
//! insert succeeds and only that attempt mutates the balance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{LedgerEntryId, TransactionId, UserId};

/// An immutable record of a single credit change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry ID (ULID).
    pub id: LedgerEntryId,

    /// The account whose balance changed.
    pub user_id: UserId,

    /// Signed credit delta. Positive grants, negative removes.
    pub delta: i64,

    /// Why the balance changed.
    pub reason: LedgerReason,

    /// The causing record. Unique store-wide.
    #[serde(flatten)]
    pub reference: LedgerRef,

    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Create the purchase entry for a paid transaction.
    #[must_use]
    pub fn purchase(user_id: UserId, credits: i64, transaction_id: TransactionId) -> Self {
        Self {
            id: LedgerEntryId::generate(),
            user_id,
            delta: credits,
            reason: LedgerReason::Purchase,
            reference: LedgerRef {
                ref_type: RefType::Transaction,
                ref_id: transaction_id.to_string(),
            },
            created_at: Utc::now(),
        }
    }
}

/// Why a ledger entry exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerReason {
    /// Credits granted by a confirmed purchase.
    Purchase,

    /// Credits spent on a chat message.
    Message,

    /// Credits restored after a failed dependent write.
    Rollback,
}

/// The `(ref_type, ref_id)` pair identifying an entry's cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRef {
    /// Kind of the referenced record.
    pub ref_type: RefType,

    /// Identifier of the referenced record.
    pub ref_id: String,
}

/// Kinds of records a ledger entry can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefType {
    /// A purchase transaction.
    Transaction,
}

impl RefType {
    /// Stable name used in index keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
        }
    }
}
