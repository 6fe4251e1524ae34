//! Error types for tally storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("not found")]
    NotFound,

    /// Insufficient credits for a debit.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// A ledger entry for this reference already exists (idempotency guard).
    #[error("duplicate ledger entry for {ref_type}:{ref_id}")]
    DuplicateLedgerEntry {
        /// Reference type.
        ref_type: String,
        /// Reference ID.
        ref_id: String,
    },
}
