//! Database schema definitions and column families.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary account records, keyed by `user_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Purchase transactions, keyed by `transaction_id` (ULID).
    pub const TRANSACTIONS: &str = "transactions";

    /// Index: transactions by user, keyed by `user_id || transaction_id`.
    /// Value is empty (index only).
    pub const TRANSACTIONS_BY_USER: &str = "transactions_by_user";

    /// Index: checkout session ID -> transaction ID.
    pub const TRANSACTIONS_BY_SESSION: &str = "transactions_by_session";

    /// Index: payment-intent ID -> transaction ID.
    pub const TRANSACTIONS_BY_INTENT: &str = "transactions_by_intent";

    /// Ledger entries, keyed by `entry_id` (ULID).
    pub const LEDGER: &str = "ledger";

    /// Uniqueness guard: `ref_type:ref_id` -> entry ID. At most one entry
    /// may ever exist per reference.
    pub const LEDGER_BY_REF: &str = "ledger_by_ref";

    /// Index: ledger entries by user, keyed by `user_id || entry_id`.
    pub const LEDGER_BY_USER: &str = "ledger_by_user";

    /// Conversations, keyed by `conversation_id` (ULID).
    pub const CONVERSATIONS: &str = "conversations";

    /// Index: conversations by user, keyed by `user_id || conversation_id`.
    pub const CONVERSATIONS_BY_USER: &str = "conversations_by_user";

    /// Messages, keyed by `conversation_id || message_id`.
    pub const MESSAGES: &str = "messages";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::TRANSACTIONS,
        cf::TRANSACTIONS_BY_USER,
        cf::TRANSACTIONS_BY_SESSION,
        cf::TRANSACTIONS_BY_INTENT,
        cf::LEDGER,
        cf::LEDGER_BY_REF,
        cf::LEDGER_BY_USER,
        cf::CONVERSATIONS,
        cf::CONVERSATIONS_BY_USER,
        cf::MESSAGES,
    ]
}
