//! `RocksDB` storage layer for tally.
//!
//! This crate provides persistent storage for accounts, purchase
//! transactions, the credit ledger, and chat data using `RocksDB` with
//! column families for efficient indexing.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `accounts`: Primary account records, keyed by `user_id`
//! - `transactions`: Purchase transactions, keyed by `transaction_id` (ULID)
//! - `transactions_by_user` / `transactions_by_session` /
//!   `transactions_by_intent`: Transaction indexes
//! - `ledger` / `ledger_by_user`: Credit ledger entries and user index
//! - `ledger_by_ref`: The `(ref_type, ref_id)` uniqueness guard
//! - `conversations` / `conversations_by_user` / `messages`: Chat data
//!
//! # Example
//!
//! ```no_run
//! use tally_store::{RocksStore, Store};
//! use tally_core::{Account, UserId};
//!
//! let store = RocksStore::open("/tmp/tally-db").unwrap();
//!
//! let account = Account::new(UserId::generate(), "user@example.com");
//! store.put_account(&account).unwrap();
//!
//! let balance = store.debit_credits(&account.user_id, 1).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use tally_core::{
    Account, Conversation, ConversationId, LedgerEntry, Message, RefType, Transaction,
    TransactionId, UserId,
};

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different
/// implementations (e.g. `RocksDB`, wrappers for testing).
pub trait Store: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Insert or update an account record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_account(&self, account: &Account) -> Result<()>;

    /// Get an account by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>>;

    /// Atomically remove `amount` credits from an account.
    ///
    /// Returns the new balance. The debit is all-or-nothing: concurrent
    /// callers can never drive the balance below zero.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::InsufficientCredits` if the balance is too low; the
    ///   account is not mutated.
    fn debit_credits(&self, user_id: &UserId, amount: i64) -> Result<i64>;

    /// Atomically restore `amount` credits to an account (compensation for
    /// a failed dependent write). Does not touch `total_purchased`.
    ///
    /// Returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    fn refund_credits(&self, user_id: &UserId, amount: i64) -> Result<i64>;

    /// Atomically grant purchased credits: increments both `credits` and
    /// `total_purchased`.
    ///
    /// Returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    fn credit_purchase(&self, user_id: &UserId, amount: i64) -> Result<i64>;

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    /// Insert or update a purchase transaction, maintaining the user,
    /// session, and payment-intent indexes.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_transaction(&self, transaction: &Transaction) -> Result<()>;

    /// Get a transaction by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<Transaction>>;

    /// Look up a transaction by its checkout session ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_transaction_by_session(&self, session_id: &str) -> Result<Option<Transaction>>;

    /// Look up a transaction by its payment-intent ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_transaction_by_intent(&self, payment_intent_id: &str) -> Result<Option<Transaction>>;

    /// List transactions for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>>;

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    /// Insert a ledger entry, enforcing `(ref_type, ref_id)` uniqueness.
    ///
    /// This is the idempotency guard for crediting: of two concurrent
    /// inserts for the same reference, exactly one succeeds.
    ///
    /// # Errors
    ///
    /// - `StoreError::DuplicateLedgerEntry` if an entry for the same
    ///   reference already exists; nothing is written.
    fn insert_ledger_entry(&self, entry: &LedgerEntry) -> Result<()>;

    /// Get a ledger entry by its causing reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_ledger_entry_by_ref(
        &self,
        ref_type: RefType,
        ref_id: &str,
    ) -> Result<Option<LedgerEntry>>;

    /// List ledger entries for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_ledger_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>>;

    // =========================================================================
    // Chat Operations
    // =========================================================================

    /// Insert or update a conversation, maintaining the user index.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_conversation(&self, conversation: &Conversation) -> Result<()>;

    /// Get a conversation by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_conversation(&self, conversation_id: &ConversationId) -> Result<Option<Conversation>>;

    /// List a user's conversations, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_conversations_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<Conversation>>;

    /// Persist a message and bump the owning conversation's counters in a
    /// single atomic write.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the conversation doesn't exist.
    fn append_message(&self, message: &Message) -> Result<()>;

    /// List a conversation's messages, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>>;
}
