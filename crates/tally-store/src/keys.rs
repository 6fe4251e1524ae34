//! Key encoding utilities for `RocksDB`.
//!
//! Composite index keys concatenate the 16-byte owner ID with the 16-byte
//! ULID of the indexed record; ULIDs are time-ordered, so prefix scans come
//! back in chronological order.

use tally_core::{ConversationId, LedgerEntryId, MessageId, RefType, TransactionId, UserId};

/// Create an account key from a user ID.
#[must_use]
pub fn account_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a transaction key from a transaction ID.
#[must_use]
pub fn transaction_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.to_bytes().to_vec()
}

/// Create a user-transaction index key.
///
/// Format: `user_id (16 bytes) || transaction_id (16 bytes)`
#[must_use]
pub fn user_transaction_key(user_id: &UserId, transaction_id: &TransactionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&transaction_id.to_bytes());
    key
}

/// Extract the transaction ID from a user-transaction index key.
///
/// # Panics
///
/// Panics if the key is not at least 32 bytes.
#[must_use]
pub fn extract_transaction_id(key: &[u8]) -> TransactionId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    TransactionId::from_bytes(bytes).expect("valid ULID bytes")
}

/// Create a session index key from a checkout session ID.
#[must_use]
pub fn session_key(session_id: &str) -> Vec<u8> {
    session_id.as_bytes().to_vec()
}

/// Create a payment-intent index key.
#[must_use]
pub fn intent_key(payment_intent_id: &str) -> Vec<u8> {
    payment_intent_id.as_bytes().to_vec()
}

/// Create a ledger entry key from an entry ID.
#[must_use]
pub fn ledger_key(entry_id: &LedgerEntryId) -> Vec<u8> {
    entry_id.to_bytes().to_vec()
}

/// Create the uniqueness-guard key for a ledger reference.
///
/// Format: `ref_type ":" ref_id` (both are printable, so the separator is
/// unambiguous).
#[must_use]
pub fn ledger_ref_key(ref_type: RefType, ref_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(ref_type.as_str().len() + 1 + ref_id.len());
    key.extend_from_slice(ref_type.as_str().as_bytes());
    key.push(b':');
    key.extend_from_slice(ref_id.as_bytes());
    key
}

/// Create a user-ledger index key.
#[must_use]
pub fn user_ledger_key(user_id: &UserId, entry_id: &LedgerEntryId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&entry_id.to_bytes());
    key
}

/// Extract the ledger entry ID from a user-ledger index key.
///
/// # Panics
///
/// Panics if the key is not at least 32 bytes.
#[must_use]
pub fn extract_ledger_entry_id(key: &[u8]) -> LedgerEntryId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    LedgerEntryId::from_bytes(bytes).expect("valid ULID bytes")
}

/// Create a conversation key from a conversation ID.
#[must_use]
pub fn conversation_key(conversation_id: &ConversationId) -> Vec<u8> {
    conversation_id.to_bytes().to_vec()
}

/// Create a user-conversation index key.
#[must_use]
pub fn user_conversation_key(user_id: &UserId, conversation_id: &ConversationId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&conversation_id.to_bytes());
    key
}

/// Extract the conversation ID from a user-conversation index key.
///
/// # Panics
///
/// Panics if the key is not at least 32 bytes.
#[must_use]
pub fn extract_conversation_id(key: &[u8]) -> ConversationId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    ConversationId::from_bytes(bytes).expect("valid ULID bytes")
}

/// Create a message key.
///
/// Format: `conversation_id (16 bytes) || message_id (16 bytes)`, so a
/// conversation's messages scan in creation order.
#[must_use]
pub fn message_key(conversation_id: &ConversationId, message_id: &MessageId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(&conversation_id.to_bytes());
    key.extend_from_slice(&message_id.to_bytes());
    key
}

/// Create a prefix for iterating all of a conversation's messages.
#[must_use]
pub fn conversation_messages_prefix(conversation_id: &ConversationId) -> Vec<u8> {
    conversation_id.to_bytes().to_vec()
}

/// Create a prefix for iterating an owner's index entries.
#[must_use]
pub fn user_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}
