//! Core domain types for the tally credit service.
//!
//! This crate defines the account, transaction, ledger, plan, and chat types
//! shared by the storage and HTTP layers. It has no I/O of its own.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod chat;
pub mod ids;
pub mod ledger;
pub mod plan;
pub mod transaction;

pub use account::Account;
pub use chat::{Conversation, Message, MessageRole};
pub use ids::{ConversationId, IdError, LedgerEntryId, MessageId, TransactionId, UserId};
pub use ledger::{LedgerEntry, LedgerReason, LedgerRef, RefType};
pub use plan::{Plan, PlanCatalog};
pub use transaction::{Transaction, TransactionStatus, TransitionError};
