//! The payment confirmer.
//!
//! Both confirmation entry points — the user-facing verify endpoint and the
//! provider-facing webhook — funnel into [`credit_paid_session`]. The
//! sequence must be safe to run twice, sequentially or concurrently:
//!
//! 1. Load the transaction from session metadata; absent means the event is
//!    un-actionable.
//! 2. Short-circuit if it is already `Paid`.
//! 3. Flip it to `Paid` and persist. This happens *before* the ledger write
//!    so that a crash in between leaves a paid transaction with no ledger
//!    entry — an operator-visible gap that reconciles to a missing grant,
//!    never to a double one.
//! 4. Insert the purchase ledger entry keyed by the transaction. The
//!    `(ref_type, ref_id)` uniqueness constraint is the real arbiter: when
//!    two confirmations race past step 2, exactly one insert succeeds and
//!    the loser is converted to "already processed".
//! 5. Atomically credit the account with the transaction's credit amount.
//!
//! The credit amount always comes from the transaction record, which was
//! bound into the session metadata at checkout.

use tally_core::{LedgerEntry, TransactionId, UserId};
use tally_store::{Store, StoreError};

use crate::stripe::SessionMetadata;

/// A checkout session the provider reports as paid, reduced to the facts
/// the crediting sequence needs.
#[derive(Debug, Clone)]
pub struct PaidSession {
    /// The checkout session ID.
    pub session_id: String,

    /// The payment intent, when the payload carried one.
    pub payment_intent: Option<String>,

    /// The correlation metadata (all four keys present).
    pub metadata: SessionMetadata,
}

/// Result of a crediting attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// This attempt granted the credits.
    Credited {
        /// The credited account.
        user_id: UserId,
        /// Credits granted.
        credits: i64,
        /// Balance after the grant.
        balance: i64,
    },

    /// Another attempt already granted the credits; nothing was mutated.
    AlreadyProcessed,
}

/// Errors from the confirmer.
///
/// These are internal conditions: the webhook adapter logs them and still
/// acks the delivery, the verify adapter maps them onto API errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfirmError {
    /// Session metadata references a transaction we never created.
    #[error("transaction {0} not found")]
    UnknownTransaction(TransactionId),

    /// Session metadata names a different account than the transaction.
    #[error("transaction {transaction_id} does not belong to user {user_id}")]
    OwnerMismatch {
        /// The transaction.
        transaction_id: TransactionId,
        /// The user claimed by the metadata.
        user_id: UserId,
    },

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Run the crediting sequence for a paid checkout session.
///
/// Idempotent and race-safe; see the module docs for the ordering argument.
///
/// # Errors
///
/// Returns `ConfirmError` for un-actionable events (unknown transaction,
/// owner mismatch) and storage failures. Duplicate confirmation is *not* an
/// error; it comes back as [`ConfirmOutcome::AlreadyProcessed`].
pub fn credit_paid_session(
    store: &dyn Store,
    paid: &PaidSession,
) -> Result<ConfirmOutcome, ConfirmError> {
    let meta = &paid.metadata;

    let Some(mut txn) = store.get_transaction(&meta.transaction_id)? else {
        return Err(ConfirmError::UnknownTransaction(meta.transaction_id));
    };

    if txn.user_id != meta.user_id {
        return Err(ConfirmError::OwnerMismatch {
            transaction_id: txn.id,
            user_id: meta.user_id,
        });
    }

    // Primary idempotency check. Not sufficient on its own: two attempts can
    // both read `Created` before either writes.
    if txn.mark_paid(paid.payment_intent.clone()).is_err() {
        tracing::info!(
            transaction_id = %txn.id,
            session_id = %paid.session_id,
            "Transaction already paid, skipping"
        );
        return Ok(ConfirmOutcome::AlreadyProcessed);
    }

    store.put_transaction(&txn)?;

    tracing::debug!(
        transaction_id = %txn.id,
        user_id = %txn.user_id,
        "Transaction marked paid"
    );

    let entry = LedgerEntry::purchase(txn.user_id, txn.credits, txn.id);
    match store.insert_ledger_entry(&entry) {
        Ok(()) => {}
        Err(StoreError::DuplicateLedgerEntry { ref_id, .. }) => {
            // The losing side of a confirmation race lands here.
            tracing::info!(
                transaction_id = %ref_id,
                session_id = %paid.session_id,
                "Ledger entry already exists, skipping credit"
            );
            return Ok(ConfirmOutcome::AlreadyProcessed);
        }
        Err(e) => return Err(e.into()),
    }

    let balance = store.credit_purchase(&txn.user_id, txn.credits)?;

    tracing::info!(
        user_id = %txn.user_id,
        transaction_id = %txn.id,
        credits = %txn.credits,
        balance = %balance,
        "Credits granted for paid checkout session"
    );

    Ok(ConfirmOutcome::Credited {
        user_id: txn.user_id,
        credits: txn.credits,
        balance,
    })
}

/// Handle a `checkout.session.expired` event: `Created -> Expired` only.
///
/// # Errors
///
/// Returns an error only for storage failures; unknown sessions and
/// already-terminal transactions are logged no-ops.
pub fn expire_session(store: &dyn Store, session_id: &str) -> Result<(), ConfirmError> {
    let Some(mut txn) = store.find_transaction_by_session(session_id)? else {
        tracing::info!(session_id = %session_id, "Expiry for unknown session, ignoring");
        return Ok(());
    };

    if txn.mark_expired().is_err() {
        tracing::info!(
            transaction_id = %txn.id,
            status = ?txn.status,
            "Expiry for settled transaction, ignoring"
        );
        return Ok(());
    }

    store.put_transaction(&txn)?;
    tracing::info!(transaction_id = %txn.id, "Transaction expired");
    Ok(())
}

/// Handle a `payment_intent.payment_failed` event: transition to `Failed`
/// unless the transaction already reached `Paid`.
///
/// # Errors
///
/// Returns an error only for storage failures.
pub fn fail_payment(store: &dyn Store, payment_intent_id: &str) -> Result<(), ConfirmError> {
    let Some(mut txn) = store.find_transaction_by_intent(payment_intent_id)? else {
        tracing::info!(
            payment_intent_id = %payment_intent_id,
            "Payment failure for unknown intent, ignoring"
        );
        return Ok(());
    };

    if txn.mark_failed().is_err() {
        tracing::info!(
            transaction_id = %txn.id,
            "Payment failure after successful payment, ignoring"
        );
        return Ok(());
    }

    store.put_transaction(&txn)?;
    tracing::warn!(transaction_id = %txn.id, "Transaction marked failed");
    Ok(())
}
