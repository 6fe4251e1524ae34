//! Stripe webhook integration tests.
//!
//! Transactions are seeded straight through the store; the webhook payloads
//! and signatures are built the way Stripe builds them.

mod common;

use common::{sign_webhook, TestHarness};
use serde_json::json;

use tally_core::{PlanCatalog, RefType, Transaction, TransactionStatus};
use tally_store::Store;

/// Seed a `created` transaction bound to a checkout session.
fn seed_transaction(harness: &TestHarness, plan_id: &str, session_id: &str) -> Transaction {
    let catalog = PlanCatalog::default();
    let mut txn = Transaction::for_plan(harness.user_id, catalog.get(plan_id).unwrap());
    txn.bind_session(session_id).unwrap();
    harness.store.put_transaction(&txn).unwrap();
    txn
}

fn completed_event(harness: &TestHarness, txn: &Transaction, payment_intent: &str) -> String {
    json!({
        "id": format!("evt_{}", txn.id),
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": txn.session_id.clone().unwrap(),
                "payment_status": "paid",
                "payment_intent": payment_intent,
                "metadata": {
                    "user_id": harness.user_id.to_string(),
                    "plan_id": txn.plan_id.clone(),
                    "credits": txn.credits.to_string(),
                    "transaction_id": txn.id.to_string(),
                }
            }
        }
    })
    .to_string()
}

// ============================================================================
// Signature verification
// ============================================================================

#[tokio::test]
async fn missing_signature_is_rejected() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/webhooks/stripe")
        .text(r#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{}}}"#)
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn invalid_signature_is_rejected_without_processing() {
    let harness = TestHarness::new();
    harness.register_account().await;
    harness.set_credits(0);
    let txn = seed_transaction(&harness, "starter", "cs_forged");

    let event = completed_event(&harness, &txn, "pi_forged");

    let response = harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", "t=1700000000,v1=deadbeef")
        .text(event)
        .await;

    response.assert_status_bad_request();

    // The forged delivery must not have credited anything.
    assert_eq!(harness.balance(), 0);
    let txn = harness.store.get_transaction(&txn.id).unwrap().unwrap();
    assert_eq!(txn.status, TransactionStatus::Created);
}

// ============================================================================
// checkout.session.completed
// ============================================================================

#[tokio::test]
async fn completed_webhook_credits_the_account() {
    let harness = TestHarness::new();
    harness.register_account().await;
    harness.set_credits(0);
    let txn = seed_transaction(&harness, "ultimate", "cs_wh_pay");

    let event = completed_event(&harness, &txn, "pi_wh_pay");
    let response = harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", sign_webhook(&event))
        .text(event)
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["received"], true);

    assert_eq!(harness.balance(), 5000);

    let stored = harness.store.get_transaction(&txn.id).unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Paid);
    assert!(!stored.pending);
    assert_eq!(stored.payment_intent_id.as_deref(), Some("pi_wh_pay"));

    let account = harness.store.get_account(&harness.user_id).unwrap().unwrap();
    assert_eq!(account.total_purchased, 5000);
}

/// The provider redelivers the completed event; the second
/// delivery finds the existing ledger entry and makes no further mutation.
#[tokio::test]
async fn redelivered_webhook_is_a_noop() {
    let harness = TestHarness::new();
    harness.register_account().await;
    harness.set_credits(0);
    let txn = seed_transaction(&harness, "starter", "cs_wh_retry");

    let event = completed_event(&harness, &txn, "pi_wh_retry");

    for _ in 0..3 {
        let response = harness
            .server
            .post("/webhooks/stripe")
            .add_header("stripe-signature", sign_webhook(&event))
            .text(event.clone())
            .await;
        response.assert_status_ok();
    }

    assert_eq!(harness.balance(), 500);
    let entries = harness
        .store
        .list_ledger_by_user(&harness.user_id, 10, 0)
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].delta, 500);
}

#[tokio::test]
async fn unpaid_completed_event_is_skipped() {
    let harness = TestHarness::new();
    harness.register_account().await;
    harness.set_credits(0);
    let txn = seed_transaction(&harness, "starter", "cs_wh_unpaid");

    let event = json!({
        "id": "evt_unpaid",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_wh_unpaid",
                "payment_status": "unpaid",
                "metadata": {
                    "user_id": harness.user_id.to_string(),
                    "plan_id": "starter",
                    "credits": "500",
                    "transaction_id": txn.id.to_string(),
                }
            }
        }
    })
    .to_string();

    let response = harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", sign_webhook(&event))
        .text(event)
        .await;

    response.assert_status_ok();
    assert_eq!(harness.balance(), 0);
}

/// A session missing any correlation key is unprocessable: acknowledged,
/// logged, and nothing mutated.
#[tokio::test]
async fn completed_event_without_metadata_acks_without_mutation() {
    let harness = TestHarness::new();
    harness.register_account().await;
    harness.set_credits(0);
    let txn = seed_transaction(&harness, "starter", "cs_wh_bare");

    let event = json!({
        "id": "evt_bare",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_wh_bare",
                "payment_status": "paid",
                "metadata": {
                    "user_id": harness.user_id.to_string(),
                    // plan_id, credits, transaction_id missing
                }
            }
        }
    })
    .to_string();

    let response = harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", sign_webhook(&event))
        .text(event)
        .await;

    response.assert_status_ok();
    assert_eq!(harness.balance(), 0);
    let stored = harness.store.get_transaction(&txn.id).unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Created);
}

#[tokio::test]
async fn completed_event_for_unknown_transaction_acks_without_mutation() {
    let harness = TestHarness::new();
    harness.register_account().await;
    harness.set_credits(0);

    let event = json!({
        "id": "evt_ghost",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_ghost",
                "payment_status": "paid",
                "metadata": {
                    "user_id": harness.user_id.to_string(),
                    "plan_id": "starter",
                    "credits": "500",
                    "transaction_id": tally_core::TransactionId::generate().to_string(),
                }
            }
        }
    })
    .to_string();

    let response = harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", sign_webhook(&event))
        .text(event)
        .await;

    // Internal errors are logged, not surfaced: the provider must not retry.
    response.assert_status_ok();
    assert_eq!(harness.balance(), 0);
}

// ============================================================================
// checkout.session.expired / payment_intent.payment_failed
// ============================================================================

/// An abandoned checkout expires; the transaction is closed
/// out and no ledger entry ever exists for it.
#[tokio::test]
async fn expired_webhook_closes_created_transaction() {
    let harness = TestHarness::new();
    harness.register_account().await;
    harness.set_credits(0);
    let txn = seed_transaction(&harness, "pro", "cs_wh_expire");

    let event = json!({
        "id": "evt_expire",
        "type": "checkout.session.expired",
        "data": { "object": { "id": "cs_wh_expire" } }
    })
    .to_string();

    let response = harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", sign_webhook(&event))
        .text(event)
        .await;

    response.assert_status_ok();

    let stored = harness.store.get_transaction(&txn.id).unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Expired);
    assert!(!stored.pending);

    assert_eq!(harness.balance(), 0);
    assert!(harness
        .store
        .get_ledger_entry_by_ref(RefType::Transaction, &txn.id.to_string())
        .unwrap()
        .is_none());
}

/// `paid` is terminal: a failure event delivered after the
/// successful confirmation changes nothing.
#[tokio::test]
async fn late_failure_event_cannot_regress_paid() {
    let harness = TestHarness::new();
    harness.register_account().await;
    harness.set_credits(0);
    let txn = seed_transaction(&harness, "starter", "cs_wh_late");

    let paid_event = completed_event(&harness, &txn, "pi_wh_late");
    harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", sign_webhook(&paid_event))
        .text(paid_event)
        .await
        .assert_status_ok();
    assert_eq!(harness.balance(), 500);

    let failed_event = json!({
        "id": "evt_late_fail",
        "type": "payment_intent.payment_failed",
        "data": { "object": { "id": "pi_wh_late" } }
    })
    .to_string();

    let response = harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", sign_webhook(&failed_event))
        .text(failed_event)
        .await;
    response.assert_status_ok();

    let stored = harness.store.get_transaction(&txn.id).unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Paid);
    assert_eq!(harness.balance(), 500);
}

#[tokio::test]
async fn unhandled_event_types_are_acknowledged() {
    let harness = TestHarness::new();

    let event = json!({
        "id": "evt_misc",
        "type": "customer.updated",
        "data": { "object": { "id": "cus_123" } }
    })
    .to_string();

    let response = harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", sign_webhook(&event))
        .text(event)
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["received"], true);
}
