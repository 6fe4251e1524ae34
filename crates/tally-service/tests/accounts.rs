//! Account registration and auth integration tests.

mod common;

use common::TestHarness;
use serde_json::json;
use tally_store::Store;

#[tokio::test]
async fn register_grants_signup_credits() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/accounts")
        .add_header("authorization", harness.auth_header())
        .json(&json!({ "email": "new@example.com" }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["credits"], 1250);
    assert_eq!(body["total_purchased"], 0);
    assert_eq!(body["email"], "new@example.com");
}

#[tokio::test]
async fn register_is_idempotent() {
    let harness = TestHarness::new();
    harness.register_account().await;

    // Spend a credit's worth so re-registration would be visible.
    harness.set_credits(7);

    let response = harness
        .server
        .post("/v1/accounts")
        .add_header("authorization", harness.auth_header())
        .json(&json!({ "email": "other@example.com" }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    // The existing account comes back untouched; no second grant.
    assert_eq!(body["credits"], 7);
    assert_eq!(body["email"], "test@example.com");
}

#[tokio::test]
async fn register_requires_email() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/accounts")
        .add_header("authorization", harness.auth_header())
        .json(&json!({ "email": "  " }))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn me_returns_account() {
    let harness = TestHarness::new();
    harness.register_account().await;

    let response = harness
        .server
        .get("/v1/accounts/me")
        .add_header("authorization", harness.auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["user_id"], harness.user_id.to_string());
}

#[tokio::test]
async fn me_without_account_fails() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/accounts/me")
        .add_header("authorization", harness.auth_header())
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let harness = TestHarness::new();

    let response = harness.server.get("/v1/accounts/me").await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn garbage_token_is_unauthorized() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/accounts/me")
        .add_header("authorization", "Bearer not.a.jwt")
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn deactivated_account_is_forbidden() {
    let harness = TestHarness::new();
    harness.register_account().await;

    let mut account = harness
        .store
        .get_account(&harness.user_id)
        .unwrap()
        .unwrap();
    account.is_active = false;
    harness.store.put_account(&account).unwrap();

    let response = harness
        .server
        .get("/v1/accounts/me")
        .add_header("authorization", harness.auth_header())
        .await;

    assert_eq!(response.status_code(), 403);
}
