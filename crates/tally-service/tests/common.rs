//! Common test utilities for tally integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::Router;
use axum_test::TestServer;
use jsonwebtoken::{EncodingKey, Header};
use tempfile::TempDir;

use tally_core::UserId;
use tally_service::auth::JwtClaims;
use tally_service::{create_router, AppState, ServiceConfig};
use tally_store::{RocksStore, Store};

/// JWT secret shared by all test tokens.
pub const JWT_SECRET: &str = "test-jwt-secret";

/// Stripe webhook signing secret used in tests.
pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Direct store access for seeding and assertions.
    pub store: Arc<dyn Store>,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// A test user ID for authenticated requests.
    pub user_id: UserId,
}

impl TestHarness {
    /// Create a new test harness with a fresh database.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store: Arc<dyn Store> =
            Arc::new(RocksStore::open(temp_dir.path()).expect("Failed to open store"));
        Self::with_store_and_stripe_base(store, temp_dir, None)
    }

    /// Create a harness whose Stripe client talks to `stripe_base`
    /// (a wiremock server in tests).
    pub fn with_stripe_base(stripe_base: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store: Arc<dyn Store> =
            Arc::new(RocksStore::open(temp_dir.path()).expect("Failed to open store"));
        Self::with_store_and_stripe_base(store, temp_dir, Some(stripe_base))
    }

    /// Create a harness around an externally built store (used to inject
    /// failures for the compensation tests).
    pub fn with_store(store: Arc<dyn Store>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self::with_store_and_stripe_base(store, temp_dir, None)
    }

    fn with_store_and_stripe_base(
        store: Arc<dyn Store>,
        temp_dir: TempDir,
        stripe_base: Option<&str>,
    ) -> Self {
        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            jwt_secret: JWT_SECRET.into(),
            stripe_api_key: Some("sk_test_xxx".into()),
            stripe_webhook_secret: Some(WEBHOOK_SECRET.into()),
            stripe_api_base: stripe_base
                .map_or_else(|| "https://api.stripe.com/v1".into(), String::from),
            frontend_url: "http://localhost:3000".into(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            plans: tally_core::PlanCatalog::default(),
        };

        let state = AppState::new(Arc::clone(&store), config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");
        let user_id = UserId::generate();

        Self {
            server,
            store,
            _temp_dir: temp_dir,
            user_id,
        }
    }

    /// Mint a valid HS256 token for an arbitrary user.
    pub fn token_for(user_id: &UserId) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock before epoch")
            .as_secs() as i64;

        let claims = JwtClaims {
            sub: user_id.to_string(),
            exp: now + 3600,
            iat: now,
        };

        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
        )
        .expect("Failed to encode test token")
    }

    /// Get the authorization header for the harness user.
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", Self::token_for(&self.user_id))
    }

    /// Register the harness user's account (grants the signup credits).
    pub async fn register_account(&self) {
        self.server
            .post("/v1/accounts")
            .add_header("authorization", self.auth_header())
            .json(&serde_json::json!({ "email": "test@example.com" }))
            .await
            .assert_status_ok();
    }

    /// Overwrite the harness user's credit balance.
    pub fn set_credits(&self, credits: i64) {
        let mut account = self
            .store
            .get_account(&self.user_id)
            .unwrap()
            .expect("account must be registered first");
        account.credits = credits;
        self.store.put_account(&account).unwrap();
    }

    /// Current balance straight from the store.
    pub fn balance(&self) -> i64 {
        self.store
            .get_account(&self.user_id)
            .unwrap()
            .expect("account must exist")
            .credits
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute a valid `Stripe-Signature` header for a payload (same HMAC
/// scheme the service verifies).
pub fn sign_webhook(payload: &str) -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_secs();

    let signed_payload = format!("{timestamp}.{payload}");
    let signature = compute_test_signature(WEBHOOK_SECRET, &signed_payload);
    format!("t={timestamp},v1={signature}")
}

/// Helper to compute test signature (same algorithm as the client).
fn compute_test_signature(secret: &str, message: &str) -> String {
    use sha2::{Digest, Sha256};

    let key = secret.as_bytes();
    let message = message.as_bytes();
    const BLOCK_SIZE: usize = 64;

    let key = if key.len() > BLOCK_SIZE {
        let mut hasher = Sha256::new();
        hasher.update(key);
        hasher.finalize().to_vec()
    } else {
        key.to_vec()
    };

    let mut key_padded = [0u8; BLOCK_SIZE];
    key_padded[..key.len()].copy_from_slice(&key);

    let mut i_key_pad = [0x36u8; BLOCK_SIZE];
    let mut o_key_pad = [0x5cu8; BLOCK_SIZE];

    for i in 0..BLOCK_SIZE {
        i_key_pad[i] ^= key_padded[i];
        o_key_pad[i] ^= key_padded[i];
    }

    let mut inner_hasher = Sha256::new();
    inner_hasher.update(i_key_pad);
    inner_hasher.update(message);
    let inner_hash = inner_hasher.finalize();

    let mut outer_hasher = Sha256::new();
    outer_hasher.update(o_key_pad);
    outer_hasher.update(inner_hash);
    let hmac = outer_hasher.finalize();

    hex::encode(hmac)
}
