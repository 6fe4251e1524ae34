//! Service configuration.

use serde::Deserialize;
use std::path::Path;
use tally_core::PlanCatalog;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/tally").
    pub data_dir: String,

    /// Shared secret for validating end-user JWTs (HS256).
    pub jwt_secret: String,

    /// Stripe API key (optional; payments disabled without it).
    pub stripe_api_key: Option<String>,

    /// Stripe webhook signing secret (optional; webhook deliveries are
    /// rejected without it).
    pub stripe_webhook_secret: Option<String>,

    /// Stripe API base URL. Overridable so tests can stand in a mock.
    pub stripe_api_base: String,

    /// Frontend URL for checkout redirects.
    pub frontend_url: String,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// The credit-pack catalog.
    pub plans: PlanCatalog,
}

/// Stripe secrets file structure.
#[derive(Debug, Deserialize)]
struct StripeSecrets {
    api_key: String,
    #[serde(default)]
    webhook_secret: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        // Try to load Stripe secrets from file first, then fall back to env vars
        let (stripe_api_key, stripe_webhook_secret) = load_stripe_secrets();

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/tally".into()),
            jwt_secret: std::env::var("JWT_SECRET").unwrap_or_else(|_| "dev-secret".into()),
            stripe_api_key,
            stripe_webhook_secret,
            stripe_api_base: std::env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com/v1".into()),
            frontend_url: std::env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: std::env::var("MAX_BODY_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024 * 1024), // 1MB
            request_timeout_seconds: std::env::var("REQUEST_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            plans: PlanCatalog::default(),
        }
    }
}

/// Load Stripe secrets from file or environment.
fn load_stripe_secrets() -> (Option<String>, Option<String>) {
    let secret_paths = [
        ".secrets/stripe.json",
        "tally/.secrets/stripe.json",
        "../.secrets/stripe.json",
    ];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<StripeSecrets>(path) {
            tracing::info!(path = %path, "Loaded Stripe secrets from file");
            return (Some(secrets.api_key), secrets.webhook_secret);
        }
    }

    // Fall back to environment variables
    tracing::debug!("Stripe secrets file not found, using environment variables");
    (
        std::env::var("STRIPE_API_KEY").ok(),
        std::env::var("STRIPE_WEBHOOK_SECRET").ok(),
    )
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/tally".into(),
            jwt_secret: "dev-secret".into(),
            stripe_api_key: None,
            stripe_webhook_secret: None,
            stripe_api_base: "https://api.stripe.com/v1".into(),
            frontend_url: "http://localhost:3000".into(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            plans: PlanCatalog::default(),
        }
    }
}
