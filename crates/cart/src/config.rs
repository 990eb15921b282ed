//! Cart configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `EDUSTORE_API_BASE_URL` - Base URL of the cart REST API
//! - `EDUSTORE_CART_SECRET` - Secret the guest cart is encrypted with (min 16 chars, high entropy)
//!
//! ## Optional
//! - `EDUSTORE_CART_KEY` - Local store key for the guest cart (default: edustore.cart)
//! - `EDUSTORE_SESSION_TOKEN` - Bearer token of the logged-in principal
//! - `EDUSTORE_REQUEST_TIMEOUT_SECS` - Per-request timeout for cart API calls
//! - `EDUSTORE_SYNC_RETRY` - `retry-on-load` (default) or `manual`
//! - `EDUSTORE_SYNC_MUTATIONS` - `queue` (default) or `reject`
//! - `EDUSTORE_STORE_PATH` - File backing the local store (default: .edustore-cart.json)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use edustore_core::CurrencyCode;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const DEFAULT_CART_KEY: &str = "edustore.cart";
const DEFAULT_STORE_PATH: &str = ".edustore-cart.json";
const MIN_CART_SECRET_LENGTH: usize = 16;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.0;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// What happens to a login drain that failed partway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncRetryPolicy {
    /// Re-run the pending drain on the next `reload()`.
    #[default]
    RetryOnLoad,
    /// Only re-run the drain on an explicit `retry_sync()`.
    Manual,
}

impl FromStr for SyncRetryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "retry-on-load" => Ok(Self::RetryOnLoad),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("invalid sync retry policy: {s}")),
        }
    }
}

/// How mutations issued while the login drain runs are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMutationPolicy {
    /// Wait until the drain completes, then apply.
    #[default]
    Queue,
    /// Fail immediately with `CartError::Syncing`.
    Reject,
}

impl FromStr for SyncMutationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queue" => Ok(Self::Queue),
            "reject" => Ok(Self::Reject),
            _ => Err(format!("invalid sync mutation policy: {s}")),
        }
    }
}

/// Reconciliation engine settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineConfig {
    /// Partial-sync retry policy.
    pub sync_retry: SyncRetryPolicy,
    /// Mutation handling during the login drain.
    pub sync_mutations: SyncMutationPolicy,
    /// Currency used for subtotals.
    pub currency: CurrencyCode,
}

/// Cart client configuration.
#[derive(Debug, Clone)]
pub struct CartConfig {
    /// Base URL of the cart REST API
    pub api_base_url: Url,
    /// Secret the guest cart is encrypted with
    pub cart_secret: SecretString,
    /// Local store key for the guest cart
    pub cart_key: String,
    /// Bearer token of the logged-in principal; presence means authenticated
    pub session_token: Option<SecretString>,
    /// Per-request timeout for cart API calls
    pub request_timeout: Option<Duration>,
    /// Reconciliation engine settings
    pub engine: EngineConfig,
    /// File backing the local store
    pub store_path: PathBuf,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

impl CartConfig {
    /// Build a configuration with defaults for everything but the API URL
    /// and the cart secret.
    #[must_use]
    pub fn new(api_base_url: Url, cart_secret: SecretString) -> Self {
        Self {
            api_base_url,
            cart_secret,
            cart_key: DEFAULT_CART_KEY.to_string(),
            session_token: None,
            request_timeout: None,
            engine: EngineConfig::default(),
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            sentry_dsn: None,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the cart secret fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_base_url = parse_env(
            "EDUSTORE_API_BASE_URL",
            &get_required_env("EDUSTORE_API_BASE_URL")?,
        )?;
        let cart_secret = get_validated_secret("EDUSTORE_CART_SECRET")?;
        validate_cart_secret(&cart_secret, "EDUSTORE_CART_SECRET")?;

        let request_timeout = get_optional_env("EDUSTORE_REQUEST_TIMEOUT_SECS")
            .map(|v| parse_env::<u64>("EDUSTORE_REQUEST_TIMEOUT_SECS", &v))
            .transpose()?
            .map(Duration::from_secs);

        let engine = EngineConfig {
            sync_retry: parse_env(
                "EDUSTORE_SYNC_RETRY",
                &get_env_or_default("EDUSTORE_SYNC_RETRY", "retry-on-load"),
            )?,
            sync_mutations: parse_env(
                "EDUSTORE_SYNC_MUTATIONS",
                &get_env_or_default("EDUSTORE_SYNC_MUTATIONS", "queue"),
            )?,
            currency: CurrencyCode::default(),
        };

        Ok(Self {
            api_base_url,
            cart_secret,
            cart_key: get_env_or_default("EDUSTORE_CART_KEY", DEFAULT_CART_KEY),
            session_token: get_optional_env("EDUSTORE_SESSION_TOKEN")
                .filter(|token| !token.trim().is_empty())
                .map(SecretString::from),
            request_timeout,
            engine,
            store_path: PathBuf::from(get_env_or_default(
                "EDUSTORE_STORE_PATH",
                DEFAULT_STORE_PATH,
            )),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
        })
    }

    /// True when a session token is configured.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.session_token.is_some()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a variable's value, reporting the variable name on failure.
fn parse_env<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Validate that the cart secret meets minimum length requirements.
fn validate_cart_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_CART_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_CART_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
