//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string
//! - `VAULT_ENCRYPTION_KEY` - 32-byte credential vault key (base64 or 64 hex chars)
//! - `WORKFLOW_ENGINE_URL` - Base URL of the workflow engine jobs are relayed to
//!
//! ## Optional (signing secrets - a route fails closed when its secret is unset)
//! - `SHOPIFY_API_KEY` - App public API key (expected session token audience)
//! - `SHOPIFY_API_SECRET` - App secret (app proxy signatures)
//! - `SHOPIFY_API_SECRET_PREVIOUS` - Previous app secret, still accepted during rotation
//! - `SHOPIFY_WEBHOOK_SECRET` - Webhook signing secret
//! - `SHOPIFY_WEBHOOK_SECRET_PREVIOUS` - Previous webhook secret, still accepted during rotation
//! - `SHOPIFY_SESSION_TOKEN_KEY` - Session token key (default: `SHOPIFY_API_SECRET`)
//! - `SHOPGATE_BACKEND_SECRET` - Shared secret for backend-to-backend calls
//! - `SHOPGATE_ALLOW_UNSIGNED` - `true` to accept requests on routes whose secrets
//!   are all unset (never allowed when `SHOPGATE_ENV=production`)
//!
//! ## Optional
//! - `SHOPGATE_HOST` - Bind address (default: 127.0.0.1)
//! - `SHOPGATE_PORT` - Listen port (default: 3000)
//! - `SHOPGATE_ENV` - `development`, `staging` or `production` (default: development)
//! - `SHOPIFY_API_VERSION` - Admin API version (default: 2025-01)
//! - `UPSTREAM_TIMEOUT_MS` - Workflow engine / Admin API timeout (default: 10000)
//! - `STORE_TIMEOUT_MS` - Database call timeout (default: 5000)
//! - `FLAG_TTL_SECS` - Feature flag cache lifetime (default: 60)
//! - `SESSION_TOKEN_LEEWAY_SECS` - Clock skew tolerated on `exp`/`nbf` (default: 0)
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`
//!
//! ## Optional (TLS)
//! - `SHOPGATE_TLS_CERT` - PEM-encoded certificate chain
//! - `SHOPGATE_TLS_KEY` - PEM-encoded private key

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::auth::SigningSecrets;
use crate::vault::VaultKey;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_API_VERSION: &str = "2025-01";

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

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Some(Self::Development),
            "staging" => Some(Self::Staging),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    /// Returns the lowercase name used for Sentry and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Deployment environment
    pub environment: Environment,
    /// Request signing secrets for every trust protocol
    pub signing: SigningSecrets,
    /// Credential vault key
    pub vault_key: VaultKey,
    /// Shopify Admin API settings
    pub shopify: ShopifyApiConfig,
    /// Workflow engine base URL (always ends with `/`)
    pub workflow_engine_url: Url,
    /// Timeout for workflow engine and Admin API calls
    pub upstream_timeout: Duration,
    /// Timeout for database calls
    pub store_timeout: Duration,
    /// Feature flag cache lifetime
    pub flag_ttl: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (defaults to `environment`)
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
    /// TLS configuration for HTTPS (optional)
    pub tls: Option<TlsConfig>,
}

/// Shopify Admin API settings.
#[derive(Debug, Clone)]
pub struct ShopifyApiConfig {
    /// Admin API version (e.g., 2025-01)
    pub api_version: String,
}

/// TLS configuration for HTTPS.
#[derive(Clone)]
pub struct TlsConfig {
    /// PEM-encoded certificate chain
    pub cert_pem: String,
    /// PEM-encoded private key
    pub key_pem: SecretString,
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("cert_pem", &"[CERTIFICATE]")
            .field("key_pem", &"[REDACTED]")
            .finish()
    }
}

/// Source of configuration values, keyed by variable name.
type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

impl TlsConfig {
    fn load(env: Lookup<'_>) -> Result<Option<Self>, ConfigError> {
        match (env("SHOPGATE_TLS_CERT"), env("SHOPGATE_TLS_KEY")) {
            (Some(cert), Some(key)) => Ok(Some(Self {
                cert_pem: cert,
                key_pem: SecretString::from(key),
            })),
            (None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "SHOPGATE_TLS_*".to_string(),
                "Both SHOPGATE_TLS_CERT and SHOPGATE_TLS_KEY must be set together".to_string(),
            )),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(&|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
    }

    /// Load configuration from an arbitrary key-value source.
    ///
    /// # Errors
    ///
    /// Same as [`ServerConfig::from_env`].
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(&|key| vars.get(key).filter(|v| !v.is_empty()).cloned())
    }

    fn from_lookup(env: Lookup<'_>) -> Result<Self, ConfigError> {
        let database_url = SecretString::from(required(env, "DATABASE_URL")?);
        let host = or_default(env, "SHOPGATE_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("SHOPGATE_HOST".to_string(), e.to_string()))?;
        let port = parse_or(env, "SHOPGATE_PORT", 3000_u16)?;

        let environment = match env("SHOPGATE_ENV") {
            Some(value) => Environment::parse(&value).ok_or_else(|| {
                ConfigError::InvalidEnvVar("SHOPGATE_ENV".to_string(), value.clone())
            })?,
            None => Environment::default(),
        };

        let signing = load_signing_secrets(env, environment)?;

        let vault_key = VaultKey::parse(&required(env, "VAULT_ENCRYPTION_KEY")?).map_err(|e| {
            ConfigError::InvalidEnvVar("VAULT_ENCRYPTION_KEY".to_string(), e.to_string())
        })?;

        let workflow_engine_url = parse_base_url(&required(env, "WORKFLOW_ENGINE_URL")?)
            .map_err(|e| ConfigError::InvalidEnvVar("WORKFLOW_ENGINE_URL".to_string(), e))?;

        let shopify = ShopifyApiConfig {
            api_version: or_default(env, "SHOPIFY_API_VERSION", DEFAULT_API_VERSION),
        };

        let upstream_timeout = Duration::from_millis(parse_or(env, "UPSTREAM_TIMEOUT_MS", 10_000)?);
        let store_timeout = Duration::from_millis(parse_or(env, "STORE_TIMEOUT_MS", 5_000)?);
        let flag_ttl = Duration::from_secs(parse_or(env, "FLAG_TTL_SECS", 60)?);

        let sentry_dsn = env("SENTRY_DSN");
        let sentry_environment = env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.1);
        let tls = TlsConfig::load(env)?;

        Ok(Self {
            database_url,
            host,
            port,
            environment,
            signing,
            vault_key,
            shopify,
            workflow_engine_url,
            upstream_timeout,
            store_timeout,
            flag_ttl,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
            tls,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn load_signing_secrets(
    env: Lookup<'_>,
    environment: Environment,
) -> Result<SigningSecrets, ConfigError> {
    let api_secret = optional_secret(env, "SHOPIFY_API_SECRET")?;
    let previous_secret = optional_secret(env, "SHOPIFY_API_SECRET_PREVIOUS")?;
    let webhook_secret = optional_secret(env, "SHOPIFY_WEBHOOK_SECRET")?;
    let previous_webhook_secret = optional_secret(env, "SHOPIFY_WEBHOOK_SECRET_PREVIOUS")?;
    let session_key = match optional_secret(env, "SHOPIFY_SESSION_TOKEN_KEY")? {
        Some(key) => Some(key),
        None => api_secret.clone(),
    };
    let backend = optional_secret(env, "SHOPGATE_BACKEND_SECRET")?;

    let allow_unsigned = env("SHOPGATE_ALLOW_UNSIGNED")
        .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"));
    if allow_unsigned && environment == Environment::Production {
        return Err(ConfigError::InvalidEnvVar(
            "SHOPGATE_ALLOW_UNSIGNED".to_string(),
            "unsigned requests cannot be allowed in production".to_string(),
        ));
    }

    let session_token_leeway_secs = parse_or(env, "SESSION_TOKEN_LEEWAY_SECS", 0_i64)?;
    if session_token_leeway_secs < 0 {
        return Err(ConfigError::InvalidEnvVar(
            "SESSION_TOKEN_LEEWAY_SECS".to_string(),
            "must not be negative".to_string(),
        ));
    }

    Ok(SigningSecrets {
        proxy: api_secret.into_iter().chain(previous_secret).collect(),
        webhook: webhook_secret
            .into_iter()
            .chain(previous_webhook_secret)
            .collect(),
        session_key,
        api_key: env("SHOPIFY_API_KEY"),
        backend,
        session_token_leeway_secs,
        allow_unsigned,
    })
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required variable.
fn required(env: Lookup<'_>, key: &str) -> Result<String, ConfigError> {
    env(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a variable with a default value.
fn or_default(env: Lookup<'_>, key: &str, default: &str) -> String {
    env(key).unwrap_or_else(|| default.to_string())
}

/// Parse a variable, falling back to `default` when unset.
fn parse_or<T>(env: Lookup<'_>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    env(key).map_or(Ok(default), |value| {
        value
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Load and validate an optional secret.
fn optional_secret(env: Lookup<'_>, key: &str) -> Result<Option<SecretString>, ConfigError> {
    env(key)
        .map(|value| {
            validate_secret_strength(&value, key)?;
            Ok(SecretString::from(value))
        })
        .transpose()
}

/// Parse a base URL and make sure relative joins append to its path.
fn parse_base_url(raw: &str) -> Result<Url, String> {
    let mut url = Url::parse(raw).map_err(|e| e.to_string())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme {}", url.scheme()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
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
    let len = s.len() as f64;
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
