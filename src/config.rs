//! Application configuration loaded from environment variables.
//!
//! The webhook signing secret and the Clerk API key are secrets; Cloud Run
//! injects them as environment variables via secret bindings.

use std::env;

/// Default Clerk Backend API base URL.
pub const DEFAULT_CLERK_API_URL: &str = "https://api.clerk.com/v1";

/// Maximum age (either direction) of a delivery timestamp, in seconds.
pub const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;

/// Credits granted to a newly created user record.
pub const DEFAULT_CREDIT_BALANCE: i64 = 10;

/// Which user store backs the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    /// Process-local store, for local development only.
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(StoreBackend::Firestore),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(ConfigError::Invalid {
                name: "USER_STORE",
                reason: format!("unknown store backend '{}'", other),
            }),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// User store backend
    pub store_backend: StoreBackend,
    /// Clerk Backend API base URL (no trailing slash)
    pub clerk_api_url: String,
    /// Accepted clock skew for delivery timestamps
    pub webhook_tolerance_secs: u64,
    /// Starting credit balance for new records
    pub default_credit_balance: i64,

    // --- Secrets ---
    /// Clerk Backend API secret key
    pub clerk_secret_key: String,
    /// Svix signing secret (`whsec_...`)
    pub webhook_secret: String,
}

impl Config {
    /// Config for tests only. Never used by the server binary.
    pub fn test_default() -> Self {
        Self {
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            store_backend: StoreBackend::Memory,
            clerk_api_url: "http://localhost:9999/v1".to_string(),
            webhook_tolerance_secs: DEFAULT_WEBHOOK_TOLERANCE_SECS,
            default_credit_balance: DEFAULT_CREDIT_BALANCE,
            clerk_secret_key: "sk_test_key".to_string(),
            // base64("test_webhook_signing_key")
            webhook_secret: "whsec_dGVzdF93ZWJob29rX3NpZ25pbmdfa2V5".to_string(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A missing signing secret is fatal: the receiver must never run
    /// without verification.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: parse_or_default("PORT", 8080)?,
            store_backend: env::var("USER_STORE")
                .map(|v| v.parse::<StoreBackend>())
                .unwrap_or(Ok(StoreBackend::Firestore))?,
            clerk_api_url: env::var("CLERK_API_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .unwrap_or_else(|_| DEFAULT_CLERK_API_URL.to_string()),
            webhook_tolerance_secs: parse_or_default(
                "WEBHOOK_TOLERANCE_SECS",
                DEFAULT_WEBHOOK_TOLERANCE_SECS,
            )?,
            default_credit_balance: parse_or_default(
                "DEFAULT_CREDIT_BALANCE",
                DEFAULT_CREDIT_BALANCE,
            )?,

            clerk_secret_key: required_secret("CLERK_SECRET_KEY")?,
            webhook_secret: required_secret("CLERK_WEBHOOK_SECRET")?,
        })
    }
}

/// Read a secret, treating an empty value the same as an absent one.
fn required_secret(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parse_or_default<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env vars are process-global; keep every env mutation in one test.
    #[test]
    fn test_config_from_env() {
        env::set_var("CLERK_SECRET_KEY", "sk_test_123");
        env::set_var("CLERK_WEBHOOK_SECRET", "  whsec_c2VjcmV0  ");
        env::set_var("CLERK_API_URL", "https://clerk.example.com/v1/");
        env::set_var("USER_STORE", "memory");
        env::remove_var("PORT");
        env::remove_var("DEFAULT_CREDIT_BALANCE");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.clerk_secret_key, "sk_test_123");
        assert_eq!(config.webhook_secret, "whsec_c2VjcmV0");
        assert_eq!(config.clerk_api_url, "https://clerk.example.com/v1");
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.port, 8080);
        assert_eq!(config.default_credit_balance, DEFAULT_CREDIT_BALANCE);

        env::set_var("CLERK_WEBHOOK_SECRET", "   ");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("CLERK_WEBHOOK_SECRET")));

        env::remove_var("CLERK_WEBHOOK_SECRET");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("CLERK_WEBHOOK_SECRET")));
    }

    #[test]
    fn test_store_backend_parse() {
        assert_eq!("Firestore".parse::<StoreBackend>().unwrap(), StoreBackend::Firestore);
        assert_eq!(" memory ".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("mongo".parse::<StoreBackend>().is_err());
    }
}
