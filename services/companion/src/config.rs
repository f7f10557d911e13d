//! Application Configuration Module
//!
//! Settings for the companion service come from environment variables
//! (optionally via a `.env` file) and are collected into one `Config`.

use secrecy::SecretString;
use std::env;
use std::time::Duration;
use tracing::Level;

pub const DEFAULT_VOICE_URL: &str = "ws://localhost:8787";

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgREST root. Without it the service runs on an in-memory store.
    pub store_url: Option<String>,
    pub store_api_key: Option<SecretString>,
    pub voice_url: String,
    pub voice_api_key: SecretString,
    /// The signed-in user; `None` means anonymous.
    pub user_id: Option<String>,
    pub plans: Vec<String>,
    pub features: Vec<String>,
    pub connect_timeout: Duration,
    pub query_timeout: Duration,
    pub log_level: Level,
}

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
    #[error("Invalid number for {var}: {value}")]
    InvalidNumber { var: String, value: String },
}

fn list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidNumber {
                var: var.to_string(),
                value,
            }),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `STORE_URL`: (Optional) PostgREST endpoint, e.g. `https://<project>.supabase.co/rest/v1`.
    // *   `STORE_API_KEY`: Key for the store. Required when `STORE_URL` is set.
    // *   `VOICE_URL`: (Optional) Voice service socket. Defaults to `ws://localhost:8787`.
    // *   `VOICE_API_KEY`: (Optional) Bearer token for the voice service.
    // *   `COMPANION_USER_ID`: (Optional) The signed-in user.
    // *   `COMPANION_PLANS` / `COMPANION_FEATURES`: (Optional) Comma-separated entitlements.
    // *   `CONNECT_TIMEOUT_SECS` / `QUERY_TIMEOUT_SECS`: (Optional) Defaults 10 and 5.
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. This is useful for local development and is ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let store_url = lookup("STORE_URL").filter(|v| !v.is_empty());
        let store_api_key = lookup("STORE_API_KEY").map(SecretString::from);
        if store_url.is_some() && store_api_key.is_none() {
            return Err(ConfigError::MissingVar(
                "STORE_API_KEY must be set when STORE_URL is".to_string(),
            ));
        }

        let voice_url = lookup("VOICE_URL").unwrap_or_else(|| DEFAULT_VOICE_URL.to_string());
        let voice_api_key = SecretString::from(lookup("VOICE_API_KEY").unwrap_or_default());

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            store_url,
            store_api_key,
            voice_url,
            voice_api_key,
            user_id: lookup("COMPANION_USER_ID").filter(|v| !v.is_empty()),
            plans: list(lookup("COMPANION_PLANS")),
            features: list(lookup("COMPANION_FEATURES")),
            connect_timeout: seconds(
                &lookup,
                "CONNECT_TIMEOUT_SECS",
                companion_core::config::DEFAULT_CONNECT_TIMEOUT,
            )?,
            query_timeout: seconds(
                &lookup,
                "QUERY_TIMEOUT_SECS",
                companion_core::config::DEFAULT_QUERY_TIMEOUT,
            )?,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert!(config.store_url.is_none());
        assert_eq!(config.voice_url, DEFAULT_VOICE_URL);
        assert!(config.user_id.is_none());
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.query_timeout, Duration::from_secs(5));
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    fn test_store_url_requires_key() {
        let err = load(&[("STORE_URL", "https://db.example.com/rest/v1")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(_)));
    }

    #[test]
    fn test_entitlement_lists_are_split() {
        let config = load(&[
            ("COMPANION_USER_ID", "user_1"),
            ("COMPANION_PLANS", "basic"),
            ("COMPANION_FEATURES", " 3_companion_limit, ,10_companion_limit"),
        ])
        .unwrap();
        assert_eq!(config.user_id.as_deref(), Some("user_1"));
        assert_eq!(config.plans, vec!["basic"]);
        assert_eq!(config.features, vec!["3_companion_limit", "10_companion_limit"]);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            load(&[("RUST_LOG", "loud")]),
            Err(ConfigError::InvalidLogLevel(_))
        ));
        assert!(matches!(
            load(&[("QUERY_TIMEOUT_SECS", "soon")]),
            Err(ConfigError::InvalidNumber { .. })
        ));
    }
}
