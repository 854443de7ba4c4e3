//! Configuration (layered: code > env > defaults).

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

use crate::error::{Result, TesseraError};

/// Global default config (lazy-initialized from env).
static DEFAULT_CONFIG: OnceLock<TesseraConfig> = OnceLock::new();

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_MAX_ITERATIONS: usize = 20;
pub const DEFAULT_MODEL: &str = "gpt-5-nano";

/// Layered configuration.
///
/// Credentials and endpoints are keyed by provider name so several wire
/// protocols can be configured side by side.
#[derive(Debug, Clone)]
pub struct TesseraConfig {
    api_keys: Arc<RwLock<HashMap<String, String>>>,
    base_urls: Arc<RwLock<HashMap<String, String>>>,
    pub organization: Option<String>,
    pub project: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub max_iterations: usize,
    pub default_model: String,
}

impl Default for TesseraConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TesseraConfig {
    /// Empty config with built-in defaults.
    pub fn new() -> Self {
        Self {
            api_keys: Arc::new(RwLock::new(HashMap::new())),
            base_urls: Arc::new(RwLock::new(HashMap::new())),
            organization: None,
            project: None,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Load from environment variables, reading `.env` first if present.
    ///
    /// Unparseable numeric overrides are ignored with a warning.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = Self::new();

        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.set_api_key("openai", key);
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            config.set_base_url("openai", url);
        }
        config.organization = std::env::var("OPENAI_ORG_ID").ok();
        config.project = std::env::var("OPENAI_PROJECT_ID").ok();

        if let Some(secs) = env_parse::<u64>("TESSERA_TIMEOUT_SECS") {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = env_parse::<u32>("TESSERA_MAX_RETRIES") {
            config.max_retries = retries;
        }

        config
    }

    /// Get (or create) the global default config.
    pub fn global() -> &'static TesseraConfig {
        DEFAULT_CONFIG.get_or_init(Self::from_env)
    }

    pub fn set_api_key(&self, provider: &str, key: impl Into<String>) {
        if let Ok(mut keys) = self.api_keys.write() {
            keys.insert(provider.to_string(), key.into());
        }
    }

    pub fn get_api_key(&self, provider: &str) -> Option<String> {
        self.api_keys.read().ok()?.get(provider).cloned()
    }

    /// API key for `provider`, or an authentication error naming the variable to set.
    pub fn require_api_key(&self, provider: &str) -> Result<String> {
        self.get_api_key(provider).ok_or_else(|| {
            TesseraError::Authentication(format!(
                "missing API key for '{provider}'; set {}_API_KEY or call set_api_key",
                provider.to_uppercase()
            ))
        })
    }

    pub fn set_base_url(&self, provider: &str, url: impl Into<String>) {
        if let Ok(mut urls) = self.base_urls.write() {
            urls.insert(provider.to_string(), url.into());
        }
    }

    pub fn get_base_url(&self, provider: &str) -> Option<String> {
        self.base_urls.read().ok()?.get(provider).cloned()
    }

    pub fn has_credentials(&self, provider: &str) -> bool {
        self.get_api_key(provider).is_some()
    }
}

fn env_parse<T: FromStr>(var: &str) -> Option<T> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var, value = %raw, "ignoring unparseable configuration override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TesseraConfig::new();
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_iterations, 20);
        assert_eq!(config.default_model, "gpt-5-nano");
    }

    #[test]
    fn keys_are_per_provider() {
        let config = TesseraConfig::new();
        config.set_api_key("openai", "sk-test");
        assert_eq!(config.get_api_key("openai").as_deref(), Some("sk-test"));
        assert!(config.get_api_key("other").is_none());
        assert!(config.has_credentials("openai"));
    }

    #[test]
    fn clones_share_credential_maps() {
        let config = TesseraConfig::new();
        let clone = config.clone();
        clone.set_base_url("openai", "http://localhost:1234/v1");
        assert_eq!(
            config.get_base_url("openai").as_deref(),
            Some("http://localhost:1234/v1")
        );
    }

    #[test]
    fn missing_key_is_an_auth_error() {
        let err = TesseraConfig::new().require_api_key("openai").unwrap_err();
        assert_eq!(err.code().to_string(), "api.auth.failed");
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}
