//! Store endpoint configuration.
//!
//! The terminal is configured through the environment: endpoint URL and
//! access key. Both are required for any operation — a store built without
//! them fails every call with `StoreError::Unconfigured`.

pub const ENV_STORE_URL: &str = "SUPABASE_URL";
pub const ENV_STORE_KEY: &str = "SUPABASE_ANON_KEY";

/// Endpoint URL and access key for the hosted store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub url: String,
    pub key: String,
}

impl StoreConfig {
    pub fn new(url: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key: key.into(),
        }
    }

    /// Read the configuration from the environment. Returns `None` unless
    /// both values are present and non-blank.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var(ENV_STORE_URL).ok()?;
        let key = std::env::var(ENV_STORE_KEY).ok()?;
        let url = url.trim();
        let key = key.trim();
        if url.is_empty() || key.is_empty() {
            return None;
        }
        Some(Self::new(url, key))
    }
}

/// The terminal is considered configured when both the store URL and the
/// access key are present in the environment.
pub fn is_configured() -> bool {
    StoreConfig::from_env().is_some()
}
