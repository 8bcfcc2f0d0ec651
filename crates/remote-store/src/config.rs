//! Remote store connection settings.

use std::time::Duration;

use crate::error::{RemoteStoreClientError, Result};

/// Default timeout for API requests.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Schema used when `LEDGERLINE_REMOTE_SCHEMA` is unset.
pub const DEFAULT_SCHEMA: &str = "public";

pub const REMOTE_URL_ENV: &str = "LEDGERLINE_REMOTE_URL";
pub const REMOTE_API_KEY_ENV: &str = "LEDGERLINE_REMOTE_API_KEY";
pub const REMOTE_SCHEMA_ENV: &str = "LEDGERLINE_REMOTE_SCHEMA";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStoreConfig {
    /// Project URL without the `/rest/v1` suffix.
    pub base_url: String,
    /// Public (anon) key sent as the `apikey` header.
    pub api_key: String,
    pub schema: String,
    pub timeout: Duration,
}

impl RemoteStoreConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            schema: DEFAULT_SCHEMA.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Reads the connection settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| RemoteStoreClientError::Config(format!("{} is not set", key)))
        };
        let mut config = Self::new(required(REMOTE_URL_ENV)?, required(REMOTE_API_KEY_ENV)?);
        if let Some(schema) = lookup(REMOTE_SCHEMA_ENV).filter(|value| !value.trim().is_empty()) {
            config.schema = schema.trim().to_string();
        }
        Ok(config)
    }

    pub(crate) fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn reads_url_key_and_optional_schema() {
        let config = RemoteStoreConfig::from_lookup(lookup(&[
            (REMOTE_URL_ENV, "https://abc.supabase.co/"),
            (REMOTE_API_KEY_ENV, "anon-key"),
        ]))
        .unwrap();
        assert_eq!(config.base_url, "https://abc.supabase.co");
        assert_eq!(config.schema, DEFAULT_SCHEMA);
        assert_eq!(config.rest_url("accounts"), "https://abc.supabase.co/rest/v1/accounts");

        let config = RemoteStoreConfig::from_lookup(lookup(&[
            (REMOTE_URL_ENV, "https://abc.supabase.co"),
            (REMOTE_API_KEY_ENV, "anon-key"),
            (REMOTE_SCHEMA_ENV, "finance"),
        ]))
        .unwrap();
        assert_eq!(config.schema, "finance");
    }

    #[test]
    fn missing_url_is_a_config_error() {
        let err = RemoteStoreConfig::from_lookup(lookup(&[(REMOTE_API_KEY_ENV, "anon-key")]))
            .unwrap_err();
        assert!(matches!(err, RemoteStoreClientError::Config(_)));
    }
}
