//! Provider configuration
//!
//! Read from the `provider` block of the configuration file, then
//! overridden by `KSYUN_*` environment variables.

use std::time::Duration;

use ksyun_core::pipeline::RetryPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_REGION: &str = "KSYUN_REGION";
pub const ENV_ENDPOINT: &str = "KSYUN_ENDPOINT";
pub const ENV_ACCESS_KEY: &str = "KSYUN_ACCESS_KEY";
pub const ENV_SECRET_KEY: &str = "KSYUN_SECRET_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required provider setting: {0}")]
    Missing(&'static str),

    #[error("Invalid provider setting '{name}': {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("Failed to parse provider configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    pub region: String,
    /// Overrides `https://{service}.{region}.api.ksyun.com`
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub timeout_secs: u64,
    /// Attempts after the first one on transient errors
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub dry_run: bool,
    /// Accept invalid TLS certificates
    pub insecure: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            region: String::new(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            timeout_secs: 30,
            max_retries: 4,
            retry_delay_ms: 3000,
            dry_run: false,
            insecure: false,
        }
    }
}

impl ProviderConfig {
    /// Parse a `provider` block and apply environment overrides
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ConfigError> {
        let config: ProviderConfig = serde_json::from_value(value.clone())?;
        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup` (normally the process environment)
    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(region) = non_empty(ENV_REGION) {
            self.region = region;
        }
        if let Some(endpoint) = non_empty(ENV_ENDPOINT) {
            self.endpoint = Some(endpoint);
        }
        if let Some(key) = non_empty(ENV_ACCESS_KEY) {
            self.access_key = Some(key);
        }
        if let Some(secret) = non_empty(ENV_SECRET_KEY) {
            self.secret_key = Some(secret);
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region.trim().is_empty() {
            return Err(ConfigError::Missing("region"));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if let Some(endpoint) = &self.endpoint
            && !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
        {
            return Err(ConfigError::Invalid {
                name: "endpoint",
                reason: format!("'{}' is not an http(s) URL", endpoint),
            });
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(self.max_retries.saturating_add(1))
            .with_delay(Duration::from_millis(self.retry_delay_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn parses_block_with_defaults() {
        let config: ProviderConfig =
            serde_json::from_value(json!({"region": "cn-beijing-6", "dry_run": true})).unwrap();
        let config = config.with_env_overrides(env(&[])).unwrap();

        assert_eq!(config.region, "cn-beijing-6");
        assert!(config.dry_run);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.retry_policy().max_attempts, 5);
    }

    #[test]
    fn environment_overrides_file() {
        let config = ProviderConfig {
            region: "cn-beijing-6".to_string(),
            ..ProviderConfig::default()
        }
        .with_env_overrides(env(&[
            (ENV_REGION, "cn-shanghai-2"),
            (ENV_ACCESS_KEY, "AK"),
            (ENV_SECRET_KEY, ""),
        ]))
        .unwrap();

        assert_eq!(config.region, "cn-shanghai-2");
        assert_eq!(config.access_key.as_deref(), Some("AK"));
        assert_eq!(config.secret_key, None);
    }

    #[test]
    fn region_is_required() {
        let err = ProviderConfig::default()
            .with_env_overrides(env(&[]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("region")));
    }

    #[test]
    fn endpoint_must_be_a_url() {
        let err = ProviderConfig {
            region: "cn-beijing-6".to_string(),
            endpoint: Some("localhost:8080".to_string()),
            ..ProviderConfig::default()
        }
        .validate()
        .unwrap_err();
        assert!(err.to_string().contains("endpoint"));
    }

    #[test]
    fn malformed_block_is_a_parse_error() {
        let err = serde_json::from_value::<ProviderConfig>(json!({"region": 5})).unwrap_err();
        assert!(ConfigError::from(err).to_string().starts_with("Failed to parse"));
    }
}
