//! Ksyun provider: configuration plus the HTTP client shared by every resource

use std::sync::Arc;

use ksyun_core::api::{ApiClient, ApiResult};
use ksyun_core::provider::ProviderContext;

use crate::client::HttpApiClient;
use crate::config::ProviderConfig;

/// Maximum time spent waiting for an object to reach its target status
const WAIT_TIMEOUT_SECS: u64 = 600;

pub struct KsyunProvider {
    config: ProviderConfig,
    client: Arc<dyn ApiClient>,
}

impl KsyunProvider {
    /// Create a provider talking to the real API
    pub fn new(config: ProviderConfig) -> ApiResult<Self> {
        let client = Arc::new(HttpApiClient::new(&config)?);
        log::info!("ksyun provider for region {}", config.region);
        Ok(Self { config, client })
    }

    /// Create a provider over an arbitrary client
    pub fn with_client(config: ProviderConfig, client: Arc<dyn ApiClient>) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Context handed to every resource and data source operation
    pub fn context(&self) -> ProviderContext {
        ProviderContext::new(self.client.clone(), self.config.region.as_str())
            .with_retry(self.config.retry_policy())
            .with_dry_run(self.config.dry_run)
            .with_wait_timeout(std::time::Duration::from_secs(WAIT_TIMEOUT_SECS))
    }
}
