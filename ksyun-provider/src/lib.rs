//! Ksyun Provider
//!
//! Kingsoft Cloud resources and data sources over the Ksyun query API.
//!
//! ## Module Structure
//!
//! - `config` - Provider configuration and environment overrides
//! - `client` - HTTP client for the query API
//! - `provider` - KsyunProvider and its operation context
//! - `resources` - Managed resource types
//! - `data_sources` - Read-only queries
//! - `utils` - Composite ids and response helpers

pub mod client;
pub mod config;
pub mod data_sources;
pub mod provider;
pub mod resources;
pub mod utils;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, ProviderConfig};
pub use provider::KsyunProvider;

use ksyun_core::provider::{DataSourceType, Provider, ResourceType};

impl Provider for KsyunProvider {
    fn name(&self) -> &'static str {
        "ksyun"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resources::resource_types()
    }

    fn data_sources(&self) -> Vec<Box<dyn DataSourceType>> {
        data_sources::data_sources()
    }
}
