//! State file structures

use std::collections::HashMap;

use ksyun_core::resource::Value;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    /// Format version
    pub version: u32,
    /// Grows by one on every write
    pub serial: u64,
    /// Identifies one state history; writes across lineages are refused
    pub lineage: String,
    /// Tool version that last wrote this state
    pub ksyun_version: String,
    pub resources: Vec<ResourceState>,
}

impl StateFile {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            lineage: uuid::Uuid::new_v4().to_string(),
            ksyun_version: env!("CARGO_PKG_VERSION").to_string(),
            resources: Vec::new(),
        }
    }

    /// Mark the state as modified by this version
    pub fn increment_serial(&mut self) {
        self.serial += 1;
        self.ksyun_version = env!("CARGO_PKG_VERSION").to_string();
    }

    pub fn find(&self, resource_type: &str, name: &str) -> Option<&ResourceState> {
        self.resources
            .iter()
            .find(|r| r.resource_type == resource_type && r.name == name)
    }

    /// Insert, or replace the entry with the same type and name
    pub fn upsert(&mut self, resource: ResourceState) {
        match self
            .resources
            .iter_mut()
            .find(|r| r.resource_type == resource.resource_type && r.name == resource.name)
        {
            Some(existing) => *existing = resource,
            None => self.resources.push(resource),
        }
    }

    pub fn remove(&mut self, resource_type: &str, name: &str) -> Option<ResourceState> {
        let pos = self
            .resources
            .iter()
            .position(|r| r.resource_type == resource_type && r.name == name)?;
        Some(self.resources.remove(pos))
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// Recorded state of one managed resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// e.g. "ksyun_lb"
    pub resource_type: String,
    /// Name given in the configuration file
    pub name: String,
    /// Cloud-side id
    pub id: String,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
    /// Creation did not finish; the next apply replaces the object
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub tainted: bool,
}

impl ResourceState {
    pub fn new(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            id: id.into(),
            attributes: HashMap::new(),
            tainted: false,
        }
    }

    pub fn with_tainted(mut self, tainted: bool) -> Self {
        self.tainted = tainted;
        self
    }

    /// Record attributes read from the cloud
    pub fn with_values(mut self, values: &HashMap<String, Value>) -> Self {
        self.attributes = values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        self
    }

    /// Recorded attributes as resource values; nulls are dropped
    pub fn values(&self) -> HashMap<String, Value> {
        self.attributes
            .iter()
            .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
            .collect()
    }
}
