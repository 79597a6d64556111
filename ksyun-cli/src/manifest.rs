//! Configuration file: provider settings, state backend, declared resources
//!
//! ```json
//! {
//!   "provider": {"region": "cn-beijing-6"},
//!   "backend": {"type": "local", "path": "ksyun.state.json"},
//!   "resources": [
//!     {"type": "ksyun_lb", "name": "web", "attributes": {"vpc_id": "vpc-1"}},
//!     {"type": "ksyun_lb_listener", "name": "http",
//!      "attributes": {"load_balancer_id": "${ksyun_lb.web.id}", "listener_port": 80}}
//!   ]
//! }
//! ```
//!
//! A string of the form `${type.name.attribute}` is replaced by that
//! attribute of an already applied resource.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use ksyun_core::resource::Value;
use ksyun_state::{BackendConfig, StateFile};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Manifest {
    #[serde(default = "empty_object")]
    pub provider: serde_json::Value,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub resources: Vec<DeclaredResource>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeclaredResource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl DeclaredResource {
    pub fn address(&self) -> String {
        format!("{}.{}", self.resource_type, self.name)
    }

    /// Attributes with references resolved against `state`; nulls are dropped
    ///
    /// Without a state, references are kept as literal strings.
    pub fn values(&self, state: Option<&StateFile>) -> Result<HashMap<String, Value>> {
        let mut values = HashMap::new();
        for (key, raw) in &self.attributes {
            let resolved = resolve(raw, state)
                .with_context(|| format!("{}: attribute '{}'", self.address(), key))?;
            if let Some(value) = Value::from_json(&resolved) {
                values.insert(key.clone(), value);
            }
        }
        Ok(values)
    }
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid configuration {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(content)?;
        let mut seen = std::collections::HashSet::new();
        for resource in &manifest.resources {
            if !seen.insert(resource.address()) {
                bail!("Duplicate resource {}", resource.address());
            }
        }
        Ok(manifest)
    }

    pub fn find(&self, resource_type: &str, name: &str) -> Option<&DeclaredResource> {
        self.resources
            .iter()
            .find(|r| r.resource_type == resource_type && r.name == name)
    }
}

/// `${type.name.attribute}` to (type, name, attribute)
fn reference(s: &str) -> Option<(&str, &str, &str)> {
    let inner = s.strip_prefix("${")?.strip_suffix('}')?;
    let mut parts = inner.splitn(3, '.');
    Some((parts.next()?, parts.next()?, parts.next()?))
}

fn resolve(raw: &serde_json::Value, state: Option<&StateFile>) -> Result<serde_json::Value> {
    match raw {
        serde_json::Value::String(s) => match (reference(s), state) {
            (Some((resource_type, name, attribute)), Some(state)) => {
                let Some(target) = state.find(resource_type, name) else {
                    bail!("{} refers to {}.{} which is not applied", s, resource_type, name);
                };
                if attribute == "id" {
                    return Ok(serde_json::Value::String(target.id.clone()));
                }
                target.attributes.get(attribute).cloned().with_context(|| {
                    format!("{}.{} has no attribute '{}'", resource_type, name, attribute)
                })
            }
            _ => Ok(raw.clone()),
        },
        serde_json::Value::Array(items) => items
            .iter()
            .map(|i| resolve(i, state))
            .collect::<Result<Vec<_>>>()
            .map(serde_json::Value::Array),
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), resolve(v, state)?)))
            .collect::<Result<serde_json::Map<_, _>>>()
            .map(serde_json::Value::Object),
        other => Ok(other.clone()),
    }
}

/// `key=value` from `--set`; the value is JSON when it parses as JSON
pub fn parse_assignment(s: &str) -> Result<(String, Value)> {
    let Some((key, raw)) = s.split_once('=') else {
        bail!("Expected key=value, got '{}'", s);
    };
    let json = serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
    let value = Value::from_json(&json).with_context(|| format!("'{}' has no value", key))?;
    Ok((key.trim().to_string(), value))
}
