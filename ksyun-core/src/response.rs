//! Response - Map wire responses back onto resource attributes
//!
//! Inverse of [`crate::request`]: JSON keys are renamed with
//! [`hump_to_downline`] (or an explicit [`ResponseMapping`]), matched
//! against the schema, and coerced to the declared types. Keys the schema
//! does not know are dropped.

use std::collections::{BTreeMap, HashMap, HashSet};

use sha2::{Digest, Sha256};

use crate::case_convert::hump_to_downline;
use crate::provider::{ProviderError, ProviderResult};
use crate::resource::{ResourceData, Value};
use crate::schema::{AttributeSchema, AttributeType, ResourceSchema};

/// Transform a raw wire value before it is stored
pub type ResponseFn = fn(&serde_json::Value) -> serde_json::Value;

/// Per-key mapping directive for responses
#[derive(Debug, Clone, Default)]
pub struct ResponseMapping {
    /// Target attribute (defaults to the snake_case of the wire key)
    pub field: Option<String>,
    /// Also store under the auto-derived name
    pub keep_auto: bool,
    pub value_fn: Option<ResponseFn>,
}

impl ResponseMapping {
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            field: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn keep_auto(mut self) -> Self {
        self.keep_auto = true;
        self
    }

    pub fn value_fn(mut self, f: ResponseFn) -> Self {
        self.value_fn = Some(f);
        self
    }
}

/// Maps one wire object (or a list of them) onto a schema
pub struct ResponseMapper<'s> {
    attributes: &'s BTreeMap<String, AttributeSchema>,
    mappings: HashMap<String, ResponseMapping>,
    excludes: HashSet<String>,
}

impl<'s> ResponseMapper<'s> {
    pub fn new(schema: &'s ResourceSchema) -> Self {
        Self::for_block(&schema.attributes)
    }

    /// Mapper over the element schema of a nested block (data source lists)
    pub fn for_block(attributes: &'s BTreeMap<String, AttributeSchema>) -> Self {
        Self {
            attributes,
            mappings: HashMap::new(),
            excludes: HashSet::new(),
        }
    }

    pub fn mapping(mut self, wire_key: impl Into<String>, mapping: ResponseMapping) -> Self {
        self.mappings.insert(wire_key.into(), mapping);
        self
    }

    /// Never map this wire key
    pub fn exclude(mut self, wire_key: impl Into<String>) -> Self {
        self.excludes.insert(wire_key.into());
        self
    }

    /// Write the attributes found in `item` into the resource state
    pub fn apply(&self, data: &mut ResourceData, item: &serde_json::Value) -> ProviderResult<()> {
        for (name, value) in self.map(item)? {
            data.set(name, value);
        }
        Ok(())
    }

    /// Attributes found in one wire object
    pub fn map(&self, item: &serde_json::Value) -> ProviderResult<HashMap<String, Value>> {
        let obj = item.as_object().ok_or_else(|| {
            ProviderError::new(format!("Expected a JSON object in response, got {}", item))
        })?;

        let mut out = HashMap::new();
        for (wire_key, raw) in obj {
            if self.excludes.contains(wire_key) {
                continue;
            }
            let mut targets = Vec::with_capacity(2);
            let raw = match self.mappings.get(wire_key) {
                Some(mapping) => {
                    if let Some(field) = &mapping.field {
                        targets.push(field.clone());
                    }
                    if mapping.keep_auto || mapping.field.is_none() {
                        targets.push(hump_to_downline(wire_key));
                    }
                    match mapping.value_fn {
                        Some(f) => f(raw),
                        None => raw.clone(),
                    }
                }
                None => {
                    targets.push(hump_to_downline(wire_key));
                    raw.clone()
                }
            };

            for target in targets {
                let Some(attr) = self.attributes.get(&target) else {
                    continue;
                };
                if let Some(value) = convert(&raw, &attr.attr_type) {
                    out.insert(target, value);
                }
            }
        }
        Ok(out)
    }

    /// Map a list of wire items, collecting each item's `id_key` value
    ///
    /// Each mapped item also carries its id under `id` when the element
    /// schema declares one.
    pub fn map_items(
        &self,
        items: &[serde_json::Value],
        id_key: &str,
    ) -> ProviderResult<(Vec<String>, Vec<Value>)> {
        let mut ids = Vec::with_capacity(items.len());
        let mut mapped = Vec::with_capacity(items.len());
        for item in items {
            let mut attrs = self.map(item)?;
            if let Some(id) = item.get(id_key).and_then(scalar_string) {
                if self.attributes.contains_key("id") {
                    attrs.insert("id".to_string(), Value::String(id.clone()));
                }
                ids.push(id);
            }
            mapped.push(Value::Map(attrs));
        }
        Ok((ids, mapped))
    }
}

/// Coerce a raw JSON value to the declared attribute type
fn convert(raw: &serde_json::Value, attr_type: &AttributeType) -> Option<Value> {
    use serde_json::Value as Json;

    if raw.is_null() {
        return None;
    }
    match attr_type.base() {
        AttributeType::String | AttributeType::Enum(_) => match raw {
            Json::String(s) => Some(Value::String(s.clone())),
            Json::Number(_) | Json::Bool(_) => Some(Value::String(raw.to_string())),
            _ => Some(Value::String(raw.to_string())),
        },
        AttributeType::Int => match raw {
            Json::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .map(Value::Int),
            Json::String(s) => s
                .trim()
                .parse::<i64>()
                .ok()
                .or_else(|| s.trim().parse::<f64>().ok().map(|f| f as i64))
                .map(Value::Int),
            Json::Bool(b) => Some(Value::Int(i64::from(*b))),
            _ => None,
        },
        AttributeType::Float => match raw {
            Json::Number(n) => n.as_f64().map(Value::Float),
            Json::String(s) => s.trim().parse::<f64>().ok().map(Value::Float),
            _ => None,
        },
        AttributeType::Bool => match raw {
            Json::Bool(b) => Some(Value::Bool(*b)),
            Json::String(s) if s.eq_ignore_ascii_case("true") => Some(Value::Bool(true)),
            Json::String(s) if s.eq_ignore_ascii_case("false") => Some(Value::Bool(false)),
            Json::Number(n) => n.as_i64().map(|i| Value::Bool(i != 0)),
            _ => None,
        },
        AttributeType::List(inner) | AttributeType::Set(inner) => match raw {
            Json::Array(items) => Some(Value::List(
                items.iter().filter_map(|i| convert(i, inner)).collect(),
            )),
            other => convert(other, inner).map(|v| Value::List(vec![v])),
        },
        AttributeType::Map(inner) => match raw {
            Json::Object(obj) => Some(Value::Map(
                obj.iter()
                    .filter_map(|(k, v)| convert(v, inner).map(|v| (k.clone(), v)))
                    .collect(),
            )),
            _ => None,
        },
        AttributeType::Block(attrs) => match raw {
            Json::Object(_) => ResponseMapper::for_block(attrs)
                .map(raw)
                .ok()
                .map(Value::Map),
            _ => None,
        },
        AttributeType::Custom { .. } => None,
    }
}

fn scalar_string(raw: &serde_json::Value) -> Option<String> {
    match raw {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Id of a data source result set: leading SHA-256 bytes over the ids
pub fn data_source_id(ids: &[String]) -> String {
    let mut hasher = Sha256::new();
    for id in ids {
        hasher.update(id.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(&hasher.finalize()[..8])
}

/// Store a data source result: `ids`, `total_count`, the list field, and
/// the list written to `output_file` when one is configured
pub async fn merge_data_source(
    data: &mut ResourceData,
    list_field: &str,
    ids: Vec<String>,
    items: Vec<Value>,
) -> ProviderResult<()> {
    data.set_id(data_source_id(&ids));
    data.set("total_count", Value::Int(items.len() as i64));
    data.set(
        "ids",
        Value::List(ids.into_iter().map(Value::String).collect()),
    );

    let output_file = data
        .get_str("output_file")
        .filter(|p| !p.is_empty())
        .map(str::to_string);
    if let Some(path) = output_file {
        let json = serde_json::Value::Array(items.iter().map(Value::to_json).collect());
        let content = serde_json::to_string_pretty(&json)
            .map_err(|e| ProviderError::new(format!("Failed to serialize results: {}", e)))?;
        tokio::fs::write(&path, content).await.map_err(|e| {
            ProviderError::new(format!("Failed to write output file '{}': {}", path, e))
        })?;
        log::info!("wrote {} item(s) to {}", items.len(), path);
    }

    data.set(list_field, Value::List(items));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types;
    use serde_json::json;

    fn lb_schema() -> ResourceSchema {
        ResourceSchema::new("ksyun_lb")
            .attribute(AttributeSchema::new("load_balancer_name", AttributeType::String))
            .attribute(AttributeSchema::new("vpc_id", AttributeType::String))
            .attribute(AttributeSchema::new("ip_version", AttributeType::String))
            .attribute(AttributeSchema::new("is_waf", AttributeType::Bool))
            .attribute(AttributeSchema::new("listeners_count", AttributeType::Int))
            .attribute(AttributeSchema::new("state", AttributeType::String))
            .attribute(AttributeSchema::new("tags", types::tags()))
            .attribute(AttributeSchema::new(
                "ipv6",
                types::block_list(vec![
                    AttributeSchema::new("address", AttributeType::String),
                    AttributeSchema::new("prefix", AttributeType::Int),
                ]),
            ))
    }

    #[test]
    fn apply_renames_and_coerces() {
        let schema = lb_schema();
        let mut data = ResourceData::new(HashMap::new());
        ResponseMapper::new(&schema)
            .apply(
                &mut data,
                &json!({
                    "LoadBalancerName": "web",
                    "VpcId": "vpc-1",
                    "IsWaf": "true",
                    "ListenersCount": "3",
                    "Unknown": "dropped",
                    "State": null,
                }),
            )
            .unwrap();

        assert_eq!(data.get_str("load_balancer_name"), Some("web"));
        assert_eq!(data.get_str("vpc_id"), Some("vpc-1"));
        assert_eq!(data.get("is_waf"), Some(&Value::Bool(true)));
        assert_eq!(data.get("listeners_count"), Some(&Value::Int(3)));
        assert!(data.get("unknown").is_none());
        assert!(data.get("state").is_none());
    }

    #[test]
    fn explicit_mapping_and_keep_auto() {
        let schema = lb_schema();
        let mapper = ResponseMapper::new(&schema)
            .mapping(
                "LoadBalancerState",
                ResponseMapping::field("state").value_fn(|v| {
                    json!(v.as_str().unwrap_or_default().to_lowercase())
                }),
            )
            .mapping("VpcId", ResponseMapping::field("load_balancer_name").keep_auto());
        let attrs = mapper
            .map(&json!({"LoadBalancerState": "Start", "VpcId": "vpc-9"}))
            .unwrap();

        assert_eq!(attrs.get("state"), Some(&Value::from("start")));
        assert_eq!(attrs.get("load_balancer_name"), Some(&Value::from("vpc-9")));
        assert_eq!(attrs.get("vpc_id"), Some(&Value::from("vpc-9")));
    }

    #[test]
    fn nested_blocks_and_maps() {
        let schema = lb_schema();
        let attrs = ResponseMapper::new(&schema)
            .map(&json!({
                "Ipv6": {"Address": "fd00::1", "Prefix": "64"},
                "Tags": {"env": "prod"},
            }))
            .unwrap();

        let ipv6 = attrs.get("ipv6").unwrap().as_list().unwrap();
        assert_eq!(ipv6.len(), 1);
        let block = ipv6[0].as_map().unwrap();
        assert_eq!(block.get("address"), Some(&Value::from("fd00::1")));
        assert_eq!(block.get("prefix"), Some(&Value::Int(64)));
        assert_eq!(
            attrs.get("tags"),
            Some(&Value::Map(HashMap::from([(
                "env".to_string(),
                Value::from("prod")
            )])))
        );
    }

    #[test]
    fn excluded_keys_are_skipped() {
        let schema = lb_schema();
        let attrs = ResponseMapper::new(&schema)
            .exclude("VpcId")
            .map(&json!({"VpcId": "vpc-1", "State": "active"}))
            .unwrap();
        assert!(!attrs.contains_key("vpc_id"));
        assert_eq!(attrs.get("state"), Some(&Value::from("active")));
    }

    #[test]
    fn non_object_response_is_an_error() {
        let schema = lb_schema();
        assert!(ResponseMapper::new(&schema).map(&json!([1, 2])).is_err());
    }

    #[test]
    fn map_items_collects_ids() {
        let element = types::block_list(vec![
            AttributeSchema::new("id", AttributeType::String),
            AttributeSchema::new("load_balancer_name", AttributeType::String),
        ]);
        let attrs = element.block().unwrap();
        let (ids, items) = ResponseMapper::for_block(attrs)
            .map_items(
                &[
                    json!({"LoadBalancerId": "lb-1", "LoadBalancerName": "a"}),
                    json!({"LoadBalancerId": "lb-2", "LoadBalancerName": "b"}),
                ],
                "LoadBalancerId",
            )
            .unwrap();

        assert_eq!(ids, vec!["lb-1".to_string(), "lb-2".to_string()]);
        let first = items[0].as_map().unwrap();
        assert_eq!(first.get("id"), Some(&Value::from("lb-1")));
        assert_eq!(first.get("load_balancer_name"), Some(&Value::from("a")));
    }

    #[tokio::test]
    async fn merge_writes_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lbs.json");
        let mut data = ResourceData::new(HashMap::from([(
            "output_file".to_string(),
            Value::String(path.to_string_lossy().to_string()),
        )]));

        let items = vec![Value::Map(HashMap::from([(
            "id".to_string(),
            Value::from("lb-1"),
        )]))];
        merge_data_source(&mut data, "lbs", vec!["lb-1".to_string()], items)
            .await
            .unwrap();

        assert_eq!(data.get("total_count"), Some(&Value::Int(1)));
        assert_eq!(
            data.get("ids"),
            Some(&Value::List(vec![Value::from("lb-1")]))
        );
        assert_eq!(data.id(), Some(data_source_id(&["lb-1".to_string()]).as_str()));

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, json!([{"id": "lb-1"}]));
    }

    #[test]
    fn data_source_id_is_fixed_per_id_list() {
        assert_eq!(data_source_id(&["lb-1".to_string()]), "8cb147d99b26f017");
        assert_eq!(data_source_id(&[]), "e3b0c44298fc1c14");
        assert_ne!(
            data_source_id(&["lb-1".to_string(), "lb-2".to_string()]),
            data_source_id(&["lb-1lb-2".to_string()])
        );
    }
}
