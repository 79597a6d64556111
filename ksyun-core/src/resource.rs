//! Resource - Attribute values and the working record of a resource

use std::collections::HashMap;

/// Unique identifier for a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    /// Resource type (e.g., "ksyun_lb", "ksyun_lb_listener")
    pub resource_type: String,
    /// Resource name (identifier chosen in configuration)
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

/// Attribute value of a resource
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl Value {
    /// Whether this is the unset value of its kind.
    ///
    /// Create requests only carry fields that are set to something other than
    /// their zero value.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::String(s) => s.is_empty(),
            Value::Int(i) => *i == 0,
            Value::Float(f) => *f == 0.0,
            Value::Bool(b) => !b,
            Value::List(items) => items.is_empty(),
            Value::Map(map) => map.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Convert a JSON value without schema guidance.
    ///
    /// `null` has no counterpart and yields `None`; `null` entries inside
    /// arrays and objects are dropped.
    pub fn from_json(value: &serde_json::Value) -> Option<Value> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Value::Int(i))
                } else {
                    n.as_f64().map(Value::Float)
                }
            }
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            serde_json::Value::Array(arr) => {
                Some(Value::List(arr.iter().filter_map(Value::from_json).collect()))
            }
            serde_json::Value::Object(obj) => Some(Value::Map(
                obj.iter()
                    .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
                    .collect(),
            )),
        }
    }

    /// Convert to JSON (used for state files and `output_file`)
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                serde_json::Value::Object(
                    keys.into_iter()
                        .map(|k| (k.clone(), map[k].to_json()))
                        .collect(),
                )
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Working record of one resource during a lifecycle operation
///
/// `config` holds the desired attributes, `state` the last attributes read
/// back from the cloud. Reads and response mapping write into `state`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceData {
    id: Option<String>,
    pub config: HashMap<String, Value>,
    pub state: HashMap<String, Value>,
}

impl ResourceData {
    /// Record for a resource that does not exist yet
    pub fn new(config: HashMap<String, Value>) -> Self {
        Self {
            id: None,
            config,
            state: HashMap::new(),
        }
    }

    /// Record for a known resource with its previous state
    pub fn existing(
        id: impl Into<String>,
        config: HashMap<String, Value>,
        state: HashMap<String, Value>,
    ) -> Self {
        Self {
            id: Some(id.into()),
            config,
            state,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    /// Mark the resource as gone
    pub fn clear_id(&mut self) {
        self.id = None;
        self.state.clear();
    }

    pub fn is_new_resource(&self) -> bool {
        self.id.is_none()
    }

    /// Configured value, falling back to the last known state
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.config.get(key).or_else(|| self.state.get(key))
    }

    /// Value that is present and not the zero value of its kind
    pub fn get_ok(&self, key: &str) -> Option<&Value> {
        self.get(key).filter(|v| !v.is_zero())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.state.insert(key.into(), value);
    }

    pub fn into_state(self) -> HashMap<String, Value> {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn zero_values() {
        assert!(Value::String(String::new()).is_zero());
        assert!(Value::Int(0).is_zero());
        assert!(Value::Bool(false).is_zero());
        assert!(Value::List(vec![]).is_zero());
        assert!(!Value::String("a".to_string()).is_zero());
        assert!(!Value::Int(-1).is_zero());
    }

    #[test]
    fn json_conversion_drops_nulls() {
        let value = Value::from_json(&json!({"a": 1, "b": null, "c": [true, null, "x"]})).unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map.get("a"), Some(&Value::Int(1)));
        assert!(!map.contains_key("b"));
        assert_eq!(
            map.get("c"),
            Some(&Value::List(vec![Value::Bool(true), Value::from("x")]))
        );
        assert_eq!(value.to_json(), json!({"a": 1, "c": [true, "x"]}));
    }

    #[test]
    fn get_prefers_config() {
        let mut data = ResourceData::new(HashMap::new()).with_attribute("name", Value::from("a"));
        data.set("name", Value::from("b"));
        data.set("computed", Value::from("c"));
        assert_eq!(data.get_str("name"), Some("a"));
        assert_eq!(data.get_str("computed"), Some("c"));
        assert!(data.get_ok("missing").is_none());
    }

    #[test]
    fn clear_id_drops_state() {
        let mut data = ResourceData::existing("lb-1", HashMap::new(), HashMap::new());
        data.set("name", Value::from("x"));
        data.clear_id();
        assert!(data.id().is_none());
        assert!(data.state.is_empty());
    }
}
