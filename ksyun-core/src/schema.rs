//! Schema - Declared attribute schemas for resources and data sources
//!
//! Each resource type declares its attributes once. The same declaration
//! drives configuration validation, request encoding and response mapping.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::resource::{ResourceData, Value};

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Floating point number
    Float,
    /// Boolean
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    /// Ordered list
    List(Box<AttributeType>),
    /// Unordered collection of unique values
    Set(Box<AttributeType>),
    /// Map with string keys
    Map(Box<AttributeType>),
    /// Nested element schema (used as the element type of a list)
    Block(BTreeMap<String, AttributeSchema>),
}

impl AttributeType {
    /// Nested block element of a list/set attribute, if any
    pub fn block(&self) -> Option<&BTreeMap<String, AttributeSchema>> {
        match self {
            AttributeType::Block(attrs) => Some(attrs),
            AttributeType::List(inner) | AttributeType::Set(inner) => inner.block(),
            _ => None,
        }
    }

    /// Underlying primitive for custom types
    pub fn base(&self) -> &AttributeType {
        match self {
            AttributeType::Custom { base, .. } => base.base(),
            other => other,
        }
    }

    /// Whether a configured value differs from the value last read back.
    ///
    /// Sets compare without regard to order. Block fields that only the
    /// cloud filled in (computed and not configured) are not a difference.
    pub fn differs(&self, desired: &Value, current: Option<&Value>) -> bool {
        let Some(current) = current else {
            return true;
        };
        match (self.base(), desired, current) {
            (AttributeType::List(inner), Value::List(a), Value::List(b)) => {
                a.len() != b.len() || a.iter().zip(b).any(|(d, c)| inner.differs(d, Some(c)))
            }
            (AttributeType::Set(inner), Value::List(a), Value::List(b)) => {
                let same = |d: &Value, c: &Value| !inner.differs(d, Some(c));
                a.len() != b.len()
                    || !a.iter().all(|d| b.iter().any(|c| same(d, c)))
                    || !b.iter().all(|c| a.iter().any(|d| same(d, c)))
            }
            (AttributeType::Map(inner), Value::Map(a), Value::Map(b)) => {
                a.len() != b.len() || a.iter().any(|(k, d)| inner.differs(d, b.get(k)))
            }
            (AttributeType::Block(attrs), Value::Map(a), Value::Map(b)) => {
                let configured = a.iter().any(|(k, d)| match attrs.get(k) {
                    Some(attr) => attr.attr_type.differs(d, b.get(k)),
                    None => b.get(k) != Some(d),
                });
                let dropped = b
                    .keys()
                    .filter(|k| !a.contains_key(*k))
                    .any(|k| attrs.get(k).is_some_and(|attr| !attr.computed));
                configured || dropped
            }
            (AttributeType::Float, Value::Int(d), Value::Float(c)) => *d as f64 != *c,
            _ => desired != current,
        }
    }

    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Float, Value::Float(_) | Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::Custom { validate, base, .. }, v) => {
                base.validate(v)?;
                validate(v).map_err(|msg| TypeError::ValidationFailed { message: msg })
            }

            (AttributeType::List(inner) | AttributeType::Set(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Block(attrs), Value::Map(map)) => {
                validate_attributes(attrs, map).map_err(|mut errors| errors.remove(0))
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Float => "Float".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Set(inner) => format!("Set<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::Block(_) => "Block".to_string(),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Attribute '{name}' accepts at most {max} item(s), got {got}")]
    TooManyItems { name: String, max: usize, got: usize },

    #[error("Attribute '{name}': {inner}")]
    AttributeError { name: String, inner: Box<TypeError> },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },
}

impl Value {
    fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Float(_) => "Float".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Map(_) => "Map".to_string(),
        }
    }
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    /// Set by the cloud; may also be configured when `optional` is true
    pub computed: bool,
    pub optional: bool,
    /// Changing the value requires replacing the resource
    pub force_new: bool,
    pub max_items: Option<usize>,
    pub default: Option<Value>,
    pub description: Option<String>,
    /// Wire-side parameter name when it does not follow the case convention
    pub provider_name: Option<String>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            computed: false,
            optional: false,
            force_new: false,
            max_items: None,
            default: None,
            description: None,
            provider_name: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn max_items(mut self, max: usize) -> Self {
        self.max_items = Some(max);
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = Some(name.into());
        self
    }

    /// Computed attribute that can never be configured
    pub fn is_read_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }
}

/// Build a nested block type from attribute schemas
pub fn block(attributes: Vec<AttributeSchema>) -> AttributeType {
    AttributeType::Block(
        attributes
            .into_iter()
            .map(|a| (a.name.clone(), a))
            .collect(),
    )
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: BTreeMap<String, AttributeSchema>,
    pub description: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: BTreeMap::new(),
            description: None,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Add the fields every data source shares: `ids`, `output_file`, `total_count`
    pub fn with_data_source_fields(self) -> Self {
        self.attribute(
            AttributeSchema::new("ids", AttributeType::Set(Box::new(AttributeType::String)))
                .optional()
                .with_description("A list of resource IDs to filter by."),
        )
        .attribute(
            AttributeSchema::new("output_file", AttributeType::String)
                .optional()
                .with_description("File name where to save data source results."),
        )
        .attribute(AttributeSchema::new("total_count", AttributeType::Int).computed())
    }

    pub fn get(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.get(name)
    }

    /// Whether the configured value of `key` differs from state.
    ///
    /// An attribute missing from config is never a change; computed values
    /// only live in state.
    pub fn has_change(&self, data: &ResourceData, key: &str) -> bool {
        let Some(desired) = data.config.get(key) else {
            return false;
        };
        let current = data.state.get(key);
        match self.get(key) {
            Some(attr) => attr.attr_type.differs(desired, current),
            None => current != Some(desired),
        }
    }

    /// Configured keys whose values differ from state, sorted
    pub fn changed_keys(&self, data: &ResourceData) -> Vec<String> {
        let mut keys: Vec<String> = data
            .config
            .keys()
            .filter(|k| self.has_change(data, k))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Fill in declared defaults for attributes missing from `attributes`
    pub fn apply_defaults(&self, attributes: &mut HashMap<String, Value>) {
        for (name, schema) in &self.attributes {
            if let Some(default) = &schema.default {
                attributes
                    .entry(name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
    }

    /// Validate resource attributes
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        validate_attributes(&self.attributes, attributes)
    }
}

fn validate_attributes(
    schemas: &BTreeMap<String, AttributeSchema>,
    attributes: &HashMap<String, Value>,
) -> Result<(), Vec<TypeError>> {
    let mut errors = Vec::new();

    for (name, schema) in schemas {
        if schema.required && !attributes.contains_key(name) && schema.default.is_none() {
            errors.push(TypeError::MissingRequired { name: name.clone() });
        }
    }

    for (name, value) in attributes {
        let Some(schema) = schemas.get(name) else {
            // Unknown attributes are allowed (for flexibility)
            continue;
        };
        if let (Some(max), Value::List(items)) = (schema.max_items, value)
            && items.len() > max
        {
            errors.push(TypeError::TooManyItems {
                name: name.clone(),
                max,
                got: items.len(),
            });
        }
        if let Err(e) = schema.attr_type.validate(value) {
            errors.push(TypeError::AttributeError {
                name: name.clone(),
                inner: Box::new(e),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Helper functions for common types
pub mod types {
    use super::*;

    /// Positive integer type
    pub fn positive_int() -> AttributeType {
        AttributeType::Custom {
            name: "PositiveInt".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| match value {
                Value::Int(n) if *n > 0 => Ok(()),
                Value::Int(_) => Err("Value must be positive".to_string()),
                _ => Err("Expected integer".to_string()),
            },
        }
    }

    /// TCP/UDP port type (1-65535)
    pub fn port() -> AttributeType {
        AttributeType::Custom {
            name: "Port".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| match value {
                Value::Int(n) if (1..=65535).contains(n) => Ok(()),
                Value::Int(n) => Err(format!("Port {} out of range 1-65535", n)),
                _ => Err("Expected integer".to_string()),
            },
        }
    }

    /// CIDR block type (e.g., "10.0.0.0/16")
    pub fn cidr() -> AttributeType {
        AttributeType::Custom {
            name: "Cidr".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| {
                if let Value::String(s) = value {
                    validate_cidr(s)
                } else {
                    Err("Expected string".to_string())
                }
            },
        }
    }

    /// Enum over string values
    pub fn string_enum(values: &[&str]) -> AttributeType {
        AttributeType::Enum(values.iter().map(|v| v.to_string()).collect())
    }

    /// List of strings
    pub fn string_list() -> AttributeType {
        AttributeType::List(Box::new(AttributeType::String))
    }

    /// Set of strings
    pub fn string_set() -> AttributeType {
        AttributeType::Set(Box::new(AttributeType::String))
    }

    /// List of nested blocks
    pub fn block_list(attributes: Vec<AttributeSchema>) -> AttributeType {
        AttributeType::List(Box::new(block(attributes)))
    }

    /// Tags map (key -> value)
    pub fn tags() -> AttributeType {
        AttributeType::Map(Box::new(AttributeType::String))
    }
}

/// Validate CIDR block format (e.g., "10.0.0.0/16")
pub fn validate_cidr(cidr: &str) -> Result<(), String> {
    let Some((ip, prefix)) = cidr.split_once('/') else {
        return Err(format!(
            "Invalid CIDR format '{}': expected IP/prefix",
            cidr
        ));
    };

    let octets: Vec<&str> = ip.split('.').collect();
    if octets.len() != 4 {
        return Err(format!("Invalid IP address '{}': expected 4 octets", ip));
    }

    for octet in &octets {
        if octet.parse::<u8>().is_err() {
            return Err(format!(
                "Invalid octet '{}' in IP address: must be 0-255",
                octet
            ));
        }
    }

    match prefix.parse::<u8>() {
        Ok(p) if p <= 32 => Ok(()),
        Ok(p) => Err(format!("Invalid prefix length '{}': must be 0-32", p)),
        Err(_) => Err(format!(
            "Invalid prefix length '{}': must be a number",
            prefix
        )),
    }
}
