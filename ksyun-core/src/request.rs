//! Request - Encode resource attributes into flat wire parameters
//!
//! The schema decides which attributes exist and how they nest; a per-field
//! [`TransformRule`] decides how each value is spelled on the wire:
//!
//! | kind         | config                         | wire                                       |
//! |--------------|--------------------------------|--------------------------------------------|
//! | `Default`    | `name = "a"`                   | `Name=a`                                   |
//! | `WithN`      | `ids = ["a", "b"]`             | `Ids.1=a`, `Ids.2=b`                       |
//! | `SingleN`    | `id = "a"`                     | `Id.1=a`                                   |
//! | `ListN`      | `rules = [{port = 80}]`        | `Rules.1.Port=80`                          |
//! | `ListUnique` | `session = [{timeout = 60}]`   | `Timeout=60`                               |
//! | `WithFilter` | `vpc_id = "v"`                 | `Filter.1.Name=vpc-id`, `Filter.1.Value.1=v` |
//! | `ListFilter` | `filter = [{state = "x"}]`     | `Filter.1.Name=state`, `Filter.1.Value.1=x`  |

use std::collections::{BTreeMap, HashMap};

use crate::api::WireParams;
use crate::case_convert::{downline_to_filter, downline_to_hump};
use crate::provider::{ProviderError, ProviderResult};
use crate::resource::{ResourceData, Value};
use crate::schema::{AttributeSchema, ResourceSchema};

/// How a field is spelled on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransformKind {
    /// Scalars as-is, lists as `Name.N`, blocks as `Name.N.Sub`, maps as `Name.N.Key/Value`
    #[default]
    Default,
    /// Repeated parameter `Name.N`
    WithN,
    /// Filter encoding `Filter.N.Name` / `Filter.N.Value.M`
    WithFilter,
    /// List of blocks as `Name.N.Sub`
    ListN,
    /// Each sub-field of the first block becomes a filter
    ListFilter,
    /// Sub-fields of the first block become top-level parameters
    ListUnique,
    /// Scalar sent as `Name.1`
    SingleN,
}

/// Compute a field value from the whole resource instead of reading it
pub type ValueFn = fn(&ResourceData) -> Option<Value>;

/// Per-field encoding directive
#[derive(Debug, Clone, Default)]
pub struct TransformRule {
    /// Wire name (or filter name for filter kinds)
    pub mapping: Option<String>,
    pub kind: TransformKind,
    /// Wire names of nested block fields
    pub mappings: HashMap<String, String>,
    pub ignore: bool,
    /// Send on update even when unchanged
    pub force_update: bool,
    pub value_fn: Option<ValueFn>,
}

impl TransformRule {
    pub fn new(kind: TransformKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn with_n() -> Self {
        Self::new(TransformKind::WithN)
    }

    pub fn single_n() -> Self {
        Self::new(TransformKind::SingleN)
    }

    pub fn filter() -> Self {
        Self::new(TransformKind::WithFilter)
    }

    pub fn list_n() -> Self {
        Self::new(TransformKind::ListN)
    }

    pub fn list_filter() -> Self {
        Self::new(TransformKind::ListFilter)
    }

    pub fn list_unique() -> Self {
        Self::new(TransformKind::ListUnique)
    }

    /// Field never reaches the wire
    pub fn ignored() -> Self {
        Self {
            ignore: true,
            ..Self::default()
        }
    }

    /// Rename the field on the wire
    pub fn mapped(mut self, wire_name: impl Into<String>) -> Self {
        self.mapping = Some(wire_name.into());
        self
    }

    /// Rename a nested block field on the wire
    pub fn sub_mapping(mut self, field: impl Into<String>, wire_name: impl Into<String>) -> Self {
        self.mappings.insert(field.into(), wire_name.into());
        self
    }

    pub fn force_update(mut self) -> Self {
        self.force_update = true;
        self
    }

    pub fn value_fn(mut self, f: ValueFn) -> Self {
        self.value_fn = Some(f);
        self
    }
}

/// Builds the wire parameters of one request from a resource's data
pub struct RequestMapping<'s> {
    schema: &'s ResourceSchema,
    transforms: HashMap<String, TransformRule>,
    update: bool,
    only_transform: bool,
    extra: WireParams,
}

impl<'s> RequestMapping<'s> {
    pub fn new(schema: &'s ResourceSchema) -> Self {
        Self {
            schema,
            transforms: HashMap::new(),
            update: false,
            only_transform: false,
            extra: WireParams::new(),
        }
    }

    pub fn transform(mut self, field: impl Into<String>, rule: TransformRule) -> Self {
        self.transforms.insert(field.into(), rule);
        self
    }

    /// Encode only changed fields (plus `force_update` ones)
    pub fn update(mut self, update: bool) -> Self {
        self.update = update;
        self
    }

    /// Consider only fields that have an explicit rule
    pub fn only_transform(mut self, only: bool) -> Self {
        self.only_transform = only;
        self
    }

    /// Parameter added verbatim; overrides anything computed
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key, value);
        self
    }

    pub fn build(&self, data: &ResourceData) -> ProviderResult<WireParams> {
        let default_rule = TransformRule::default();
        let mut encoder = Encoder::default();

        for (name, attr) in &self.schema.attributes {
            let rule = match self.transforms.get(name) {
                Some(rule) => rule,
                None if self.only_transform => continue,
                None => &default_rule,
            };
            if rule.ignore || (attr.is_read_only() && rule.value_fn.is_none()) {
                continue;
            }

            let selected = if self.update {
                rule.force_update || self.schema.has_change(data, name)
            } else {
                true
            };
            if !selected {
                continue;
            }

            let value = match rule.value_fn {
                Some(f) => f(data),
                None if self.update => data.get(name).cloned(),
                None => data.get_ok(name).cloned(),
            };
            let Some(value) = value else {
                continue;
            };

            encoder
                .encode(name, attr, rule, &value)
                .map_err(|e| ProviderError::new(format!("Cannot encode '{}': {}", name, e)))?;
        }

        let mut params = encoder.params;
        params.extend(self.extra.clone());
        log::debug!(
            "request mapping for {} produced {} parameter(s)",
            self.schema.resource_type,
            params.len()
        );
        Ok(params)
    }
}

#[derive(Default)]
struct Encoder {
    params: WireParams,
    filter_index: usize,
}

impl Encoder {
    fn encode(
        &mut self,
        name: &str,
        attr: &AttributeSchema,
        rule: &TransformRule,
        value: &Value,
    ) -> Result<(), String> {
        let wire = rule
            .mapping
            .clone()
            .or_else(|| attr.provider_name.clone())
            .unwrap_or_else(|| downline_to_hump(name));
        let block = attr.attr_type.block();

        match rule.kind {
            TransformKind::Default => match value {
                Value::List(items) if block.is_some() => {
                    self.list_n(&wire, items, block, &rule.mappings)
                }
                Value::List(items) => self.with_n(&wire, items),
                Value::Map(map) => {
                    self.key_values(&wire, map);
                    Ok(())
                }
                scalar => self.scalar(wire, scalar),
            },
            TransformKind::WithN | TransformKind::SingleN => match value {
                Value::List(items) => self.with_n(&wire, items),
                scalar => self.with_n(&wire, std::slice::from_ref(scalar)),
            },
            TransformKind::ListN => match value {
                Value::List(items) => self.list_n(&wire, items, block, &rule.mappings),
                other => Err(format!("expected a list, got {:?}", other)),
            },
            TransformKind::ListUnique => match first_block(value)? {
                Some(item) => self.block("", item, block, &rule.mappings),
                None => Ok(()),
            },
            TransformKind::WithFilter => {
                let filter_name = rule
                    .mapping
                    .clone()
                    .unwrap_or_else(|| downline_to_filter(name));
                match value {
                    Value::List(items) => self.filter(&filter_name, items),
                    scalar => self.filter(&filter_name, std::slice::from_ref(scalar)),
                }
            }
            TransformKind::ListFilter => {
                let Some(item) = first_block(value)? else {
                    return Ok(());
                };
                let mut keys: Vec<&String> = item.keys().collect();
                keys.sort();
                for key in keys {
                    let filter_name = rule
                        .mappings
                        .get(key)
                        .cloned()
                        .unwrap_or_else(|| downline_to_filter(key));
                    match &item[key] {
                        Value::List(items) => self.filter(&filter_name, items)?,
                        scalar => self.filter(&filter_name, std::slice::from_ref(scalar))?,
                    }
                }
                Ok(())
            }
        }
    }

    fn scalar(&mut self, key: String, value: &Value) -> Result<(), String> {
        let json = scalar_to_json(value)?;
        self.params.insert(key, json);
        Ok(())
    }

    fn with_n(&mut self, prefix: &str, items: &[Value]) -> Result<(), String> {
        for (i, item) in items.iter().enumerate() {
            self.scalar(format!("{}.{}", prefix, i + 1), item)?;
        }
        Ok(())
    }

    fn list_n(
        &mut self,
        prefix: &str,
        items: &[Value],
        block: Option<&BTreeMap<String, AttributeSchema>>,
        mappings: &HashMap<String, String>,
    ) -> Result<(), String> {
        for (i, item) in items.iter().enumerate() {
            let key = format!("{}.{}", prefix, i + 1);
            match item {
                Value::Map(map) => self.block(&key, map, block, mappings)?,
                scalar => self.scalar(key, scalar)?,
            }
        }
        Ok(())
    }

    fn block(
        &mut self,
        prefix: &str,
        item: &HashMap<String, Value>,
        block: Option<&BTreeMap<String, AttributeSchema>>,
        mappings: &HashMap<String, String>,
    ) -> Result<(), String> {
        let mut keys: Vec<&String> = item.keys().collect();
        keys.sort();
        for field in keys {
            let sub_attr = block.and_then(|b| b.get(field));
            let sub_wire = mappings
                .get(field)
                .cloned()
                .or_else(|| sub_attr.and_then(|a| a.provider_name.clone()))
                .unwrap_or_else(|| downline_to_hump(field));
            let key = if prefix.is_empty() {
                sub_wire
            } else {
                format!("{}.{}", prefix, sub_wire)
            };
            let nested = sub_attr.and_then(|a| a.attr_type.block());
            match &item[field] {
                Value::List(items) => self.list_n(&key, items, nested, &HashMap::new())?,
                Value::Map(map) if nested.is_some() => {
                    self.block(&key, map, nested, &HashMap::new())?
                }
                Value::Map(map) => self.key_values(&key, map),
                scalar => self.scalar(key, scalar)?,
            }
        }
        Ok(())
    }

    fn key_values(&mut self, prefix: &str, map: &HashMap<String, Value>) {
        let mut keys: Vec<&String> = map.keys().collect();
        keys.sort();
        for (i, key) in keys.into_iter().enumerate() {
            let value = match &map[key] {
                Value::String(s) => serde_json::Value::String(s.clone()),
                other => other.to_json(),
            };
            self.params
                .insert(format!("{}.{}.Key", prefix, i + 1), key.clone());
            self.params
                .insert(format!("{}.{}.Value", prefix, i + 1), value);
        }
    }

    fn filter(&mut self, name: &str, values: &[Value]) -> Result<(), String> {
        if values.is_empty() {
            return Ok(());
        }
        self.filter_index += 1;
        let n = self.filter_index;
        self.params.insert(format!("Filter.{}.Name", n), name);
        for (i, value) in values.iter().enumerate() {
            let json = scalar_to_json(value)?;
            self.params
                .insert(format!("Filter.{}.Value.{}", n, i + 1), json);
        }
        Ok(())
    }
}

fn first_block(value: &Value) -> Result<Option<&HashMap<String, Value>>, String> {
    match value {
        Value::List(items) => match items.first() {
            None => Ok(None),
            Some(Value::Map(map)) => Ok(Some(map)),
            Some(other) => Err(format!("expected a block, got {:?}", other)),
        },
        Value::Map(map) => Ok(Some(map)),
        other => Err(format!("expected a block list, got {:?}", other)),
    }
}

fn scalar_to_json(value: &Value) -> Result<serde_json::Value, String> {
    match value {
        Value::String(s) => Ok(serde_json::Value::String(s.clone())),
        Value::Int(i) => Ok(serde_json::Value::from(*i)),
        Value::Float(f) => Ok(serde_json::Value::from(*f)),
        Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
        other => Err(format!("expected a scalar, got {:?}", other)),
    }
}
