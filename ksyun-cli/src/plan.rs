//! Decide what apply does with one resource

use std::fmt;

use colored::Colorize;
use ksyun_core::resource::ResourceData;
use ksyun_core::schema::ResourceSchema;

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Create,
    Update(Vec<String>),
    /// A changed attribute forces delete + create
    Replace(Vec<String>),
    NoOp,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Create => write!(f, "{}", "+".green().bold()),
            Action::Update(_) => write!(f, "{}", "~".yellow().bold()),
            Action::Replace(_) => write!(f, "{}", "-/+".red().bold()),
            Action::NoOp => write!(f, "{}", "=".dimmed()),
        }
    }
}

/// Action for a resource whose state has just been refreshed
pub fn decide(schema: &ResourceSchema, data: &ResourceData) -> Action {
    if data.is_new_resource() {
        return Action::Create;
    }

    let changed = schema.changed_keys(data);
    if changed.is_empty() {
        return Action::NoOp;
    }

    let replace = changed
        .iter()
        .any(|key| schema.get(key).is_some_and(|a| a.force_new));
    if replace {
        Action::Replace(changed)
    } else {
        Action::Update(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ksyun_core::resource::Value;
    use ksyun_core::schema::{AttributeSchema, AttributeType, types};
    use std::collections::HashMap;

    fn schema() -> ResourceSchema {
        ResourceSchema::new("ksyun_network_interface")
            .attribute(
                AttributeSchema::new("subnet_id", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(AttributeSchema::new("security_group_ids", types::string_set()).required())
            .attribute(AttributeSchema::new("network_interface_name", AttributeType::String).optional())
    }

    fn groups(ids: &[&str]) -> Value {
        Value::List(ids.iter().map(|id| Value::from(*id)).collect())
    }

    fn config(subnet: &str, name: &str, sgs: &[&str]) -> HashMap<String, Value> {
        HashMap::from([
            ("subnet_id".to_string(), Value::from(subnet)),
            ("network_interface_name".to_string(), Value::from(name)),
            ("security_group_ids".to_string(), groups(sgs)),
        ])
    }

    #[test]
    fn unknown_resource_is_created() {
        let data = ResourceData::new(config("subnet-1", "eni", &["sg-1"]));
        assert_eq!(decide(&schema(), &data), Action::Create);
    }

    #[test]
    fn reordered_set_is_unchanged() {
        let data = ResourceData::existing(
            "eni-1",
            config("subnet-1", "eni", &["sg-1", "sg-2"]),
            config("subnet-1", "eni", &["sg-2", "sg-1"]),
        );
        assert_eq!(decide(&schema(), &data), Action::NoOp);
    }

    #[test]
    fn in_place_and_force_new_changes() {
        let data = ResourceData::existing(
            "eni-1",
            config("subnet-1", "renamed", &["sg-1"]),
            config("subnet-1", "eni", &["sg-1"]),
        );
        assert_eq!(
            decide(&schema(), &data),
            Action::Update(vec!["network_interface_name".to_string()])
        );

        let data = ResourceData::existing(
            "eni-1",
            config("subnet-2", "renamed", &["sg-1"]),
            config("subnet-1", "eni", &["sg-1"]),
        );
        assert_eq!(
            decide(&schema(), &data),
            Action::Replace(vec![
                "network_interface_name".to_string(),
                "subnet_id".to_string()
            ])
        );
    }
}
