//! Data sources: read-only queries over existing objects
//!
//! Every data source takes `ids` plus its own filters, pages through the
//! matching Describe call, and stores the mapped items with `ids`,
//! `total_count` and an optional `output_file`.

pub mod lb_listeners;
pub mod lbs;
pub mod network_interfaces;
pub mod pdns_zones;

use ksyun_core::provider::DataSourceType;
use ksyun_core::schema::{AttributeSchema, AttributeType, types};

pub use lb_listeners::LbListeners;
pub use lbs::Lbs;
pub use network_interfaces::NetworkInterfaces;
pub use pdns_zones::PdnsZones;

/// Items requested per page
pub const PAGE_SIZE: usize = 100;

/// Returns all data sources supported by this provider
pub fn data_sources() -> Vec<Box<dyn DataSourceType>> {
    vec![
        Box::new(Lbs),
        Box::new(LbListeners),
        Box::new(NetworkInterfaces),
        Box::new(PdnsZones),
    ]
}

/// Computed list of result blocks: `id` plus the resource's attributes
pub(crate) fn result_list(attributes: Vec<AttributeSchema>) -> AttributeType {
    let mut fields = vec![AttributeSchema::new("id", AttributeType::String).computed()];
    fields.extend(attributes.into_iter().map(output));
    types::block_list(fields)
}

// Result fields are never configured
fn output(mut attr: AttributeSchema) -> AttributeSchema {
    attr.required = false;
    attr.optional = false;
    attr.force_new = false;
    attr.default = None;
    attr.computed = true;
    if let Some(block) = attr.attr_type.block().cloned() {
        let fields = block.into_values().map(output).collect();
        attr.attr_type = types::block_list(fields);
    }
    attr
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_fields_are_read_only() {
        let list = result_list(crate::resources::lb_listener::attributes());
        let fields = list.block().unwrap();
        assert!(fields.contains_key("id"));
        assert!(fields.values().all(AttributeSchema::is_read_only));

        let health = fields["health_check"].attr_type.block().unwrap();
        assert!(health.values().all(AttributeSchema::is_read_only));
    }

    #[test]
    fn names_are_unique() {
        let mut names: Vec<&str> = data_sources().iter().map(|d| d.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 4);
    }
}
