//! ksyun_pdns_zones - Query private DNS zones
//!
//! DescribePdnsZones pages by page number, starting at 1.

use async_trait::async_trait;
use ksyun_core::pagination::page_query;
use ksyun_core::provider::{DataSourceType, ProviderContext, ProviderResult};
use ksyun_core::request::{RequestMapping, TransformRule};
use ksyun_core::resource::ResourceData;
use ksyun_core::response::merge_data_source;
use ksyun_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

use super::{PAGE_SIZE, result_list};
use crate::resources::pdns_zone::{self, SERVICE};
use crate::utils::{call, items};

pub struct PdnsZones;

#[async_trait]
impl DataSourceType for PdnsZones {
    fn name(&self) -> &'static str {
        "ksyun_pdns_zones"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("ksyun_pdns_zones")
            .with_description("Lists private DNS zones.")
            .with_data_source_fields()
            .attribute(AttributeSchema::new("zone_name", AttributeType::String).optional())
            .attribute(AttributeSchema::new("zones", result_list(pdns_zone::attributes())).computed())
    }

    async fn read(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        let schema = self.schema();
        let condition = RequestMapping::new(&schema)
            .only_transform(true)
            .transform("ids", TransformRule::with_n().mapped("ZoneIds"))
            .transform("zone_name", TransformRule::default())
            .build(data)?;

        let found = page_query(&condition, "PageSize", "PageNumber", PAGE_SIZE, 1, |params| async move {
            let response = call(ctx, SERVICE, "DescribePdnsZones", &params).await?;
            Ok(items(&response, "ZoneSet"))
        })
        .await?;

        let Some(block) = schema.get("zones").and_then(|a| a.attr_type.block()) else {
            return Ok(());
        };
        let (ids, mapped) = pdns_zone::response_mapper(block).map_items(&found, "ZoneId")?;
        log::info!("found {} private DNS zone(s)", ids.len());
        merge_data_source(data, "zones", ids, mapped).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedClient, context};
    use ksyun_core::resource::Value;
    use serde_json::json;
    use std::collections::HashMap;

    fn zone(i: usize) -> serde_json::Value {
        json!({
            "ZoneId": format!("zone-{}", i),
            "ZoneName": format!("z{}.internal", i),
            "ZoneTtl": 600,
            "BindVpcSet": [{"RegionName": "cn-beijing-6", "VpcId": "vpc-1"}],
        })
    }

    #[tokio::test]
    async fn pages_by_page_number() {
        let client = ScriptedClient::new();
        client
            .respond(
                "DescribePdnsZones",
                json!({"ZoneSet": (0..PAGE_SIZE).map(zone).collect::<Vec<_>>()}),
            )
            .respond("DescribePdnsZones", json!({"ZoneSet": []}));
        let ctx = context(client.clone());

        let mut data = ResourceData::new(HashMap::from([(
            "zone_name".to_string(),
            Value::from("corp.internal"),
        )]));
        PdnsZones.read(&ctx, &mut data).await.unwrap();

        let pages = client.params_of("DescribePdnsZones");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].get("PageNumber"), Some(&json!(1)));
        assert_eq!(pages[1].get("PageNumber"), Some(&json!(2)));
        assert_eq!(pages[0].get("PageSize"), Some(&json!(100)));
        assert_eq!(pages[0].get_str("ZoneName"), Some("corp.internal"));

        assert_eq!(data.state.get("total_count"), Some(&Value::Int(100)));
        let zones = data.state["zones"].as_list().unwrap();
        let first = zones[0].as_map().unwrap();
        assert_eq!(first.get("id"), Some(&Value::from("zone-0")));
        assert_eq!(first.get("zone_ttl"), Some(&Value::Int(600)));
        let binding = first["bind_vpc"].as_list().unwrap()[0].as_map().unwrap();
        assert_eq!(binding.get("vpc_id"), Some(&Value::from("vpc-1")));
    }

    #[tokio::test]
    async fn ids_use_zone_ids_parameter() {
        let client = ScriptedClient::new();
        client.respond("DescribePdnsZones", json!({"ZoneSet": [zone(7)]}));
        let ctx = context(client.clone());

        let mut data = ResourceData::new(HashMap::from([(
            "ids".to_string(),
            Value::List(vec![Value::from("zone-7")]),
        )]));
        PdnsZones.read(&ctx, &mut data).await.unwrap();

        let params = &client.params_of("DescribePdnsZones")[0];
        assert_eq!(params.get_str("ZoneIds.1"), Some("zone-7"));
        assert_eq!(data.state.get("total_count"), Some(&Value::Int(1)));
    }
}
