//! ksyun_lbs - Query load balancers

use async_trait::async_trait;
use ksyun_core::pagination::page_query;
use ksyun_core::provider::{DataSourceType, ProviderContext, ProviderResult};
use ksyun_core::request::{RequestMapping, TransformRule};
use ksyun_core::resource::ResourceData;
use ksyun_core::response::merge_data_source;
use ksyun_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::{PAGE_SIZE, result_list};
use crate::resources::lb::{self, SERVICE};
use crate::utils::{call, items};

pub struct Lbs;

#[async_trait]
impl DataSourceType for Lbs {
    fn name(&self) -> &'static str {
        "ksyun_lbs"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("ksyun_lbs")
            .with_description("Lists load balancers matching the given filters.")
            .with_data_source_fields()
            .attribute(AttributeSchema::new("vpc_id", types::string_set()).optional())
            .attribute(AttributeSchema::new("project_id", types::string_set()).optional())
            .attribute(AttributeSchema::new("state", AttributeType::String).optional())
            .attribute(AttributeSchema::new("lbs", result_list(lb::attributes())).computed())
    }

    async fn read(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        let schema = self.schema();
        let condition = RequestMapping::new(&schema)
            .only_transform(true)
            .transform("ids", TransformRule::with_n().mapped("LoadBalancerId"))
            .transform("vpc_id", TransformRule::filter().mapped("vpc-id"))
            .transform("state", TransformRule::filter().mapped("state"))
            .transform("project_id", TransformRule::with_n().mapped("ProjectId"))
            .build(data)?;

        let found = page_query(&condition, "MaxResults", "Offset", PAGE_SIZE, 0, |params| async move {
            let response = call(ctx, SERVICE, "DescribeLoadBalancers", &params).await?;
            Ok(items(&response, "LoadBalancerDescriptions"))
        })
        .await?;

        let Some(block) = schema.get("lbs").and_then(|a| a.attr_type.block()) else {
            return Ok(());
        };
        let (ids, mapped) = lb::response_mapper(block).map_items(&found, "LoadBalancerId")?;
        log::info!("found {} load balancer(s)", ids.len());
        merge_data_source(data, "lbs", ids, mapped).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedClient, context};
    use ksyun_core::resource::Value;
    use serde_json::json;
    use std::collections::HashMap;

    fn lb(i: usize) -> serde_json::Value {
        json!({
            "LoadBalancerId": format!("lb-{}", i),
            "LoadBalancerName": format!("web-{}", i),
            "VpcId": "vpc-1",
            "State": "associate",
            "TagSet": [{"TagKey": "env", "TagValue": "prod"}],
        })
    }

    #[tokio::test]
    async fn pages_by_offset_and_maps_items() {
        let client = ScriptedClient::new();
        client
            .respond(
                "DescribeLoadBalancers",
                json!({"LoadBalancerDescriptions": (0..PAGE_SIZE).map(lb).collect::<Vec<_>>()}),
            )
            .respond(
                "DescribeLoadBalancers",
                json!({"LoadBalancerDescriptions": [lb(PAGE_SIZE)]}),
            );
        let ctx = context(client.clone());

        let mut data = ResourceData::new(HashMap::from([(
            "vpc_id".to_string(),
            Value::List(vec![Value::from("vpc-1")]),
        )]));
        Lbs.read(&ctx, &mut data).await.unwrap();

        let pages = client.params_of("DescribeLoadBalancers");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].get("Offset"), Some(&json!(0)));
        assert_eq!(pages[1].get("Offset"), Some(&json!(100)));
        assert_eq!(pages[1].get("MaxResults"), Some(&json!(100)));
        assert_eq!(pages[0].get_str("Filter.1.Name"), Some("vpc-id"));
        assert_eq!(pages[0].get_str("Filter.1.Value.1"), Some("vpc-1"));

        assert_eq!(data.state.get("total_count"), Some(&Value::Int(101)));
        let lbs = data.state["lbs"].as_list().unwrap();
        let first = lbs[0].as_map().unwrap();
        assert_eq!(first.get("id"), Some(&Value::from("lb-0")));
        assert_eq!(first.get("load_balancer_name"), Some(&Value::from("web-0")));
        assert_eq!(
            first.get("tags"),
            Some(&Value::Map(HashMap::from([(
                "env".to_string(),
                Value::from("prod")
            )])))
        );
        assert!(data.id().is_some());
    }

    #[tokio::test]
    async fn ids_are_sent_indexed() {
        let client = ScriptedClient::new();
        client.respond(
            "DescribeLoadBalancers",
            json!({"LoadBalancerDescriptions": [lb(1), lb(2)]}),
        );
        let ctx = context(client.clone());

        let mut data = ResourceData::new(HashMap::from([(
            "ids".to_string(),
            Value::List(vec![Value::from("lb-1"), Value::from("lb-2")]),
        )]));
        Lbs.read(&ctx, &mut data).await.unwrap();

        let params = &client.params_of("DescribeLoadBalancers")[0];
        assert_eq!(params.get_str("LoadBalancerId.1"), Some("lb-1"));
        assert_eq!(params.get_str("LoadBalancerId.2"), Some("lb-2"));
        assert_eq!(
            data.state.get("ids"),
            Some(&Value::List(vec![Value::from("lb-1"), Value::from("lb-2")]))
        );
    }

    #[tokio::test]
    async fn empty_result_still_sets_id() {
        let client = ScriptedClient::new();
        let ctx = context(client.clone());
        let mut data = ResourceData::new(HashMap::new());
        Lbs.read(&ctx, &mut data).await.unwrap();
        assert_eq!(data.state.get("total_count"), Some(&Value::Int(0)));
        assert_eq!(data.state.get("lbs"), Some(&Value::List(vec![])));
        assert!(data.id().is_some());
    }
}
