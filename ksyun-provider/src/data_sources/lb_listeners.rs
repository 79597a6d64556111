//! ksyun_lb_listeners - Query listeners of load balancers

use async_trait::async_trait;
use ksyun_core::pagination::page_query_with_next_token;
use ksyun_core::provider::{DataSourceType, ProviderContext, ProviderResult};
use ksyun_core::request::{RequestMapping, TransformRule};
use ksyun_core::resource::ResourceData;
use ksyun_core::response::merge_data_source;
use ksyun_core::schema::{AttributeSchema, ResourceSchema, types};

use super::{PAGE_SIZE, result_list};
use crate::resources::lb::SERVICE;
use crate::resources::lb_listener;
use crate::utils::{call, items, str_field};

pub struct LbListeners;

#[async_trait]
impl DataSourceType for LbListeners {
    fn name(&self) -> &'static str {
        "ksyun_lb_listeners"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("ksyun_lb_listeners")
            .with_description("Lists listeners matching the given filters.")
            .with_data_source_fields()
            .attribute(AttributeSchema::new("load_balancer_id", types::string_set()).optional())
            .attribute(
                AttributeSchema::new("listeners", result_list(lb_listener::attributes()))
                    .computed(),
            )
    }

    async fn read(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        let schema = self.schema();
        let condition = RequestMapping::new(&schema)
            .only_transform(true)
            .transform("ids", TransformRule::with_n().mapped("ListenerId"))
            .transform(
                "load_balancer_id",
                TransformRule::filter().mapped("load-balancer-id"),
            )
            .build(data)?;

        let found = page_query_with_next_token(
            &condition,
            "MaxResults",
            "NextToken",
            PAGE_SIZE,
            |params| async move {
                let response = call(ctx, SERVICE, "DescribeListeners", &params).await?;
                Ok((
                    items(&response, "ListenerSet"),
                    str_field(&response, "NextToken"),
                ))
            },
        )
        .await?;

        let Some(block) = schema.get("listeners").and_then(|a| a.attr_type.block()) else {
            return Ok(());
        };
        let (ids, mapped) = lb_listener::response_mapper(block).map_items(&found, "ListenerId")?;
        log::info!("found {} listener(s)", ids.len());
        merge_data_source(data, "listeners", ids, mapped).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedClient, context};
    use ksyun_core::resource::Value;
    use serde_json::json;
    use std::collections::HashMap;

    fn listener(i: usize) -> serde_json::Value {
        json!({
            "ListenerId": format!("lsn-{}", i),
            "LoadBalancerId": "lb-1",
            "ListenerProtocol": "TCP",
            "ListenerPort": 8000 + i,
            "HealthCheck": {"HealthCheckId": format!("hc-{}", i), "Interval": 5},
        })
    }

    #[tokio::test]
    async fn follows_next_token() {
        let client = ScriptedClient::new();
        client
            .respond(
                "DescribeListeners",
                json!({
                    "ListenerSet": (0..PAGE_SIZE).map(listener).collect::<Vec<_>>(),
                    "NextToken": "page-2",
                }),
            )
            .respond(
                "DescribeListeners",
                json!({"ListenerSet": [listener(PAGE_SIZE)], "NextToken": "page-3"}),
            );
        let ctx = context(client.clone());

        let mut data = ResourceData::new(HashMap::from([(
            "load_balancer_id".to_string(),
            Value::List(vec![Value::from("lb-1")]),
        )]));
        LbListeners.read(&ctx, &mut data).await.unwrap();

        let pages = client.params_of("DescribeListeners");
        assert_eq!(pages.len(), 2);
        assert!(!pages[0].contains_key("NextToken"));
        assert_eq!(pages[1].get_str("NextToken"), Some("page-2"));
        assert_eq!(pages[0].get_str("Filter.1.Name"), Some("load-balancer-id"));
        assert_eq!(pages[0].get_str("Filter.1.Value.1"), Some("lb-1"));

        assert_eq!(data.state.get("total_count"), Some(&Value::Int(101)));
        let listeners = data.state["listeners"].as_list().unwrap();
        let last = listeners[100].as_map().unwrap();
        assert_eq!(last.get("id"), Some(&Value::from("lsn-100")));
        assert_eq!(last.get("listener_port"), Some(&Value::Int(8100)));
        let health = last["health_check"].as_list().unwrap()[0].as_map().unwrap();
        assert_eq!(health.get("health_check_id"), Some(&Value::from("hc-100")));
    }

    #[tokio::test]
    async fn writes_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listeners.json");

        let client = ScriptedClient::new();
        client.respond("DescribeListeners", json!({"ListenerSet": [listener(1)]}));
        let ctx = context(client.clone());

        let mut data = ResourceData::new(HashMap::from([
            (
                "ids".to_string(),
                Value::List(vec![Value::from("lsn-1")]),
            ),
            (
                "output_file".to_string(),
                Value::from(path.to_str().unwrap()),
            ),
        ]));
        LbListeners.read(&ctx, &mut data).await.unwrap();

        assert_eq!(
            client.params_of("DescribeListeners")[0].get_str("ListenerId.1"),
            Some("lsn-1")
        );
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written[0]["id"], json!("lsn-1"));
        assert_eq!(written[0]["listener_protocol"], json!("TCP"));
    }
}
