//! ksyun_network_interfaces - Query elastic network interfaces

use async_trait::async_trait;
use ksyun_core::pagination::page_query_with_next_token;
use ksyun_core::provider::{DataSourceType, ProviderContext, ProviderResult};
use ksyun_core::request::{RequestMapping, TransformRule};
use ksyun_core::resource::ResourceData;
use ksyun_core::response::merge_data_source;
use ksyun_core::schema::{AttributeSchema, ResourceSchema, types};

use super::{PAGE_SIZE, result_list};
use crate::resources::network_interface::{self, SERVICE};
use crate::utils::{call, items, str_field};

pub struct NetworkInterfaces;

#[async_trait]
impl DataSourceType for NetworkInterfaces {
    fn name(&self) -> &'static str {
        "ksyun_network_interfaces"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("ksyun_network_interfaces")
            .with_description("Lists network interfaces matching the given filters.")
            .with_data_source_fields()
            .attribute(AttributeSchema::new("vpc_id", types::string_set()).optional())
            .attribute(AttributeSchema::new("subnet_id", types::string_set()).optional())
            .attribute(AttributeSchema::new("securitygroup_id", types::string_set()).optional())
            .attribute(AttributeSchema::new("instance_id", types::string_set()).optional())
            .attribute(
                AttributeSchema::new(
                    "network_interfaces",
                    result_list(network_interface::attributes()),
                )
                .computed(),
            )
    }

    async fn read(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        let schema = self.schema();
        let condition = RequestMapping::new(&schema)
            .only_transform(true)
            .transform("ids", TransformRule::with_n().mapped("NetworkInterfaceId"))
            .transform("vpc_id", TransformRule::filter().mapped("vpc-id"))
            .transform("subnet_id", TransformRule::filter().mapped("subnet-id"))
            .transform(
                "securitygroup_id",
                TransformRule::filter().mapped("securitygroup-id"),
            )
            .transform("instance_id", TransformRule::filter().mapped("instance-id"))
            .build(data)?;

        let found = page_query_with_next_token(
            &condition,
            "MaxResults",
            "NextToken",
            PAGE_SIZE,
            |params| async move {
                let response = call(ctx, SERVICE, "DescribeNetworkInterfaces", &params).await?;
                Ok((
                    items(&response, "NetworkInterfaceSet"),
                    str_field(&response, "NextToken"),
                ))
            },
        )
        .await?;

        let Some(block) = schema
            .get("network_interfaces")
            .and_then(|a| a.attr_type.block())
        else {
            return Ok(());
        };
        let (ids, mapped) =
            network_interface::response_mapper(block).map_items(&found, "NetworkInterfaceId")?;
        log::info!("found {} network interface(s)", ids.len());
        merge_data_source(data, "network_interfaces", ids, mapped).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedClient, context};
    use ksyun_core::resource::Value;
    use serde_json::json;
    use std::collections::HashMap;

    #[tokio::test]
    async fn filters_are_numbered_in_order() {
        let client = ScriptedClient::new();
        client.respond(
            "DescribeNetworkInterfaces",
            json!({"NetworkInterfaceSet": [{
                "NetworkInterfaceId": "eni-1",
                "SubnetId": "subnet-1",
                "VpcId": "vpc-1",
                "SecurityGroupSet": [{"SecurityGroupId": "sg-1"}],
            }]}),
        );
        let ctx = context(client.clone());

        let mut data = ResourceData::new(HashMap::from([
            (
                "subnet_id".to_string(),
                Value::List(vec![Value::from("subnet-1")]),
            ),
            (
                "vpc_id".to_string(),
                Value::List(vec![Value::from("vpc-1"), Value::from("vpc-2")]),
            ),
        ]));
        NetworkInterfaces.read(&ctx, &mut data).await.unwrap();

        let params = &client.params_of("DescribeNetworkInterfaces")[0];
        assert_eq!(params.get_str("Filter.1.Name"), Some("subnet-id"));
        assert_eq!(params.get_str("Filter.2.Name"), Some("vpc-id"));
        assert_eq!(params.get_str("Filter.2.Value.2"), Some("vpc-2"));
        assert!(!params.contains_key("NextToken"));

        let enis = data.state["network_interfaces"].as_list().unwrap();
        let eni = enis[0].as_map().unwrap();
        assert_eq!(eni.get("id"), Some(&Value::from("eni-1")));
        assert_eq!(
            eni.get("security_group_ids"),
            Some(&Value::List(vec![Value::from("sg-1")]))
        );
        assert_eq!(
            data.state.get("ids"),
            Some(&Value::List(vec![Value::from("eni-1")]))
        );
    }

    #[tokio::test]
    async fn api_errors_propagate() {
        let client = ScriptedClient::new();
        client.fail("DescribeNetworkInterfaces", "InvalidParameter");
        let ctx = context(client.clone());
        let mut data = ResourceData::new(HashMap::new());
        let err = NetworkInterfaces.read(&ctx, &mut data).await.unwrap_err();
        assert!(err.to_string().contains("InvalidParameter"));
        assert!(data.id().is_none());
    }
}
