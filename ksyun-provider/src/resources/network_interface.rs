//! ksyun_network_interface - Elastic network interface (vpc)

use std::collections::BTreeMap;

use async_trait::async_trait;
use ksyun_core::api::WireParams;
use ksyun_core::pipeline::{ApiCall, ApiPipeline};
use ksyun_core::provider::{ProviderContext, ProviderResult, ResourceType};
use ksyun_core::request::{RequestMapping, TransformRule};
use ksyun_core::resource::ResourceData;
use ksyun_core::response::{ResponseMapper, ResponseMapping};
use ksyun_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use crate::utils::{created_id, describe_one, ignore_not_found, require_id, str_field};

pub(crate) const SERVICE: &str = "vpc";

pub(crate) fn attributes() -> Vec<AttributeSchema> {
    vec![
        AttributeSchema::new("subnet_id", AttributeType::String)
            .required()
            .force_new(),
        AttributeSchema::new("security_group_ids", types::string_set())
            .required()
            .with_provider_name("SecurityGroupId"),
        AttributeSchema::new("private_ip_address", AttributeType::String)
            .optional()
            .computed()
            .force_new(),
        AttributeSchema::new("network_interface_name", AttributeType::String)
            .optional()
            .computed(),
        AttributeSchema::new("vpc_id", AttributeType::String).computed(),
        AttributeSchema::new("mac_address", AttributeType::String).computed(),
        AttributeSchema::new("network_interface_type", AttributeType::String).computed(),
        AttributeSchema::new("instance_id", AttributeType::String).computed(),
    ]
}

/// `[{"SecurityGroupId": "sg-1", ...}]` to `["sg-1"]`
fn security_group_ids(raw: &serde_json::Value) -> serde_json::Value {
    let ids: Vec<serde_json::Value> = raw
        .as_array()
        .map(|groups| {
            groups
                .iter()
                .filter_map(|g| str_field(g, "SecurityGroupId"))
                .map(serde_json::Value::String)
                .collect()
        })
        .unwrap_or_default();
    serde_json::Value::Array(ids)
}

pub(crate) fn response_mapper(attributes: &BTreeMap<String, AttributeSchema>) -> ResponseMapper<'_> {
    ResponseMapper::for_block(attributes)
        .mapping(
            "SecurityGroupSet",
            ResponseMapping::field("security_group_ids").value_fn(security_group_ids),
        )
        .exclude("NetworkInterfaceId")
}

async fn describe(ctx: &ProviderContext, id: &str) -> ProviderResult<Option<serde_json::Value>> {
    let params = WireParams::new().with("NetworkInterfaceId.1", id);
    describe_one(
        ctx,
        SERVICE,
        "DescribeNetworkInterfaces",
        &params,
        "NetworkInterfaceSet",
    )
    .await
}

pub struct NetworkInterface;

#[async_trait]
impl ResourceType for NetworkInterface {
    fn name(&self) -> &'static str {
        "ksyun_network_interface"
    }

    fn schema(&self) -> ResourceSchema {
        attributes()
            .into_iter()
            .fold(
                ResourceSchema::new("ksyun_network_interface"),
                ResourceSchema::attribute,
            )
            .with_description("Provides an elastic network interface.")
    }

    async fn create(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        let schema = self.schema();
        let params = RequestMapping::new(&schema)
            .transform("security_group_ids", TransformRule::with_n())
            .build(data)?;

        ApiPipeline::new(vec![
            ApiCall::new(SERVICE, "CreateNetworkInterface", params).after(|data, _, response| {
                data.set_id(created_id(response, "NetworkInterfaceId")?);
                Ok(())
            }),
        ])
        .run(ctx, data)
        .await?;

        log::info!("created network interface {}", data.id().unwrap_or_default());
        self.read(ctx, data).await
    }

    async fn read(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        let Some(id) = data.id().map(str::to_string) else {
            return Ok(());
        };
        match describe(ctx, &id).await? {
            Some(eni) => {
                let schema = self.schema();
                response_mapper(&schema.attributes).apply(data, &eni)
            }
            None => {
                log::info!("network interface {} no longer exists", id);
                data.clear_id();
                Ok(())
            }
        }
    }

    async fn update(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        let id = require_id(data, "update")?;
        let schema = self.schema();

        let params = RequestMapping::new(&schema)
            .update(true)
            .only_transform(true)
            .transform("network_interface_name", TransformRule::default())
            .transform("security_group_ids", TransformRule::with_n())
            .build(data)?;
        if params.is_empty() {
            return Ok(());
        }

        ApiPipeline::new(vec![ApiCall::new(
            SERVICE,
            "ModifyNetworkInterfaceAttribute",
            params.with("NetworkInterfaceId", id.as_str()),
        )])
        .run(ctx, data)
        .await?;
        self.read(ctx, data).await
    }

    async fn delete(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        let Some(id) = data.id().map(str::to_string) else {
            return Ok(());
        };
        ApiPipeline::new(vec![
            ApiCall::new(
                SERVICE,
                "DeleteNetworkInterface",
                WireParams::new().with("NetworkInterfaceId", id.as_str()),
            )
            .on_error(ignore_not_found),
        ])
        .run(ctx, data)
        .await?;

        log::info!("deleted network interface {}", id);
        data.clear_id();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedClient, context};
    use ksyun_core::resource::Value;
    use serde_json::json;
    use std::collections::HashMap;

    fn described(groups: &[&str]) -> serde_json::Value {
        json!({"NetworkInterfaceSet": [{
            "NetworkInterfaceId": "eni-1",
            "SubnetId": "subnet-1",
            "VpcId": "vpc-1",
            "PrivateIpAddress": "10.0.0.5",
            "MacAddress": "fa:16:3e:00:00:01",
            "SecurityGroupSet": groups
                .iter()
                .map(|g| json!({"SecurityGroupId": g, "SecurityGroupName": "default"}))
                .collect::<Vec<_>>(),
        }]})
    }

    fn groups(ids: &[&str]) -> Value {
        Value::List(ids.iter().map(|id| Value::from(*id)).collect())
    }

    fn config() -> HashMap<String, Value> {
        HashMap::from([
            ("subnet_id".to_string(), Value::from("subnet-1")),
            ("security_group_ids".to_string(), groups(&["sg-1", "sg-2"])),
        ])
    }

    #[tokio::test]
    async fn create_encodes_security_groups_with_index() {
        let client = ScriptedClient::new();
        client
            .respond("CreateNetworkInterface", json!({"NetworkInterfaceId": "eni-1"}))
            .respond("DescribeNetworkInterfaces", described(&["sg-1", "sg-2"]));
        let ctx = context(client.clone());

        let mut data = ResourceData::new(config());
        NetworkInterface.create(&ctx, &mut data).await.unwrap();

        let create = &client.params_of("CreateNetworkInterface")[0];
        assert_eq!(create.get_str("SubnetId"), Some("subnet-1"));
        assert_eq!(create.get_str("SecurityGroupId.1"), Some("sg-1"));
        assert_eq!(create.get_str("SecurityGroupId.2"), Some("sg-2"));

        assert_eq!(data.state.get("security_group_ids"), Some(&groups(&["sg-1", "sg-2"])));
        assert_eq!(data.state.get("vpc_id"), Some(&Value::from("vpc-1")));
        assert_eq!(
            data.state.get("private_ip_address"),
            Some(&Value::from("10.0.0.5"))
        );
    }

    #[tokio::test]
    async fn security_group_change_modifies_attribute() {
        let client = ScriptedClient::new();
        client.respond("DescribeNetworkInterfaces", described(&["sg-3"]));
        let ctx = context(client.clone());

        let mut config = config();
        config.insert("security_group_ids".to_string(), groups(&["sg-3"]));
        let mut data = ResourceData::existing(
            "eni-1",
            config,
            HashMap::from([("security_group_ids".to_string(), groups(&["sg-1", "sg-2"]))]),
        );
        NetworkInterface.update(&ctx, &mut data).await.unwrap();

        let modify = &client.params_of("ModifyNetworkInterfaceAttribute")[0];
        assert_eq!(modify.get_str("NetworkInterfaceId"), Some("eni-1"));
        assert_eq!(modify.get_str("SecurityGroupId.1"), Some("sg-3"));
        assert!(!modify.contains_key("SecurityGroupId.2"));
        assert_eq!(data.state.get("security_group_ids"), Some(&groups(&["sg-3"])));
    }

    #[tokio::test]
    async fn unchanged_interface_makes_no_calls() {
        let client = ScriptedClient::new();
        let ctx = context(client.clone());
        let mut data = ResourceData::existing("eni-1", config(), config());
        NetworkInterface.update(&ctx, &mut data).await.unwrap();
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn delete_of_missing_interface_succeeds() {
        let client = ScriptedClient::new();
        client.fail("DeleteNetworkInterface", "NetworkInterfaceNotFound");
        let ctx = context(client.clone());
        let mut data = ResourceData::existing("eni-1", config(), HashMap::new());
        NetworkInterface.delete(&ctx, &mut data).await.unwrap();
        assert!(data.id().is_none());
    }
}
