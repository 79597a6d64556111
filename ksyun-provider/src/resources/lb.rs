//! ksyun_lb - Server load balancer (slb)

use std::collections::BTreeMap;

use async_trait::async_trait;
use ksyun_core::api::WireParams;
use ksyun_core::pipeline::{ApiCall, ApiPipeline};
use ksyun_core::provider::{ProviderContext, ProviderResult, ResourceType};
use ksyun_core::request::{RequestMapping, TransformRule};
use ksyun_core::resource::ResourceData;
use ksyun_core::response::{ResponseMapper, ResponseMapping};
use ksyun_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use ksyun_core::waiter::StateChangeConf;

use super::tag::replace_tags_call;
use crate::utils::{
    created_id, describe_one, ignore_not_found, require_id, str_field, tag_set_to_map,
};

pub(crate) const SERVICE: &str = "slb";
const TAG_RESOURCE_TYPE: &str = "loadbalancer";

const PENDING: &[&str] = &["creating", "pending"];
const READY: &[&str] = &["active", "associate", "disassociate"];

/// Attributes of one load balancer, shared with the `ksyun_lbs` data source
pub(crate) fn attributes() -> Vec<AttributeSchema> {
    vec![
        AttributeSchema::new("vpc_id", AttributeType::String)
            .required()
            .force_new(),
        AttributeSchema::new("load_balancer_name", AttributeType::String)
            .optional()
            .computed(),
        AttributeSchema::new("type", types::string_enum(&["public", "internal"]))
            .optional()
            .force_new()
            .with_default("public".into()),
        AttributeSchema::new("subnet_id", AttributeType::String)
            .optional()
            .force_new()
            .with_description("Required when type is internal."),
        AttributeSchema::new("private_ip_address", AttributeType::String)
            .optional()
            .computed()
            .force_new(),
        AttributeSchema::new("ip_version", types::string_enum(&["ipv4", "ipv6"]))
            .optional()
            .computed()
            .force_new(),
        AttributeSchema::new("load_balancer_state", types::string_enum(&["start", "stop"]))
            .optional()
            .computed(),
        AttributeSchema::new("project_id", AttributeType::String)
            .optional()
            .computed(),
        AttributeSchema::new("tags", types::tags()).optional(),
        AttributeSchema::new("state", AttributeType::String).computed(),
        AttributeSchema::new("public_ip", AttributeType::String).computed(),
        AttributeSchema::new("create_time", AttributeType::String).computed(),
    ]
}

/// Maps a `LoadBalancerDescriptions` item
pub(crate) fn response_mapper(attributes: &BTreeMap<String, AttributeSchema>) -> ResponseMapper<'_> {
    ResponseMapper::for_block(attributes)
        .mapping("TagSet", ResponseMapping::field("tags").value_fn(tag_set_to_map))
        .exclude("LoadBalancerId")
}

async fn describe(ctx: &ProviderContext, id: &str) -> ProviderResult<Option<serde_json::Value>> {
    let params = WireParams::new().with("LoadBalancerId.1", id);
    describe_one(
        ctx,
        SERVICE,
        "DescribeLoadBalancers",
        &params,
        "LoadBalancerDescriptions",
    )
    .await
}

// Some regions omit State; treat that as ready.
fn status(lb: &serde_json::Value) -> String {
    str_field(lb, "State").unwrap_or_else(|| "active".to_string())
}

pub struct LoadBalancer;

#[async_trait]
impl ResourceType for LoadBalancer {
    fn name(&self) -> &'static str {
        "ksyun_lb"
    }

    fn schema(&self) -> ResourceSchema {
        attributes()
            .into_iter()
            .fold(ResourceSchema::new("ksyun_lb"), ResourceSchema::attribute)
            .with_description("Provides a load balancer.")
    }

    async fn create(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        let schema = self.schema();
        let params = RequestMapping::new(&schema)
            .transform("tags", TransformRule::default().mapped("Tag"))
            .build(data)?;

        ApiPipeline::new(vec![
            ApiCall::new(SERVICE, "CreateLoadBalancer", params).after(|data, _, response| {
                data.set_id(created_id(response, "LoadBalancerId")?);
                Ok(())
            }),
        ])
        .run(ctx, data)
        .await?;

        let id = require_id(data, "wait for")?;
        log::info!("created load balancer {}", id);
        let id = id.as_str();
        StateChangeConf::new(PENDING, READY)
            .with_timeout(ctx.wait_timeout)
            .wait(|| async move {
                Ok(describe(ctx, id).await?.map(|lb| {
                    let status = status(&lb);
                    (lb, status)
                }))
            })
            .await?;

        self.read(ctx, data).await
    }

    async fn read(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        let Some(id) = data.id().map(str::to_string) else {
            return Ok(());
        };
        match describe(ctx, &id).await? {
            Some(lb) => {
                let schema = self.schema();
                response_mapper(&schema.attributes).apply(data, &lb)
            }
            None => {
                log::info!("load balancer {} no longer exists", id);
                data.clear_id();
                Ok(())
            }
        }
    }

    async fn update(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        let id = require_id(data, "update")?;
        let schema = self.schema();

        let mut calls = Vec::new();
        let params = RequestMapping::new(&schema)
            .update(true)
            .only_transform(true)
            .transform("load_balancer_name", TransformRule::default())
            .transform("load_balancer_state", TransformRule::default())
            .build(data)?;
        if !params.is_empty() {
            calls.push(ApiCall::new(
                SERVICE,
                "ModifyLoadBalancer",
                params.with("LoadBalancerId", id.as_str()),
            ));
        }
        if schema.has_change(data, "tags") {
            calls.push(replace_tags_call(TAG_RESOURCE_TYPE, &id, data.get("tags")));
        }

        ApiPipeline::new(calls).run(ctx, data).await?;
        self.read(ctx, data).await
    }

    async fn delete(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        let Some(id) = data.id().map(str::to_string) else {
            return Ok(());
        };

        ApiPipeline::new(vec![
            ApiCall::new(
                SERVICE,
                "DeleteLoadBalancer",
                WireParams::new().with("LoadBalancerId", id.as_str()),
            )
            .on_error(ignore_not_found),
        ])
        .run(ctx, data)
        .await?;

        let id = id.as_str();
        let mut pending = READY.to_vec();
        pending.push("deleting");
        StateChangeConf::new(&pending, &[])
            .with_timeout(ctx.wait_timeout)
            .wait(|| async move {
                Ok(describe(ctx, id).await?.map(|lb| {
                    let status = status(&lb);
                    (lb, status)
                }))
            })
            .await?;

        log::info!("deleted load balancer {}", id);
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

    fn described(state: &str) -> serde_json::Value {
        json!({"LoadBalancerDescriptions": [{
            "LoadBalancerId": "lb-1",
            "LoadBalancerName": "web",
            "VpcId": "vpc-1",
            "Type": "public",
            "State": state,
            "LoadBalancerState": "start",
            "PublicIp": "1.2.3.4",
            "TagSet": [{"TagKey": "env", "TagValue": "prod"}],
        }]})
    }

    fn config() -> HashMap<String, Value> {
        HashMap::from([
            ("vpc_id".to_string(), Value::from("vpc-1")),
            ("load_balancer_name".to_string(), Value::from("web")),
            ("type".to_string(), Value::from("public")),
            (
                "tags".to_string(),
                Value::Map(HashMap::from([("env".to_string(), Value::from("prod"))])),
            ),
        ])
    }

    #[tokio::test(start_paused = true)]
    async fn create_waits_until_active_and_reads_back() {
        let client = ScriptedClient::new();
        client
            .respond("CreateLoadBalancer", json!({"LoadBalancerId": "lb-1"}))
            .respond("DescribeLoadBalancers", described("creating"))
            .respond("DescribeLoadBalancers", described("associate"))
            .respond("DescribeLoadBalancers", described("associate"));
        let ctx = context(client.clone());

        let mut data = ResourceData::new(config());
        LoadBalancer.create(&ctx, &mut data).await.unwrap();

        assert_eq!(data.id(), Some("lb-1"));
        assert_eq!(data.state.get("public_ip"), Some(&Value::from("1.2.3.4")));
        assert_eq!(data.state.get("state"), Some(&Value::from("associate")));

        let create = &client.params_of("CreateLoadBalancer")[0];
        assert_eq!(create.get_str("VpcId"), Some("vpc-1"));
        assert_eq!(create.get_str("LoadBalancerName"), Some("web"));
        assert_eq!(create.get_str("Tag.1.Key"), Some("env"));
        assert_eq!(create.get_str("Tag.1.Value"), Some("prod"));
        assert!(!create.contains_key("State"));
    }

    #[tokio::test]
    async fn dry_run_validates_before_creating() {
        let client = ScriptedClient::new();
        client.fail("CreateLoadBalancer", "InvalidParameter");
        let ctx = context(client.clone()).with_dry_run(true);

        let mut data = ResourceData::new(config());
        let err = LoadBalancer.create(&ctx, &mut data).await.unwrap_err();

        assert!(err.to_string().contains("Dry run of CreateLoadBalancer"));
        assert_eq!(client.actions(), vec!["CreateLoadBalancer"]);
        assert_eq!(
            client.params_of("CreateLoadBalancer")[0].get("DryRun"),
            Some(&json!(true))
        );
        assert!(data.id().is_none());
    }

    #[tokio::test]
    async fn read_of_missing_load_balancer_clears_id() {
        let client = ScriptedClient::new();
        client.fail("DescribeLoadBalancers", "LoadBalancerNotFound");
        let ctx = context(client.clone());

        let mut data = ResourceData::existing("lb-1", config(), HashMap::new());
        LoadBalancer.read(&ctx, &mut data).await.unwrap();
        assert!(data.id().is_none());
    }

    #[tokio::test]
    async fn update_sends_only_changed_fields() {
        let client = ScriptedClient::new();
        client.respond("DescribeLoadBalancers", described("associate"));
        let ctx = context(client.clone());

        let mut state = config();
        state.insert("load_balancer_name".to_string(), Value::from("old"));
        let mut data = ResourceData::existing("lb-1", config(), state);
        LoadBalancer.update(&ctx, &mut data).await.unwrap();

        assert_eq!(
            client.actions(),
            vec!["ModifyLoadBalancer", "DescribeLoadBalancers"]
        );
        let modify = &client.params_of("ModifyLoadBalancer")[0];
        assert_eq!(modify.get_str("LoadBalancerId"), Some("lb-1"));
        assert_eq!(modify.get_str("LoadBalancerName"), Some("web"));
        assert_eq!(modify.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_tolerates_missing_and_waits_for_removal() {
        let client = ScriptedClient::new();
        client
            .fail("DeleteLoadBalancer", "LoadBalancerNotFound")
            .respond("DescribeLoadBalancers", json!({"LoadBalancerDescriptions": []}));
        let ctx = context(client.clone());

        let mut data = ResourceData::existing("lb-1", config(), HashMap::new());
        LoadBalancer.delete(&ctx, &mut data).await.unwrap();
        assert!(data.id().is_none());
    }
}
