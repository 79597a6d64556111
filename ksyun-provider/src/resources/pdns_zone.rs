//! ksyun_pdns_zone - Private DNS zone (pdns)
//!
//! VPC bindings are managed with separate bind/unbind calls after the zone
//! exists.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use ksyun_core::api::WireParams;
use ksyun_core::pipeline::{ApiCall, ApiPipeline};
use ksyun_core::provider::{ProviderContext, ProviderError, ProviderResult, ResourceType};
use ksyun_core::request::{RequestMapping, TransformRule};
use ksyun_core::resource::{ResourceData, Value};
use ksyun_core::response::{ResponseMapper, ResponseMapping};
use ksyun_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use crate::utils::{created_id, describe_one, ignore_not_found, require_id};

pub(crate) const SERVICE: &str = "pdns";

pub(crate) fn attributes() -> Vec<AttributeSchema> {
    vec![
        AttributeSchema::new("zone_name", AttributeType::String)
            .required()
            .force_new(),
        AttributeSchema::new("zone_ttl", types::positive_int())
            .optional()
            .computed(),
        AttributeSchema::new("project_id", AttributeType::String)
            .optional()
            .computed(),
        AttributeSchema::new(
            "bind_vpc",
            types::block_list(vec![
                AttributeSchema::new("region_name", AttributeType::String).required(),
                AttributeSchema::new("vpc_id", AttributeType::String).required(),
            ]),
        )
        .optional(),
        AttributeSchema::new("create_time", AttributeType::String).computed(),
    ]
}

pub(crate) fn response_mapper(attributes: &BTreeMap<String, AttributeSchema>) -> ResponseMapper<'_> {
    ResponseMapper::for_block(attributes)
        .mapping("BindVpcSet", ResponseMapping::field("bind_vpc"))
        .exclude("ZoneId")
}

async fn describe(ctx: &ProviderContext, id: &str) -> ProviderResult<Option<serde_json::Value>> {
    let params = WireParams::new().with("ZoneIds.1", id);
    describe_one(ctx, SERVICE, "DescribePdnsZones", &params, "ZoneSet").await
}

/// `BindVpc.N.RegionName` / `BindVpc.N.VpcId` for the given bindings
fn binding_params(schema: &ResourceSchema, bindings: Vec<Value>) -> ProviderResult<WireParams> {
    let data = ResourceData::new(HashMap::from([(
        "bind_vpc".to_string(),
        Value::List(bindings),
    )]));
    RequestMapping::new(schema)
        .only_transform(true)
        .transform("bind_vpc", TransformRule::list_n())
        .build(&data)
}

fn bindings(value: Option<&Value>) -> Vec<Value> {
    value
        .and_then(Value::as_list)
        .map(<[Value]>::to_vec)
        .unwrap_or_default()
}

/// Bind (or unbind) `bindings` once the zone id is known
fn binding_call(action: &'static str, params: WireParams) -> ApiCall {
    ApiCall::new(SERVICE, action, params)
        .before(|data, params| {
            let id = data
                .id()
                .ok_or_else(|| ProviderError::new("Zone id is not known yet"))?;
            params.insert("ZoneId", id);
            Ok(())
        })
        .disable_dry_run()
}

pub struct PdnsZone;

#[async_trait]
impl ResourceType for PdnsZone {
    fn name(&self) -> &'static str {
        "ksyun_pdns_zone"
    }

    fn schema(&self) -> ResourceSchema {
        attributes()
            .into_iter()
            .fold(ResourceSchema::new("ksyun_pdns_zone"), ResourceSchema::attribute)
            .with_description("Provides a private DNS zone.")
    }

    async fn create(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        let schema = self.schema();
        let params = RequestMapping::new(&schema)
            .transform("bind_vpc", TransformRule::ignored())
            .build(data)?;

        let mut calls = vec![
            ApiCall::new(SERVICE, "CreatePdnsZone", params).after(|data, _, response| {
                data.set_id(created_id(response, "ZoneId")?);
                Ok(())
            }),
        ];
        let wanted = bindings(data.get("bind_vpc"));
        if !wanted.is_empty() {
            calls.push(binding_call("BindZoneVpc", binding_params(&schema, wanted)?));
        }

        ApiPipeline::new(calls).run(ctx, data).await?;
        log::info!("created private DNS zone {}", data.id().unwrap_or_default());
        self.read(ctx, data).await
    }

    async fn read(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        let Some(id) = data.id().map(str::to_string) else {
            return Ok(());
        };
        match describe(ctx, &id).await? {
            Some(zone) => {
                let schema = self.schema();
                response_mapper(&schema.attributes).apply(data, &zone)
            }
            None => {
                log::info!("private DNS zone {} no longer exists", id);
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
            .transform("zone_ttl", TransformRule::default())
            .build(data)?;
        if !params.is_empty() {
            calls.push(ApiCall::new(
                SERVICE,
                "ModifyPdnsZone",
                params.with("ZoneId", id.as_str()),
            ));
        }

        if schema.has_change(data, "bind_vpc") {
            let current = bindings(data.state.get("bind_vpc"));
            let wanted = bindings(data.config.get("bind_vpc"));
            let removed: Vec<Value> = current
                .iter()
                .filter(|b| !wanted.contains(b))
                .cloned()
                .collect();
            let added: Vec<Value> = wanted
                .iter()
                .filter(|b| !current.contains(b))
                .cloned()
                .collect();
            if !removed.is_empty() {
                calls.push(binding_call("UnbindZoneVpc", binding_params(&schema, removed)?));
            }
            if !added.is_empty() {
                calls.push(binding_call("BindZoneVpc", binding_params(&schema, added)?));
            }
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
                "DeletePdnsZone",
                WireParams::new().with("ZoneId", id.as_str()),
            )
            .on_error(ignore_not_found),
        ])
        .run(ctx, data)
        .await?;

        log::info!("deleted private DNS zone {}", id);
        data.clear_id();
        Ok(())
    }
}
