//! ksyun_lb_listener - Listener of a load balancer
//!
//! `health_check` and `session` are single blocks whose fields travel as
//! top-level parameters.

use std::collections::BTreeMap;

use async_trait::async_trait;
use ksyun_core::api::WireParams;
use ksyun_core::pipeline::{ApiCall, ApiPipeline};
use ksyun_core::provider::{ProviderContext, ProviderError, ProviderResult, ResourceType};
use ksyun_core::request::{RequestMapping, TransformRule};
use ksyun_core::resource::ResourceData;
use ksyun_core::response::ResponseMapper;
use ksyun_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::lb::SERVICE;
use crate::utils::{created_id, describe_one, ignore_not_found, require_id};

fn health_check() -> AttributeType {
    types::block_list(vec![
        AttributeSchema::new("health_check_id", AttributeType::String).computed(),
        AttributeSchema::new("health_check_state", types::string_enum(&["start", "stop"]))
            .optional()
            .computed(),
        AttributeSchema::new("healthy_threshold", AttributeType::Int)
            .optional()
            .computed(),
        AttributeSchema::new("unhealthy_threshold", AttributeType::Int)
            .optional()
            .computed(),
        AttributeSchema::new("interval", AttributeType::Int)
            .optional()
            .computed(),
        AttributeSchema::new("timeout", AttributeType::Int)
            .optional()
            .computed(),
        AttributeSchema::new("url_path", AttributeType::String)
            .optional()
            .computed(),
        AttributeSchema::new("host_name", AttributeType::String)
            .optional()
            .computed(),
    ])
}

fn session() -> AttributeType {
    types::block_list(vec![
        AttributeSchema::new("session_state", types::string_enum(&["start", "stop"]))
            .optional()
            .computed(),
        AttributeSchema::new("session_persistence_period", AttributeType::Int)
            .optional()
            .computed(),
        AttributeSchema::new(
            "cookie_type",
            types::string_enum(&["ImplantCookie", "RewriteCookie"]),
        )
        .optional()
        .computed(),
        AttributeSchema::new("cookie_name", AttributeType::String)
            .optional()
            .computed(),
    ])
}

/// Attributes of one listener, shared with the `ksyun_lb_listeners` data source
pub(crate) fn attributes() -> Vec<AttributeSchema> {
    vec![
        AttributeSchema::new("load_balancer_id", AttributeType::String)
            .required()
            .force_new(),
        AttributeSchema::new("listener_name", AttributeType::String)
            .optional()
            .computed(),
        AttributeSchema::new("listener_state", types::string_enum(&["start", "stop"]))
            .optional()
            .computed(),
        AttributeSchema::new(
            "listener_protocol",
            types::string_enum(&["TCP", "UDP", "HTTP", "HTTPS"]),
        )
        .required()
        .force_new(),
        AttributeSchema::new("listener_port", types::port())
            .required()
            .force_new(),
        AttributeSchema::new(
            "method",
            types::string_enum(&["RoundRobin", "LeastConnections", "MasterSlave", "QUIC_CID"]),
        )
        .optional()
        .computed(),
        AttributeSchema::new("certificate_id", AttributeType::String).optional(),
        AttributeSchema::new("health_check", health_check())
            .optional()
            .computed()
            .max_items(1),
        AttributeSchema::new("session", session())
            .optional()
            .computed()
            .max_items(1),
        AttributeSchema::new("create_time", AttributeType::String).computed(),
    ]
}

pub(crate) fn response_mapper(attributes: &BTreeMap<String, AttributeSchema>) -> ResponseMapper<'_> {
    ResponseMapper::for_block(attributes).exclude("ListenerId")
}

async fn describe(ctx: &ProviderContext, id: &str) -> ProviderResult<Option<serde_json::Value>> {
    let params = WireParams::new().with("ListenerId.1", id);
    describe_one(ctx, SERVICE, "DescribeListeners", &params, "ListenerSet").await
}

/// Health check id recorded by the last read
fn health_check_id(data: &ResourceData) -> Option<String> {
    data.state
        .get("health_check")?
        .as_list()?
        .first()?
        .as_map()?
        .get("health_check_id")?
        .as_str()
        .map(str::to_string)
}

pub struct LbListener;

#[async_trait]
impl ResourceType for LbListener {
    fn name(&self) -> &'static str {
        "ksyun_lb_listener"
    }

    fn schema(&self) -> ResourceSchema {
        attributes()
            .into_iter()
            .fold(ResourceSchema::new("ksyun_lb_listener"), ResourceSchema::attribute)
            .with_description("Provides a listener of a load balancer.")
    }

    async fn create(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        let schema = self.schema();
        let params = RequestMapping::new(&schema)
            .transform("health_check", TransformRule::list_unique())
            .transform("session", TransformRule::list_unique())
            .build(data)?;

        ApiPipeline::new(vec![
            ApiCall::new(SERVICE, "CreateListeners", params).after(|data, _, response| {
                data.set_id(created_id(response, "ListenerId")?);
                Ok(())
            }),
        ])
        .run(ctx, data)
        .await?;

        log::info!("created listener {}", data.id().unwrap_or_default());
        self.read(ctx, data).await
    }

    async fn read(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        let Some(id) = data.id().map(str::to_string) else {
            return Ok(());
        };
        match describe(ctx, &id).await? {
            Some(listener) => {
                let schema = self.schema();
                response_mapper(&schema.attributes).apply(data, &listener)
            }
            None => {
                log::info!("listener {} no longer exists", id);
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
            .transform("listener_name", TransformRule::default())
            .transform("listener_state", TransformRule::default())
            .transform("method", TransformRule::default())
            .transform("certificate_id", TransformRule::default())
            .transform("session", TransformRule::list_unique())
            .build(data)?;
        if !params.is_empty() {
            calls.push(ApiCall::new(
                SERVICE,
                "ModifyListeners",
                params.with("ListenerId", id.as_str()),
            ));
        }

        let health = RequestMapping::new(&schema)
            .update(true)
            .only_transform(true)
            .transform("health_check", TransformRule::list_unique())
            .build(data)?;
        if !health.is_empty() {
            calls.push(
                ApiCall::new(SERVICE, "ModifyHealthCheck", health).before(|data, params| {
                    let hc_id = health_check_id(data).ok_or_else(|| {
                        ProviderError::new("Listener has no health check to modify")
                    })?;
                    params.insert("HealthCheckId", hc_id);
                    Ok(())
                }),
            );
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
                "DeleteListeners",
                WireParams::new().with("ListenerId", id.as_str()),
            )
            .on_error(ignore_not_found),
        ])
        .run(ctx, data)
        .await?;

        log::info!("deleted listener {}", id);
        data.clear_id();
        Ok(())
    }
}
