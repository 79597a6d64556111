//! ksyun_nat_associate - Association of a subnet with a NAT (vpc)
//!
//! The id is `nat_id:subnet_id`.

use std::collections::HashMap;

use async_trait::async_trait;
use ksyun_core::api::WireParams;
use ksyun_core::pipeline::{ApiCall, ApiPipeline};
use ksyun_core::provider::{ProviderContext, ProviderError, ProviderResult, ResourceType};
use ksyun_core::request::{RequestMapping, TransformRule};
use ksyun_core::resource::{ResourceData, Value};
use ksyun_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

use super::network_interface::SERVICE;
use crate::utils::{describe_one, ignore_not_found, join_id, require_id, split_id};

pub struct NatAssociate;

impl NatAssociate {
    /// `DescribeNats` condition matching this association
    fn lookup_params(
        schema: &ResourceSchema,
        nat_id: &str,
        subnet_id: &str,
    ) -> ProviderResult<WireParams> {
        let lookup = ResourceData::new(HashMap::from([
            ("nat_id".to_string(), Value::from(nat_id)),
            ("subnet_id".to_string(), Value::from(subnet_id)),
        ]));
        RequestMapping::new(schema)
            .transform("nat_id", TransformRule::single_n())
            .transform("subnet_id", TransformRule::filter().mapped("associate-subnet-id"))
            .build(&lookup)
    }

    /// Params naming both ends of the association
    fn association_params(schema: &ResourceSchema, data: &ResourceData) -> ProviderResult<WireParams> {
        RequestMapping::new(schema).build(data)
    }
}

#[async_trait]
impl ResourceType for NatAssociate {
    fn name(&self) -> &'static str {
        "ksyun_nat_associate"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("ksyun_nat_associate")
            .with_description("Associates a subnet with a NAT.")
            .attribute(
                AttributeSchema::new("nat_id", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("subnet_id", AttributeType::String)
                    .required()
                    .force_new(),
            )
    }

    async fn create(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        let schema = self.schema();
        let params = Self::association_params(&schema, data)?;

        ApiPipeline::new(vec![
            ApiCall::new(SERVICE, "AssociateNat", params).after(|data, call, _| {
                let nat_id = call.params.get_str("NatId").unwrap_or_default();
                let subnet_id = call.params.get_str("SubnetId").unwrap_or_default();
                data.set_id(join_id(&[nat_id, subnet_id]));
                Ok(())
            }),
        ])
        .run(ctx, data)
        .await?;

        log::info!("associated {}", data.id().unwrap_or_default());
        self.read(ctx, data).await
    }

    async fn read(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        let Some(id) = data.id().map(str::to_string) else {
            return Ok(());
        };
        let parts = split_id(&id, 2)?;
        let (nat_id, subnet_id) = (&parts[0], &parts[1]);

        let params = Self::lookup_params(&self.schema(), nat_id, subnet_id)?;
        if describe_one(ctx, SERVICE, "DescribeNats", &params, "NatSet")
            .await?
            .is_none()
        {
            log::info!("NAT association {} no longer exists", id);
            data.clear_id();
            return Ok(());
        }

        data.set("nat_id", Value::from(nat_id.as_str()));
        data.set("subnet_id", Value::from(subnet_id.as_str()));
        Ok(())
    }

    async fn update(&self, _ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        let id = require_id(data, "update")?;
        let changed = self.schema().changed_keys(data);
        if changed.is_empty() {
            return Ok(());
        }
        Err(ProviderError::new(format!(
            "NAT association {} cannot be updated in place (changed: {})",
            id,
            changed.join(", ")
        )))
    }

    async fn delete(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        let Some(id) = data.id().map(str::to_string) else {
            return Ok(());
        };
        let parts = split_id(&id, 2)?;
        let target = ResourceData::new(HashMap::from([
            ("nat_id".to_string(), Value::from(parts[0].as_str())),
            ("subnet_id".to_string(), Value::from(parts[1].as_str())),
        ]));
        let params = Self::association_params(&self.schema(), &target)?;

        ApiPipeline::new(vec![
            ApiCall::new(SERVICE, "DisassociateNat", params).on_error(ignore_not_found),
        ])
        .run(ctx, data)
        .await?;

        log::info!("disassociated {}", id);
        data.clear_id();
        Ok(())
    }
}
