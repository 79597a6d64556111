//! ksyun_tag - A tag key/value bound to one resource
//!
//! The id is `key:value:resource_type:resource_id`.

use std::collections::HashMap;

use async_trait::async_trait;
use ksyun_core::api::WireParams;
use ksyun_core::pipeline::{ApiCall, ApiPipeline};
use ksyun_core::provider::{ProviderContext, ProviderError, ProviderResult, ResourceType};
use ksyun_core::request::{RequestMapping, TransformRule};
use ksyun_core::resource::{ResourceData, Value};
use ksyun_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

use crate::utils::{call, ignore_not_found, items, join_id, split_id, str_field};

const SERVICE: &str = "tagv2";

/// Replace every tag of a resource with `tags`
///
/// Used by resources that carry a `tags` map.
pub fn replace_tags_call(resource_type: &str, resource_id: &str, tags: Option<&Value>) -> ApiCall {
    let mut params = WireParams::new()
        .with("ResourceType", resource_type)
        .with("ResourceUuids", resource_id);

    if let Some(Value::Map(tags)) = tags {
        let mut keys: Vec<&String> = tags.keys().collect();
        keys.sort();
        for (i, key) in keys.into_iter().enumerate() {
            let value = tags[key].as_str().unwrap_or_default();
            params.insert(format!("ReplaceTags.{}.Key", i + 1), key.as_str());
            params.insert(format!("ReplaceTags.{}.Value", i + 1), value);
        }
    }
    ApiCall::new(SERVICE, "ReplaceResourcesTags", params)
}

pub struct Tag;

impl Tag {
    fn id_parts(id: &str) -> ProviderResult<(String, String, String, String)> {
        let mut parts = split_id(id, 4)?.into_iter();
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(value), Some(resource_type), Some(resource_id)) => {
                Ok((key, value, resource_type, resource_id))
            }
            _ => Err(ProviderError::new(format!("Invalid tag id '{}'", id))),
        }
    }
}

#[async_trait]
impl ResourceType for Tag {
    fn name(&self) -> &'static str {
        "ksyun_tag"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("ksyun_tag")
            .with_description("Binds a tag to a single resource.")
            .attribute(
                AttributeSchema::new("key", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("value", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("resource_type", AttributeType::String)
                    .required()
                    .force_new()
                    .with_description("Type of the tagged resource, e.g. loadbalancer."),
            )
            .attribute(
                AttributeSchema::new("resource_id", AttributeType::String)
                    .required()
                    .force_new(),
            )
    }

    async fn create(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        let schema = self.schema();
        let create_params = RequestMapping::new(&schema)
            .only_transform(true)
            .transform("key", TransformRule::default())
            .transform("value", TransformRule::default())
            .build(data)?;

        let key = data.get_str("key").unwrap_or_default().to_string();
        let value = data.get_str("value").unwrap_or_default().to_string();
        let resource_type = data.get_str("resource_type").unwrap_or_default().to_string();
        let resource_id = data.get_str("resource_id").unwrap_or_default().to_string();

        let mut tags = HashMap::new();
        tags.insert(key.clone(), Value::String(value.clone()));

        ApiPipeline::new(vec![
            ApiCall::new(SERVICE, "CreateTag", create_params).on_error(|_, _, err| {
                if err.code().is_some_and(|c| c.contains("Exist")) {
                    Ok(None)
                } else {
                    Err(err.into())
                }
            }),
            replace_tags_call(&resource_type, &resource_id, Some(&Value::Map(tags))).after(
                |data, _, _| {
                    let id = join_id(&[
                        data.get_str("key").unwrap_or_default(),
                        data.get_str("value").unwrap_or_default(),
                        data.get_str("resource_type").unwrap_or_default(),
                        data.get_str("resource_id").unwrap_or_default(),
                    ]);
                    data.set_id(id);
                    Ok(())
                },
            ),
        ])
        .run(ctx, data)
        .await?;

        log::info!(
            "tagged {} {} with {}={}",
            resource_type,
            resource_id,
            key,
            value
        );
        self.read(ctx, data).await
    }

    async fn read(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        let Some(id) = data.id().map(str::to_string) else {
            return Ok(());
        };
        let (key, value, resource_type, resource_id) = Self::id_parts(&id)?;

        let params = WireParams::new()
            .with("Keys.1", key.as_str())
            .with("ResourceType", resource_type.as_str())
            .with("ResourceUuids", resource_id.as_str());
        let response = match call(ctx, SERVICE, "ListTags", &params).await {
            Ok(response) => response,
            Err(e) if e.is_not_found() => serde_json::Value::Null,
            Err(e) => return Err(e),
        };

        let found = items(&response, "Tags").iter().any(|tag| {
            str_field(tag, "Key").as_deref() == Some(key.as_str())
                && str_field(tag, "Value").as_deref() == Some(value.as_str())
                && str_field(tag, "ResourceUuid")
                    .is_none_or(|uuid| uuid == resource_id)
        });
        if !found {
            log::info!("tag {} no longer exists", id);
            data.clear_id();
            return Ok(());
        }

        data.set("key", Value::String(key));
        data.set("value", Value::String(value));
        data.set("resource_type", Value::String(resource_type));
        data.set("resource_id", Value::String(resource_id));
        Ok(())
    }

    async fn update(&self, _ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        let changed = self.schema().changed_keys(data);
        if changed.is_empty() {
            return Ok(());
        }
        Err(ProviderError::new(format!(
            "ksyun_tag cannot be updated in place (changed: {})",
            changed.join(", ")
        )))
    }

    async fn delete(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        let Some(id) = data.id().map(str::to_string) else {
            return Ok(());
        };
        let (key, value, resource_type, resource_id) = Self::id_parts(&id)?;

        let params = WireParams::new()
            .with("ResourceType", resource_type.as_str())
            .with("ResourceUuids", resource_id.as_str())
            .with("Tag.1.Key", key.as_str())
            .with("Tag.1.Value", value.as_str());
        ApiPipeline::new(vec![
            ApiCall::new(SERVICE, "DetachResourceTags", params).on_error(ignore_not_found),
        ])
        .run(ctx, data)
        .await?;

        data.clear_id();
        Ok(())
    }
}
