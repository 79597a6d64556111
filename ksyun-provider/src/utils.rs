//! Helpers shared by resources: composite ids, response extraction and
//! retried one-off calls

use ksyun_core::api::{ApiError, WireParams};
use ksyun_core::pipeline::{ApiCall, retry};
use ksyun_core::provider::{ProviderContext, ProviderError, ProviderResult};
use ksyun_core::resource::ResourceData;

/// Separator of composite resource ids
pub const ID_SEPARATOR: char = ':';

/// Join composite id parts
pub fn join_id(parts: &[&str]) -> String {
    parts.join(&ID_SEPARATOR.to_string())
}

/// Split a composite id into exactly `count` non-empty parts
///
/// The last part keeps any further separators.
pub fn split_id(id: &str, count: usize) -> ProviderResult<Vec<String>> {
    let parts: Vec<String> = id.splitn(count, ID_SEPARATOR).map(str::to_string).collect();
    if parts.len() != count || parts.iter().any(|p| p.is_empty()) {
        return Err(ProviderError::new(format!(
            "Invalid id '{}': expected {} parts separated by '{}'",
            id, count, ID_SEPARATOR
        )));
    }
    Ok(parts)
}

/// Id of an existing resource, or an error naming the operation
pub fn require_id(data: &ResourceData, operation: &str) -> ProviderResult<String> {
    data.id()
        .map(str::to_string)
        .ok_or_else(|| ProviderError::new(format!("Cannot {} a resource without an id", operation)))
}

/// Send one call with the context's retry policy
pub async fn call(
    ctx: &ProviderContext,
    service: &str,
    action: &str,
    params: &WireParams,
) -> ProviderResult<serde_json::Value> {
    log::debug!("{}.{} {:?}", service, action, params);
    retry(&ctx.retry, || ctx.client.call(service, action, params))
        .await
        .map_err(ProviderError::from)
}

/// Error hook for deletes: an object that is already gone is success
pub fn ignore_not_found(
    _data: &ResourceData,
    _call: &ApiCall,
    err: ApiError,
) -> ProviderResult<Option<serde_json::Value>> {
    if err.is_not_found() {
        Ok(None)
    } else {
        Err(err.into())
    }
}

/// Items of a list field in a response; missing or non-array is empty
pub fn items(response: &serde_json::Value, list_key: &str) -> Vec<serde_json::Value> {
    response
        .get(list_key)
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
}

/// Describe a single object by id, `None` when it does not exist
pub async fn describe_one(
    ctx: &ProviderContext,
    service: &str,
    action: &str,
    params: &WireParams,
    list_key: &str,
) -> ProviderResult<Option<serde_json::Value>> {
    match call(ctx, service, action, params).await {
        Ok(response) => Ok(items(&response, list_key).into_iter().next()),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// String field of a response object
pub fn str_field(object: &serde_json::Value, key: &str) -> Option<String> {
    match object.get(key)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Id returned by a create call
pub fn created_id(response: &serde_json::Value, key: &str) -> ProviderResult<String> {
    str_field(response, key)
        .ok_or_else(|| ProviderError::new(format!("Response has no '{}': {}", key, response)))
}

/// `[{"TagKey": k, "TagValue": v}]` to `{k: v}`
pub fn tag_set_to_map(raw: &serde_json::Value) -> serde_json::Value {
    let map = raw
        .as_array()
        .map(|tags| {
            tags.iter()
                .filter_map(|tag| {
                    let key = str_field(tag, "TagKey").or_else(|| str_field(tag, "Key"))?;
                    let value = str_field(tag, "TagValue")
                        .or_else(|| str_field(tag, "Value"))
                        .unwrap_or_default();
                    Some((key, serde_json::Value::String(value)))
                })
                .collect::<serde_json::Map<_, _>>()
        })
        .unwrap_or_default();
    serde_json::Value::Object(map)
}
