//! API - The seam between the mapping engine and the wire
//!
//! The Ksyun OpenAPI is query-style: every call is a service, an `Action`
//! and a flat set of parameters. Responses are JSON documents.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by an API call
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The service answered with an error document
    #[error("{code}: {message} (request id: {})", request_id.as_deref().unwrap_or("-"))]
    Service {
        code: String,
        message: String,
        request_id: Option<String>,
        status: u16,
    },

    /// The request never got a response
    #[error("Transport error: {0}")]
    Transport(String),

    /// The response could not be decoded
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The call did not complete in time
    #[error("Timed out: {0}")]
    Timeout(String),
}

impl ApiError {
    pub fn service(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            code: code.into(),
            message: message.into(),
            request_id: None,
            status: 400,
        }
    }

    /// Service error code, if any
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Service { code, .. } => Some(code),
            _ => None,
        }
    }

    /// The object addressed by the call does not exist
    pub fn is_not_found(&self) -> bool {
        self.code().is_some_and(|c| c.contains("NotFound"))
    }

    /// Expected answer to a request sent with `DryRun=true`
    pub fn is_dry_run_ok(&self) -> bool {
        self.code() == Some("DryRunOperation")
    }

    /// Text matched against transient-error patterns
    pub fn matches_any(&self, patterns: &[String]) -> bool {
        let text = match self {
            Self::Service { code, message, .. } => format!("{} {}", code, message),
            other => other.to_string(),
        };
        patterns.iter().any(|p| text.contains(p.as_str()))
    }
}

/// Result type for API calls
pub type ApiResult<T> = Result<T, ApiError>;

/// Flat wire parameter map
///
/// Keys are sorted so that encoded requests are stable. Values are JSON
/// scalars; `to_query_pairs` renders them as strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireParams(BTreeMap<String, serde_json::Value>);

impl WireParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy every entry of `other`, overriding existing keys
    pub fn extend(&mut self, other: WireParams) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    /// Render as query-string pairs
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|(k, v)| {
                let v = match v {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                };
                (k.clone(), v)
            })
            .collect()
    }
}

impl<K: Into<String>, V: Into<serde_json::Value>> FromIterator<(K, V)> for WireParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Client for the cloud API
///
/// Implementations own transport, endpoints and credentials.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Invoke `action` on `service` with the given parameters
    async fn call(
        &self,
        service: &str,
        action: &str,
        params: &WireParams,
    ) -> ApiResult<serde_json::Value>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_pairs_render_scalars() {
        let params = WireParams::new()
            .with("LoadBalancerName", "web")
            .with("Limit", 10)
            .with("DryRun", true);
        assert_eq!(
            params.to_query_pairs(),
            vec![
                ("DryRun".to_string(), "true".to_string()),
                ("Limit".to_string(), "10".to_string()),
                ("LoadBalancerName".to_string(), "web".to_string()),
            ]
        );
    }

    #[test]
    fn error_classification() {
        let err = ApiError::service("LoadBalancerNotFound", "missing");
        assert!(err.is_not_found());
        assert!(!err.is_dry_run_ok());

        let err = ApiError::service("DryRunOperation", "would succeed");
        assert!(err.is_dry_run_ok());

        let err = ApiError::service("InternalError", "boom");
        assert!(err.matches_any(&["InternalError".to_string()]));
        assert!(!err.matches_any(&["Throttling".to_string()]));

        let err = ApiError::Transport("connection reset by peer".to_string());
        assert!(err.matches_any(&["connection reset".to_string()]));
        assert_eq!(err.code(), None);
    }

    #[test]
    fn extend_overrides() {
        let mut a: WireParams = [("A", json!(1)), ("B", json!(2))].into_iter().collect();
        a.extend(WireParams::new().with("B", 3));
        assert_eq!(a.get("B"), Some(&json!(3)));
        assert_eq!(a.len(), 2);
    }
}
