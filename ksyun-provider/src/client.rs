//! HTTP client for the Ksyun OpenAPI
//!
//! Requests are plain query-string GETs. Signing is left to a proxy in
//! front of the endpoint: when `endpoint` names such a proxy, access keys
//! are forwarded to it as headers. They never reach the public endpoints.

use async_trait::async_trait;
use ksyun_core::api::{ApiClient, ApiError, ApiResult, WireParams};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};

use crate::config::ProviderConfig;

const ACCESS_KEY_HEADER: &str = "x-ksc-access-key";
const SECRET_KEY_HEADER: &str = "x-ksc-secret-key";
const REGION_HEADER: &str = "x-ksc-region";

/// API version per service
pub fn service_version(service: &str) -> &'static str {
    match service {
        "slb" | "vpc" => "2016-03-04",
        "pdns" => "2022-06-07",
        "tagv2" => "2020-09-01",
        _ => "2016-03-04",
    }
}

pub struct HttpApiClient {
    http: reqwest::Client,
    region: String,
    endpoint: Option<String>,
}

impl HttpApiClient {
    pub fn new(config: &ProviderConfig) -> ApiResult<Self> {
        let headers = default_headers(config)?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(|e| ApiError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
        })
    }

    /// Base URL for `service`
    pub fn endpoint_for(&self, service: &str) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}.{}.api.ksyun.com", service, self.region),
        }
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn call(
        &self,
        service: &str,
        action: &str,
        params: &WireParams,
    ) -> ApiResult<serde_json::Value> {
        let mut query = vec![
            ("Action".to_string(), action.to_string()),
            ("Version".to_string(), service_version(service).to_string()),
        ];
        query.extend(params.to_query_pairs());

        let url = format!("{}/", self.endpoint_for(service));
        log::debug!("GET {} {} {:?}", url, action, query);

        let response = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ApiError::Timeout(format!("{} {}", action, e))
                } else {
                    ApiError::Transport(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        parse_response(status, &body)
    }
}

/// Headers sent with every request
///
/// Credentials are only attached for an explicit `endpoint`.
fn default_headers(config: &ProviderConfig) -> ApiResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(REGION_HEADER, header_value(REGION_HEADER, &config.region)?);

    let credentials = [
        (ACCESS_KEY_HEADER, config.access_key.as_deref()),
        (SECRET_KEY_HEADER, config.secret_key.as_deref()),
    ];
    if config.endpoint.is_none() {
        if credentials.iter().any(|(_, v)| v.is_some()) {
            log::warn!("no signing endpoint configured; access keys are not sent");
        }
        return Ok(headers);
    }
    for (name, value) in credentials {
        if let Some(value) = value {
            let mut value = header_value(name, value)?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }
    }
    Ok(headers)
}

fn header_value(name: &str, value: &str) -> ApiResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ApiError::Transport(format!("Invalid value for header {}: {}", name, e)))
}

/// Decode a response body, turning error documents into `ApiError::Service`
///
/// Errors look like `{"RequestId": "...", "Error": {"Code": "...", "Message": "..."}}`.
pub fn parse_response(status: u16, body: &str) -> ApiResult<serde_json::Value> {
    let json: serde_json::Value = match serde_json::from_str(body) {
        Ok(json) => json,
        Err(e) if (200..300).contains(&status) => {
            return Err(ApiError::Decode(format!("{}: {}", e, truncate(body))));
        }
        Err(_) => {
            return Err(ApiError::Service {
                code: format!("Http{}", status),
                message: truncate(body),
                request_id: None,
                status,
            });
        }
    };

    if let Some(error) = json.get("Error") {
        let field = |name: &str| {
            error
                .get(name)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        return Err(ApiError::Service {
            code: field("Code"),
            message: field("Message"),
            request_id: json
                .get("RequestId")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            status,
        });
    }

    if !(200..300).contains(&status) {
        return Err(ApiError::Service {
            code: format!("Http{}", status),
            message: truncate(body),
            request_id: json
                .get("RequestId")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            status,
        });
    }

    Ok(json)
}

fn truncate(body: &str) -> String {
    const MAX: usize = 512;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
