//! In-memory API client for resource tests

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ksyun_core::api::{ApiClient, ApiError, ApiResult, WireParams};
use ksyun_core::pipeline::RetryPolicy;
use ksyun_core::provider::ProviderContext;

/// One recorded request
#[derive(Debug, Clone)]
pub struct Recorded {
    pub service: String,
    pub action: String,
    pub params: WireParams,
}

/// Answers each action from a queue of scripted responses
///
/// An action with an empty queue answers `{}`.
#[derive(Default)]
pub struct ScriptedClient {
    responses: Mutex<HashMap<String, VecDeque<ApiResult<serde_json::Value>>>>,
    calls: Mutex<Vec<Recorded>>,
}

impl ScriptedClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, action: &str, response: serde_json::Value) -> &Self {
        self.push(action, Ok(response))
    }

    pub fn fail(&self, action: &str, code: &str) -> &Self {
        self.push(action, Err(ApiError::service(code, "scripted failure")))
    }

    fn push(&self, action: &str, response: ApiResult<serde_json::Value>) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .entry(action.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    /// Parameters of every call to `action`, in order
    pub fn params_of(&self, action: &str) -> Vec<WireParams> {
        self.calls()
            .into_iter()
            .filter(|c| c.action == action)
            .map(|c| c.params)
            .collect()
    }

    pub fn actions(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.action).collect()
    }
}

#[async_trait]
impl ApiClient for ScriptedClient {
    async fn call(
        &self,
        service: &str,
        action: &str,
        params: &WireParams,
    ) -> ApiResult<serde_json::Value> {
        self.calls.lock().unwrap().push(Recorded {
            service: service.to_string(),
            action: action.to_string(),
            params: params.clone(),
        });
        self.responses
            .lock()
            .unwrap()
            .get_mut(action)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| Ok(serde_json::json!({})))
    }
}

/// Context without retries or long waits
pub fn context(client: Arc<ScriptedClient>) -> ProviderContext {
    ProviderContext::new(client, "cn-beijing-6")
        .with_retry(RetryPolicy::none())
        .with_wait_timeout(Duration::from_secs(30))
}
