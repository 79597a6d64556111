//! Pipeline - Ordered API calls with hooks, dry-run and retry
//!
//! A lifecycle operation is a short list of [`ApiCall`]s. Each call can
//! adjust its parameters from the resource data before it runs, replace the
//! default execution, recover from errors, and consume the response.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::api::{ApiError, ApiResult, WireParams};
use crate::provider::{ProviderContext, ProviderError, ProviderResult};
use crate::resource::ResourceData;

/// Return type for boxed async hooks
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Error codes and message fragments treated as transient by default
pub const DEFAULT_TRANSIENT_ERRORS: &[&str] = &[
    "ServiceUnavailable",
    "InternalError",
    "Throttling",
    "RequestLimitExceeded",
    "OperationConflict",
    "IncorrectState",
];

/// Bounded retry on transient errors
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub delay: Duration,
    /// Error codes or message fragments that allow another attempt
    pub transient: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(3),
            transient: DEFAULT_TRANSIENT_ERRORS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
            transient: Vec::new(),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Add an error code or message fragment to the transient set
    pub fn retry_on(mut self, pattern: impl Into<String>) -> Self {
        self.transient.push(pattern.into());
        self
    }

    pub fn is_transient(&self, err: &ApiError) -> bool {
        match err {
            ApiError::Transport(_) | ApiError::Timeout(_) => true,
            ApiError::Service { .. } => err.matches_any(&self.transient),
            ApiError::Decode(_) => false,
        }
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// attempts are used up
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> ApiResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && policy.is_transient(&err) => {
                log::warn!(
                    "transient error (attempt {}/{}): {}",
                    attempt,
                    policy.max_attempts,
                    err
                );
                if !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

pub type BeforeHook = Box<dyn Fn(&ResourceData, &mut WireParams) -> ProviderResult<()> + Send + Sync>;
pub type ExecuteHook = Box<
    dyn for<'a> Fn(&'a ProviderContext, &'a ApiCall) -> BoxFuture<'a, ApiResult<serde_json::Value>>
        + Send
        + Sync,
>;
pub type ErrorHook = Box<
    dyn Fn(&ResourceData, &ApiCall, ApiError) -> ProviderResult<Option<serde_json::Value>>
        + Send
        + Sync,
>;
pub type AfterHook =
    Box<dyn Fn(&mut ResourceData, &ApiCall, &serde_json::Value) -> ProviderResult<()> + Send + Sync>;

/// One API call of a lifecycle operation
pub struct ApiCall {
    pub service: &'static str,
    pub action: &'static str,
    pub params: WireParams,
    before: Option<BeforeHook>,
    execute: Option<ExecuteHook>,
    on_error: Option<ErrorHook>,
    after: Option<AfterHook>,
    disable_dry_run: bool,
}

impl std::fmt::Debug for ApiCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCall")
            .field("service", &self.service)
            .field("action", &self.action)
            .field("params", &self.params)
            .field("disable_dry_run", &self.disable_dry_run)
            .finish_non_exhaustive()
    }
}

impl ApiCall {
    pub fn new(service: &'static str, action: &'static str, params: WireParams) -> Self {
        Self {
            service,
            action,
            params,
            before: None,
            execute: None,
            on_error: None,
            after: None,
            disable_dry_run: false,
        }
    }

    /// Adjust parameters from the resource data right before sending
    pub fn before<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ResourceData, &mut WireParams) -> ProviderResult<()> + Send + Sync + 'static,
    {
        self.before = Some(Box::new(hook));
        self
    }

    /// Replace the default `client.call(service, action, params)`
    pub fn execute<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a ProviderContext, &'a ApiCall) -> BoxFuture<'a, ApiResult<serde_json::Value>>
            + Send
            + Sync
            + 'static,
    {
        self.execute = Some(Box::new(hook));
        self
    }

    /// Handle an error that survived retries
    ///
    /// Returning `Ok(Some(response))` recovers and runs the after hook,
    /// `Ok(None)` swallows the error and skips it.
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ResourceData, &ApiCall, ApiError) -> ProviderResult<Option<serde_json::Value>>
            + Send
            + Sync
            + 'static,
    {
        self.on_error = Some(Box::new(hook));
        self
    }

    /// Consume the response, typically to set the id
    pub fn after<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut ResourceData, &ApiCall, &serde_json::Value) -> ProviderResult<()>
            + Send
            + Sync
            + 'static,
    {
        self.after = Some(Box::new(hook));
        self
    }

    pub fn disable_dry_run(mut self) -> Self {
        self.disable_dry_run = true;
        self
    }

    async fn send(&self, ctx: &ProviderContext) -> ApiResult<serde_json::Value> {
        match &self.execute {
            Some(execute) => execute(ctx, self).await,
            None => ctx.client.call(self.service, self.action, &self.params).await,
        }
    }

    async fn send_dry_run(&self, ctx: &ProviderContext) -> ProviderResult<()> {
        let params = self.params.clone().with("DryRun", true);
        match ctx.client.call(self.service, self.action, &params).await {
            Err(err) if err.is_dry_run_ok() => Ok(()),
            Err(err) => Err(ProviderError::new(format!(
                "Dry run of {} failed: {}",
                self.action, err
            ))
            .with_cause(err)),
            Ok(_) => Err(ProviderError::new(format!(
                "Dry run of {} returned a response instead of DryRunOperation",
                self.action
            ))),
        }
    }
}

/// Ordered list of calls executed against one resource
#[derive(Debug, Default)]
pub struct ApiPipeline {
    calls: Vec<ApiCall>,
    dry_run: Option<bool>,
}

impl ApiPipeline {
    pub fn new(calls: Vec<ApiCall>) -> Self {
        Self {
            calls,
            dry_run: None,
        }
    }

    /// Override the context's dry-run setting
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = Some(dry_run);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Execute every call in order and return their responses
    ///
    /// Calls swallowed by an error hook contribute `Value::Null`.
    pub async fn run(
        mut self,
        ctx: &ProviderContext,
        data: &mut ResourceData,
    ) -> ProviderResult<Vec<serde_json::Value>> {
        if self.dry_run.unwrap_or(ctx.dry_run) {
            for call in &mut self.calls {
                if call.disable_dry_run {
                    continue;
                }
                if let Some(before) = &call.before {
                    before(&*data, &mut call.params)?;
                }
                log::debug!("dry run {}.{}", call.service, call.action);
                call.send_dry_run(ctx).await?;
            }
        }

        let mut responses = Vec::with_capacity(self.calls.len());
        for mut call in self.calls {
            if let Some(before) = &call.before {
                before(&*data, &mut call.params)?;
            }
            log::debug!(
                "calling {}.{} with {:?}",
                call.service,
                call.action,
                call.params
            );

            let result = retry(&ctx.retry, || call.send(ctx)).await;
            let response = match result {
                Ok(response) => Some(response),
                Err(err) => match &call.on_error {
                    Some(on_error) => on_error(&*data, &call, err)?,
                    None => {
                        return Err(ProviderError::new(format!(
                            "{} failed: {}",
                            call.action, err
                        ))
                        .with_cause(err));
                    }
                },
            };

            match response {
                Some(response) => {
                    if let Some(after) = &call.after {
                        after(data, &call, &response)?;
                    }
                    responses.push(response);
                }
                None => {
                    log::info!("{}.{} error handled, skipping", call.service, call.action);
                    responses.push(serde_json::Value::Null);
                }
            }
        }
        Ok(responses)
    }
}
