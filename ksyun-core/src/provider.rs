//! Provider - Traits abstracting resource and data source lifecycles
//!
//! A Provider groups the resource types and data sources of one cloud.
//! Each resource type maps its lifecycle operations onto API calls through
//! the request/response engines and the call pipeline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::api::{ApiClient, ApiError};
use crate::pipeline::RetryPolicy;
use crate::resource::{ResourceData, ResourceId};
use crate::schema::{ResourceSchema, TypeError};

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub message: String,
    pub resource_id: Option<ResourceId>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}] {}", id, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            resource_id: None,
            cause: None,
        }
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Underlying API error, if this error came from a call
    pub fn api_error(&self) -> Option<&ApiError> {
        self.cause.as_ref().and_then(|c| c.downcast_ref::<ApiError>())
    }

    pub fn is_not_found(&self) -> bool {
        self.api_error().is_some_and(ApiError::is_not_found)
    }
}

impl From<ApiError> for ProviderError {
    fn from(err: ApiError) -> Self {
        ProviderError::new(err.to_string()).with_cause(err)
    }
}

impl From<Vec<TypeError>> for ProviderError {
    fn from(errors: Vec<TypeError>) -> Self {
        let message = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        ProviderError::new(format!("Invalid configuration: {}", message))
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Everything a lifecycle operation needs besides the resource itself
#[derive(Clone)]
pub struct ProviderContext {
    pub client: Arc<dyn ApiClient>,
    pub retry: RetryPolicy,
    pub region: String,
    /// Validate every call with `DryRun=true` before executing
    pub dry_run: bool,
    /// Upper bound for status polling after create/update/delete
    pub wait_timeout: Duration,
}

impl ProviderContext {
    pub fn new(client: Arc<dyn ApiClient>, region: impl Into<String>) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
            region: region.into(),
            dry_run: false,
            wait_timeout: Duration::from_secs(600),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }
}

/// A manageable cloud object with a create/read/update/delete/import lifecycle
#[async_trait]
pub trait ResourceType: Send + Sync {
    /// Resource type name (e.g., "ksyun_lb")
    fn name(&self) -> &'static str;

    /// Declared attribute schema
    fn schema(&self) -> ResourceSchema;

    /// Create the object; sets the id and the state on success
    async fn create(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()>;

    /// Refresh state from the cloud
    ///
    /// A missing object clears the id instead of failing.
    async fn read(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()>;

    /// Apply changed attributes in place
    async fn update(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()>;

    /// Delete the object
    async fn delete(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()>;

    /// Adopt an existing object by its import id
    async fn import(
        &self,
        ctx: &ProviderContext,
        data: &mut ResourceData,
        import_id: &str,
    ) -> ProviderResult<()> {
        data.set_id(import_id);
        self.read(ctx, data).await?;
        if data.id().is_none() {
            return Err(ProviderError::new(format!(
                "Cannot import non-existent {} '{}'",
                self.name(),
                import_id
            )));
        }
        Ok(())
    }
}

/// A read-only query over existing cloud objects
#[async_trait]
pub trait DataSourceType: Send + Sync {
    /// Data source name (e.g., "ksyun_lbs")
    fn name(&self) -> &'static str;

    /// Declared attribute schema
    fn schema(&self) -> ResourceSchema;

    /// Run the query; results are written to `data` state
    async fn read(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()>;
}

/// Main Provider trait
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "ksyun")
    fn name(&self) -> &'static str;

    /// Resource types this Provider can manage
    fn resource_types(&self) -> Vec<Box<dyn ResourceType>>;

    /// Data sources this Provider can query
    fn data_sources(&self) -> Vec<Box<dyn DataSourceType>>;

    /// Look up a resource type by name
    fn resource(&self, name: &str) -> Option<Box<dyn ResourceType>> {
        self.resource_types().into_iter().find(|r| r.name() == name)
    }

    /// Look up a data source by name
    fn data_source(&self, name: &str) -> Option<Box<dyn DataSourceType>> {
        self.data_sources().into_iter().find(|d| d.name() == name)
    }
}
