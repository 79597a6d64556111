mod manifest;
mod plan;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;

use ksyun_core::provider::{Provider, ProviderContext, ProviderError, ResourceType};
use ksyun_core::resource::{ResourceData, Value};
use ksyun_core::schema::{AttributeSchema, ResourceSchema};
use ksyun_provider::{KsyunProvider, ProviderConfig};
use ksyun_state::{ResourceState, StateBackend, StateFile, create_backend};

use manifest::{DeclaredResource, Manifest, parse_assignment};
use plan::Action;

#[derive(Parser)]
#[command(name = "ksyun")]
#[command(about = "Manage Kingsoft Cloud resources from a JSON configuration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration file against resource schemas
    Validate {
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Create, update or replace resources to match the configuration
    Apply {
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Destroy every resource recorded in state
    Destroy {
        #[arg(default_value = "main.json")]
        file: PathBuf,

        /// Skip confirmation prompt
        #[arg(long)]
        auto_approve: bool,
    },
    /// Adopt an existing object into state
    Import {
        file: PathBuf,
        /// Resource type (e.g., ksyun_lb)
        resource_type: String,
        /// Name to record the resource under
        name: String,
        /// Import id of the object
        id: String,
    },
    /// Run a data source and print its result
    Query {
        file: PathBuf,
        /// Data source name (e.g., ksyun_lbs)
        data_source: String,

        /// Data source argument, `key=value` (value may be JSON)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },
    /// Print resource and data source schemas
    Schema {
        /// Only this resource type or data source
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { file } => run_validate(&file),
        Commands::Apply { file } => run_apply(&file).await,
        Commands::Destroy { file, auto_approve } => run_destroy(&file, auto_approve).await,
        Commands::Import {
            file,
            resource_type,
            name,
            id,
        } => run_import(&file, &resource_type, &name, &id).await,
        Commands::Query {
            file,
            data_source,
            set,
        } => run_query(&file, &data_source, &set).await,
        Commands::Schema { name } => run_schema(name.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn get_provider(manifest: &Manifest) -> Result<KsyunProvider> {
    let config = ProviderConfig::from_json(&manifest.provider)?;
    Ok(KsyunProvider::new(config)?)
}

fn resource_type(provider: &KsyunProvider, name: &str) -> Result<Box<dyn ResourceType>> {
    provider
        .resource(name)
        .with_context(|| format!("Unknown resource type '{}'", name))
}

/// Defaulted and schema-checked configuration of one declared resource
fn desired_values(
    schema: &ResourceSchema,
    declared: &DeclaredResource,
    state: Option<&StateFile>,
) -> Result<HashMap<String, Value>> {
    let mut values = declared.values(state)?;
    schema.apply_defaults(&mut values);
    schema
        .validate(&values)
        .map_err(ProviderError::from)
        .with_context(|| declared.address())?;
    Ok(values)
}

fn run_validate(file: &Path) -> Result<()> {
    let manifest = Manifest::load(file)?;
    let types = ksyun_provider::resources::resource_types();

    println!("{}", "Validating...".cyan());

    let mut failures = Vec::new();
    for declared in &manifest.resources {
        let Some(rtype) = types.iter().find(|t| t.name() == declared.resource_type) else {
            failures.push(format!("Unknown resource type '{}'", declared.resource_type));
            continue;
        };
        if let Err(e) = desired_values(&rtype.schema(), declared, None) {
            failures.push(format!("{:#}", e));
        }
    }

    if !failures.is_empty() {
        for failure in &failures {
            println!("  {} {}", "✗".red(), failure);
        }
        bail!("{} resource(s) failed validation", failures.len());
    }

    println!(
        "{}",
        format!(
            "✓ {} resources validated successfully.",
            manifest.resources.len()
        )
        .green()
        .bold()
    );
    for declared in &manifest.resources {
        println!("  • {}", declared.address());
    }
    Ok(())
}

/// Run `op` while holding the state lock
async fn locked<T>(
    backend: &dyn StateBackend,
    operation: &str,
    op: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    let lock = backend.acquire_lock(operation).await?;
    let result = op.await;
    let released = backend.release_lock(&lock).await;
    let value = result?;
    released?;
    Ok(value)
}

async fn run_apply(file: &Path) -> Result<()> {
    let manifest = Manifest::load(file)?;
    let provider = get_provider(&manifest)?;
    let backend = create_backend(&manifest.backend)?;
    locked(
        backend.as_ref(),
        "apply",
        apply(&manifest, &provider, backend.as_ref()),
    )
    .await
}

async fn apply(manifest: &Manifest, provider: &KsyunProvider, backend: &dyn StateBackend) -> Result<()> {
    let ctx = provider.context();
    let mut state = backend.read_state().await?.unwrap_or_default();

    println!("{}", "Applying changes...".cyan().bold());
    println!();

    let mut changed = 0;
    let mut unchanged = 0;
    let mut failed = 0;

    for declared in &manifest.resources {
        let address = declared.address();
        match apply_one(provider, &ctx, declared, &mut state).await {
            Ok(Action::NoOp) => {
                println!("  {} {}", Action::NoOp, address);
                unchanged += 1;
                continue;
            }
            Ok(action) => {
                println!("  {} {} {}", "✓".green(), action, address);
                changed += 1;
            }
            Err(e) => {
                println!("  {} {} - {:#}", "✗".red(), address, e);
                failed += 1;
            }
        }
        state.increment_serial();
        backend.write_state(&state).await?;
    }

    // Recorded resources no longer declared, newest first
    let orphans: Vec<ResourceState> = state
        .resources
        .iter()
        .rev()
        .filter(|r| manifest.find(&r.resource_type, &r.name).is_none())
        .cloned()
        .collect();
    for recorded in orphans {
        let address = format!("{}.{}", recorded.resource_type, recorded.name);
        match delete_recorded(provider, &ctx, &recorded).await {
            Ok(()) => {
                state.remove(&recorded.resource_type, &recorded.name);
                println!("  {} {} {}", "✓".green(), "-".red().bold(), address);
                changed += 1;
            }
            Err(e) => {
                println!("  {} {} - {:#}", "✗".red(), address, e);
                failed += 1;
            }
        }
        state.increment_serial();
        backend.write_state(&state).await?;
    }

    println!();
    if failed > 0 {
        bail!("Apply failed. {} changed, {} failed.", changed, failed);
    }
    println!(
        "{}",
        format!(
            "Apply complete! {} changed, {} unchanged.",
            changed, unchanged
        )
        .green()
        .bold()
    );
    Ok(())
}

async fn apply_one(
    provider: &KsyunProvider,
    ctx: &ProviderContext,
    declared: &DeclaredResource,
    state: &mut StateFile,
) -> Result<Action> {
    let rtype = resource_type(provider, &declared.resource_type)?;
    let schema = rtype.schema();
    let desired = desired_values(&schema, declared, Some(&*state))?;
    let recorded = state.find(&declared.resource_type, &declared.name).cloned();

    let mut data = match &recorded {
        Some(recorded) => {
            let mut data =
                ResourceData::existing(recorded.id.clone(), desired.clone(), recorded.values());
            rtype.read(ctx, &mut data).await?;
            if data.is_new_resource() {
                log::warn!("{} is gone, creating it again", declared.address());
                state.remove(&declared.resource_type, &declared.name);
                data = ResourceData::new(desired.clone());
            }
            data
        }
        None => ResourceData::new(desired.clone()),
    };

    let tainted = recorded.is_some_and(|r| r.tainted) && !data.is_new_resource();
    let action = if tainted {
        Action::Replace(Vec::new())
    } else {
        plan::decide(&schema, &data)
    };

    let mut creating = matches!(action, Action::Create);
    let outcome = match &action {
        Action::NoOp => Ok(()),
        Action::Create => rtype.create(ctx, &mut data).await,
        Action::Update(keys) => {
            log::info!("{} changed: {}", declared.address(), keys.join(", "));
            rtype.update(ctx, &mut data).await
        }
        Action::Replace(keys) => {
            if tainted {
                log::info!("{} is tainted, replacing it", declared.address());
            } else {
                log::info!("{} must be replaced: {}", declared.address(), keys.join(", "));
            }
            match rtype.delete(ctx, &mut data).await {
                Ok(()) => {
                    state.remove(&declared.resource_type, &declared.name);
                    data = ResourceData::new(desired);
                    creating = true;
                    rtype.create(ctx, &mut data).await
                }
                Err(e) => Err(e),
            }
        }
    };

    if let Err(e) = outcome {
        // The object exists in the cloud even though the step failed
        if let Some(id) = data.id() {
            log::warn!("{} failed with {} recorded", declared.address(), id);
            state.upsert(
                ResourceState::new(&declared.resource_type, &declared.name, id)
                    .with_values(&data.state)
                    .with_tainted(creating || tainted),
            );
        }
        return Err(e.into());
    }

    let id = data
        .id()
        .map(str::to_string)
        .with_context(|| format!("{} has no id after apply", declared.address()))?;
    state.upsert(
        ResourceState::new(&declared.resource_type, &declared.name, id).with_values(&data.state),
    );
    Ok(action)
}

async fn delete_recorded(
    provider: &KsyunProvider,
    ctx: &ProviderContext,
    recorded: &ResourceState,
) -> Result<()> {
    let rtype = resource_type(provider, &recorded.resource_type)?;
    let mut data =
        ResourceData::existing(recorded.id.clone(), HashMap::new(), recorded.values());
    rtype.delete(ctx, &mut data).await?;
    Ok(())
}

async fn run_destroy(file: &Path, auto_approve: bool) -> Result<()> {
    let manifest = Manifest::load(file)?;
    let provider = get_provider(&manifest)?;
    let backend = create_backend(&manifest.backend)?;
    locked(
        backend.as_ref(),
        "destroy",
        destroy(&provider, backend.as_ref(), auto_approve),
    )
    .await
}

async fn destroy(provider: &KsyunProvider, backend: &dyn StateBackend, auto_approve: bool) -> Result<()> {
    let Some(mut state) = backend.read_state().await? else {
        println!("{}", "No resources to destroy.".green());
        return Ok(());
    };
    if state.resources.is_empty() {
        println!("{}", "No resources to destroy.".green());
        return Ok(());
    }

    // Dependents were applied after their dependencies
    let destroy_order: Vec<ResourceState> = state.resources.iter().rev().cloned().collect();

    println!("{}", "Destroy Plan:".red().bold());
    println!();
    for recorded in &destroy_order {
        println!(
            "  {} {}.{} ({})",
            "-".red().bold(),
            recorded.resource_type,
            recorded.name,
            recorded.id
        );
    }
    println!();
    println!("Plan: {} to destroy.", destroy_order.len().to_string().red());
    println!();

    if !auto_approve && !confirm()? {
        println!();
        println!("{}", "Destroy cancelled.".yellow());
        return Ok(());
    }

    println!("{}", "Destroying resources...".red().bold());
    println!();

    let ctx = provider.context();
    let mut destroyed = 0;
    let mut failed = 0;
    for recorded in destroy_order {
        let address = format!("{}.{}", recorded.resource_type, recorded.name);
        match delete_recorded(provider, &ctx, &recorded).await {
            Ok(()) => {
                println!("  {} {}", "✓".green(), address);
                state.remove(&recorded.resource_type, &recorded.name);
                destroyed += 1;
            }
            Err(e) => {
                println!("  {} {} - {:#}", "✗".red(), address, e);
                failed += 1;
            }
        }
        state.increment_serial();
        backend.write_state(&state).await?;
    }

    println!();
    if failed > 0 {
        bail!("Destroy failed. {} succeeded, {} failed.", destroyed, failed);
    }
    println!(
        "{}",
        format!("Destroy complete! {} resources destroyed.", destroyed)
            .green()
            .bold()
    );
    Ok(())
}

fn confirm() -> Result<bool> {
    println!(
        "{}",
        "Do you really want to destroy all resources?"
            .yellow()
            .bold()
    );
    println!(
        "  {}",
        "This action cannot be undone. Type 'yes' to confirm.".yellow()
    );
    print!("\n  Enter a value: ");
    std::io::Write::flush(&mut std::io::stdout())?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim() == "yes")
}

async fn run_import(file: &Path, type_name: &str, name: &str, id: &str) -> Result<()> {
    let manifest = Manifest::load(file)?;
    let provider = get_provider(&manifest)?;
    let backend = create_backend(&manifest.backend)?;
    locked(backend.as_ref(), "import", async {
        let mut state = backend.read_state().await?.unwrap_or_default();
        if let Some(existing) = state.find(type_name, name) {
            bail!(
                "{}.{} is already managed with id {}",
                type_name,
                name,
                existing.id
            );
        }

        let rtype = resource_type(&provider, type_name)?;
        let mut data = ResourceData::new(HashMap::new());
        rtype.import(&provider.context(), &mut data, id).await?;
        let imported_id = data.id().unwrap_or(id).to_string();

        state.upsert(ResourceState::new(type_name, name, imported_id).with_values(&data.state));
        state.increment_serial();
        backend.write_state(&state).await?;

        println!(
            "{}",
            format!("Imported {}.{} ({}).", type_name, name, id)
                .green()
                .bold()
        );
        if manifest.find(type_name, name).is_none() {
            println!(
                "  {}",
                "Not declared in the configuration; the next apply will delete it.".yellow()
            );
        }
        Ok::<_, anyhow::Error>(())
    })
    .await
}

async fn run_query(file: &Path, name: &str, assignments: &[String]) -> Result<()> {
    let manifest = Manifest::load(file)?;
    let provider = get_provider(&manifest)?;
    let data_source = provider
        .data_source(name)
        .with_context(|| format!("Unknown data source '{}'", name))?;

    let args = assignments
        .iter()
        .map(|a| parse_assignment(a))
        .collect::<Result<HashMap<_, _>>>()?;
    data_source
        .schema()
        .validate(&args)
        .map_err(ProviderError::from)?;

    let mut data = ResourceData::new(args);
    data_source.read(&provider.context(), &mut data).await?;

    let result: serde_json::Map<String, serde_json::Value> = data
        .state
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn run_schema(name: Option<&str>) -> Result<()> {
    let resources = ksyun_provider::resources::resource_types();
    let data_sources = ksyun_provider::data_sources::data_sources();

    let mut schemas: Vec<(&str, ResourceSchema)> = resources
        .iter()
        .map(|r| ("resource", r.schema()))
        .chain(data_sources.iter().map(|d| ("data source", d.schema())))
        .filter(|(_, s)| name.is_none_or(|n| s.resource_type == n))
        .collect();
    if schemas.is_empty() {
        bail!("Unknown resource type or data source '{}'", name.unwrap_or_default());
    }
    schemas.sort_by(|a, b| a.1.resource_type.cmp(&b.1.resource_type));

    for (kind, schema) in &schemas {
        println!("{} ({})", schema.resource_type.cyan().bold(), kind);
        if let Some(description) = &schema.description {
            println!("  {}", description.dimmed());
        }
        for attr in schema.attributes.values() {
            print_attribute(attr, 1);
        }
        println!();
    }
    Ok(())
}

fn print_attribute(attr: &AttributeSchema, depth: usize) {
    let mut flags = Vec::new();
    if attr.required {
        flags.push("required".red().to_string());
    }
    if attr.optional {
        flags.push("optional".normal().to_string());
    }
    if attr.computed {
        flags.push("computed".dimmed().to_string());
    }
    if attr.force_new {
        flags.push("force new".yellow().to_string());
    }
    if let Some(max) = attr.max_items {
        flags.push(format!("max {}", max));
    }

    println!(
        "{}{}: {} [{}]",
        "  ".repeat(depth),
        attr.name.bold(),
        attr.attr_type,
        flags.join(", ")
    );
    if let Some(block) = attr.attr_type.block() {
        for nested in block.values() {
            print_attribute(nested, depth + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ksyun_core::api::{ApiClient, ApiResult, WireParams};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Answers each action from a queue; the last answer repeats
    #[derive(Default)]
    struct QueuedClient {
        responses: Mutex<HashMap<String, VecDeque<serde_json::Value>>>,
        actions: Mutex<Vec<String>>,
    }

    impl QueuedClient {
        fn respond(&self, action: &str, response: serde_json::Value) -> &Self {
            self.responses
                .lock()
                .unwrap()
                .entry(action.to_string())
                .or_default()
                .push_back(response);
            self
        }

        fn actions(&self) -> Vec<String> {
            self.actions.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ApiClient for QueuedClient {
        async fn call(
            &self,
            _service: &str,
            action: &str,
            _params: &WireParams,
        ) -> ApiResult<serde_json::Value> {
            self.actions.lock().unwrap().push(action.to_string());
            let mut responses = self.responses.lock().unwrap();
            let Some(queue) = responses.get_mut(action) else {
                return Ok(json!({}));
            };
            let response = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            Ok(response.unwrap_or_else(|| json!({})))
        }
    }

    fn described(id: &str, status: &str) -> serde_json::Value {
        json!({"LoadBalancerDescriptions": [{
            "LoadBalancerId": id,
            "VpcId": "vpc-1",
            "Type": "public",
            "State": status,
        }]})
    }

    fn declared() -> DeclaredResource {
        let manifest = Manifest::parse(
            r#"{"resources": [{"type": "ksyun_lb", "name": "web", "attributes": {"vpc_id": "vpc-1"}}]}"#,
        )
        .unwrap();
        manifest.resources[0].clone()
    }

    fn provider(client: Arc<QueuedClient>) -> KsyunProvider {
        let config = ProviderConfig {
            region: "cn-beijing-6".to_string(),
            max_retries: 0,
            ..ProviderConfig::default()
        };
        KsyunProvider::with_client(config, client)
    }

    #[tokio::test(start_paused = true)]
    async fn failed_create_keeps_the_new_id_tainted() {
        let client = Arc::new(QueuedClient::default());
        client
            .respond("CreateLoadBalancer", json!({"LoadBalancerId": "lb-1"}))
            .respond("DescribeLoadBalancers", described("lb-1", "error"));
        let provider = provider(client.clone());
        let mut state = StateFile::new();

        let err = apply_one(&provider, &provider.context(), &declared(), &mut state)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("error"));

        let recorded = state.find("ksyun_lb", "web").unwrap();
        assert_eq!(recorded.id, "lb-1");
        assert!(recorded.tainted);
    }

    #[tokio::test(start_paused = true)]
    async fn tainted_resource_is_replaced() {
        let client = Arc::new(QueuedClient::default());
        client
            .respond("DescribeLoadBalancers", described("lb-1", "active"))
            .respond("DescribeLoadBalancers", json!({"LoadBalancerDescriptions": []}))
            .respond("DescribeLoadBalancers", described("lb-2", "active"))
            .respond("CreateLoadBalancer", json!({"LoadBalancerId": "lb-2"}));
        let provider = provider(client.clone());
        let mut state = StateFile::new();
        state.upsert(ResourceState::new("ksyun_lb", "web", "lb-1").with_tainted(true));

        let action = apply_one(&provider, &provider.context(), &declared(), &mut state)
            .await
            .unwrap();
        assert_eq!(action, Action::Replace(Vec::new()));

        let actions = client.actions();
        let deleted = actions.iter().position(|a| a == "DeleteLoadBalancer").unwrap();
        let created = actions.iter().position(|a| a == "CreateLoadBalancer").unwrap();
        assert!(deleted < created);

        let recorded = state.find("ksyun_lb", "web").unwrap();
        assert_eq!(recorded.id, "lb-2");
        assert!(!recorded.tainted);
    }
}
