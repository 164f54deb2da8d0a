mod display;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::{debug, info, warn};

use portico_core::differ::create_plan;
use portico_core::effect::Effect;
use portico_core::interpreter::{EffectOutcome, Interpreter, InterpreterConfig};
use portico_core::plan::Plan;
use portico_core::parser::{self, ParsedFile};
use portico_core::provider::{Provider, ProviderError, ResourceType};
use portico_core::resource::{Resource, ResourceId, State};
use portico_core::schema::ResourceSchema;
use portico_provider_apigateway::{
    ApiGatewayProvider, DomainNameType, PROVIDER_NAME, ProviderSettings, RESOURCE_TYPE,
};
use portico_state::lock::DEFAULT_LOCK_TIMEOUT_SECS;
use portico_state::{BackendConfig, LocalBackend, LockInfo, StateBackend, StateFile, create_backend};

#[derive(Parser)]
#[command(name = "portico")]
#[command(about = "Declarative management of API Gateway custom domain names", long_about = None)]
struct Cli {
    /// Log filter (e.g., "info" or "portico_provider_apigateway=debug"); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration file
    Validate {
        /// Path to .prt file
        #[arg(default_value = "main.prt")]
        file: PathBuf,
    },
    /// Show execution plan without applying changes
    Plan {
        /// Path to .prt file
        #[arg(default_value = "main.prt")]
        file: PathBuf,
    },
    /// Apply changes to reach the desired state
    Apply {
        /// Path to .prt file
        #[arg(default_value = "main.prt")]
        file: PathBuf,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Destroy all resources recorded in state
    Destroy {
        /// Path to .prt file
        #[arg(default_value = "main.prt")]
        file: PathBuf,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Adopt an existing domain name into state
    Import {
        /// State address (e.g., domain_name.api)
        address: String,

        /// The domain name to import (e.g., api.example.com)
        domain_name: String,

        /// Path to .prt file with provider and backend settings
        #[arg(long, default_value = "main.prt")]
        file: PathBuf,
    },
    /// Update state from the real domain names
    Refresh {
        /// Path to .prt file
        #[arg(default_value = "main.prt")]
        file: PathBuf,
    },
    /// Inspect state
    State {
        #[command(subcommand)]
        command: StateCommands,
    },
    /// Remove a stale state lock by its ID
    ForceUnlock {
        lock_id: String,

        /// Path to .prt file with backend settings
        #[arg(long, default_value = "main.prt")]
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum StateCommands {
    /// List resources in state
    List {
        #[arg(long, default_value = "main.prt")]
        file: PathBuf,
    },
    /// Show the stored attributes of one resource
    Show {
        address: String,

        #[arg(long, default_value = "main.prt")]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logger(cli.log_level.as_deref());

    let result = match cli.command {
        Commands::Validate { file } => run_validate(&file),
        Commands::Plan { file } => run_plan(&file).await,
        Commands::Apply { file, auto_approve } => run_apply(&file, auto_approve).await,
        Commands::Destroy { file, auto_approve } => run_destroy(&file, auto_approve).await,
        Commands::Import {
            address,
            domain_name,
            file,
        } => run_import(&address, &domain_name, &file).await,
        Commands::Refresh { file } => run_refresh(&file).await,
        Commands::State { command } => match command {
            StateCommands::List { file } => run_state_list(&file).await,
            StateCommands::Show { address, file } => run_state_show(&address, &file).await,
        },
        Commands::ForceUnlock { lock_id, file } => run_force_unlock(&lock_id, &file).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logger(level: Option<&str>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if let Some(level) = level {
        builder.parse_filters(level);
    }
    builder.format_timestamp(None).init();
}

fn get_schemas() -> HashMap<String, ResourceSchema> {
    let domain_name = DomainNameType;
    HashMap::from([(domain_name.name().to_string(), domain_name.schema())])
}

fn validate_resources(resources: &[Resource]) -> Result<(), String> {
    let schemas = get_schemas();
    let mut all_errors = Vec::new();

    for resource in resources {
        if let Some(provider) = resource.provider()
            && provider != PROVIDER_NAME
        {
            all_errors.push(format!("{}: unknown provider '{}'", resource.id, provider));
            continue;
        }
        match schemas.get(&resource.id.resource_type) {
            Some(schema) => {
                if let Err(errors) = schema.validate(&resource.attributes) {
                    for error in errors {
                        all_errors.push(format!("{}: {}", resource.id, error));
                    }
                }
            }
            None => all_errors.push(format!(
                "{}: unknown resource type '{}'",
                resource.id, resource.id.resource_type
            )),
        }
    }

    if all_errors.is_empty() {
        Ok(())
    } else {
        Err(all_errors.join("\n"))
    }
}

/// Read, parse, validate and normalize a configuration file
fn load_config(file: &Path) -> Result<ParsedFile, String> {
    let content = fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {}", file.display(), e))?;
    let mut parsed = parser::parse(&content).map_err(|e| format!("Parse error: {}", e))?;

    validate_resources(&parsed.resources)?;

    let schemas = get_schemas();
    for resource in &mut parsed.resources {
        if let Some(schema) = schemas.get(&resource.id.resource_type) {
            schema.normalize(&mut resource.attributes);
        }
    }
    Ok(parsed)
}

/// Commands that only need provider and backend settings work without a file
fn load_config_or_default(file: &Path) -> Result<ParsedFile, String> {
    if file.exists() {
        load_config(file)
    } else {
        debug!("{} not found, using default settings", file.display());
        Ok(ParsedFile::default())
    }
}

async fn open_backend(parsed: &ParsedFile) -> Result<Box<dyn StateBackend>, String> {
    let config = parsed
        .backend
        .as_ref()
        .map(BackendConfig::from)
        .unwrap_or_else(|| BackendConfig::local(LocalBackend::DEFAULT_STATE_FILE));
    create_backend(&config)
        .await
        .map_err(|e| format!("Failed to open state backend: {}", e))
}

async fn get_provider(parsed: &ParsedFile) -> Result<ApiGatewayProvider, String> {
    if let Some(other) = parsed.providers.iter().find(|p| p.name != PROVIDER_NAME) {
        return Err(format!("Unknown provider: {}", other.name));
    }
    let settings = match parsed.provider(PROVIDER_NAME) {
        Some(config) => ProviderSettings::from_config(config).map_err(|e| e.to_string())?,
        None => ProviderSettings::default(),
    };
    ApiGatewayProvider::new(settings)
        .await
        .map_err(|e| e.to_string())
}

async fn read_state_file(backend: &dyn StateBackend) -> Result<StateFile, String> {
    Ok(backend
        .read_state()
        .await
        .map_err(|e| format!("Failed to read state: {}", e))?
        .unwrap_or_default())
}

async fn save_state(backend: &dyn StateBackend, state_file: &mut StateFile) -> Result<(), String> {
    state_file.increment_serial();
    backend
        .write_state(state_file)
        .await
        .map_err(|e| format!("Failed to write state: {}", e))
}

async fn acquire_lock(backend: &dyn StateBackend, operation: &str) -> Result<LockInfo, String> {
    backend
        .acquire_lock(operation)
        .await
        .map_err(|e| format!("Failed to acquire state lock: {}", e))
}

/// Lock expiry for an apply: the default expiry plus every resource's
/// longest wait, so a lock is never taken over while a wait is in progress
fn apply_lock_timeout_secs(resources: &[Resource]) -> i64 {
    let schemas = get_schemas();
    let waits: u64 = resources
        .iter()
        .filter_map(|resource| {
            let schema = schemas.get(&resource.id.resource_type)?;
            schema.timeouts.resolve(&resource.attributes).ok()?.longest()
        })
        .fold(0, |total, wait| total.saturating_add(wait.as_secs()));
    i64::try_from(waits)
        .unwrap_or(i64::MAX)
        .saturating_add(DEFAULT_LOCK_TIMEOUT_SECS)
}

async fn release_lock(backend: &dyn StateBackend, lock: &LockInfo) {
    if let Err(e) = backend.release_lock(lock).await {
        warn!("Failed to release state lock {}: {}", lock.id, e);
    }
}

/// Declared resources as the provider would report them
fn desired_resources<P: Provider>(provider: &P, resources: &[Resource]) -> Vec<Resource> {
    resources.iter().map(|r| provider.desired(r)).collect()
}

/// Read the live state of everything recorded in state
async fn read_current_states<P: Provider>(
    provider: &P,
    state_file: &StateFile,
) -> Result<HashMap<ResourceId, State>, String> {
    let mut current_states = HashMap::new();
    for stored in &state_file.resources {
        let id = stored.id();
        let state = provider
            .read(&id, stored.identifier.as_deref())
            .await
            .map_err(|e| format!("Failed to read {}: {}", id, e))?;
        if !state.exists {
            warn!("{} is recorded in state but no longer exists", id);
        }
        current_states.insert(id, state);
    }
    Ok(current_states)
}

/// Accepts `domain_name.api`, `apigateway.domain_name.api` or just `api`
fn parse_address(address: &str) -> Result<ResourceId, String> {
    let name = address
        .strip_prefix(&format!("{}.", PROVIDER_NAME))
        .unwrap_or(address);
    let name = name
        .strip_prefix(&format!("{}.", RESOURCE_TYPE))
        .unwrap_or(name);
    if name.is_empty() {
        return Err(format!("Invalid address: '{}'", address));
    }
    Ok(ResourceId::new(RESOURCE_TYPE, name))
}

fn confirm(question: &str) -> Result<bool, String> {
    println!("{}", question.yellow().bold());
    println!("  {}", "Only 'yes' will be accepted to approve.".yellow());
    print!("\n  Enter a value: ");
    std::io::Write::flush(&mut std::io::stdout()).map_err(|e| e.to_string())?;

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .map_err(|e| e.to_string())?;
    println!();

    Ok(input.trim() == "yes")
}

fn record_outcome(state_file: &mut StateFile, outcome: &EffectOutcome) {
    match outcome {
        EffectOutcome::Read { state }
        | EffectOutcome::Created { state }
        | EffectOutcome::Updated { state }
        | EffectOutcome::Replaced { state } => state_file.apply_state(state, PROVIDER_NAME),
        EffectOutcome::Deleted { id } => {
            state_file.remove_resource(&id.resource_type, &id.name);
        }
    }
}

/// Keep state in line with reality after a failed effect
async fn record_failure<P: Provider>(
    state_file: &mut StateFile,
    provider: &P,
    effect: &Effect,
    error: &ProviderError,
) {
    if let Some(state) = &error.state {
        info!("Saving last-known state of {}", state.id);
        state_file.apply_state(state, PROVIDER_NAME);
        return;
    }

    // The old domain name may already be gone when a replace fails
    if let Effect::Replace { id, from, .. } = effect
        && let Some(identifier) = from.identifier.as_deref()
    {
        match provider.read(id, Some(identifier)).await {
            Ok(state) => state_file.apply_state(&state, PROVIDER_NAME),
            Err(e) => warn!("Failed to refresh {} after failed replace: {}", id, e),
        }
    }
}

fn run_validate(file: &Path) -> Result<(), String> {
    let parsed = load_config(file)?;

    println!(
        "{}",
        format!("✓ {} resources validated.", parsed.resources.len()).green()
    );
    for resource in &parsed.resources {
        println!("  • {}", resource.id);
    }
    Ok(())
}

async fn run_plan(file: &Path) -> Result<(), String> {
    let parsed = load_config(file)?;
    let backend = open_backend(&parsed).await?;
    let state_file = read_state_file(backend.as_ref()).await?;
    let provider = get_provider(&parsed).await?;

    let schemas = get_schemas();
    let current_states = read_current_states(&provider, &state_file).await?;
    let desired = desired_resources(&provider, &parsed.resources);
    let plan = create_plan(&desired, &current_states, &schemas);
    display::print_plan(&plan, &schemas);
    Ok(())
}

async fn run_apply(file: &Path, auto_approve: bool) -> Result<(), String> {
    let parsed = load_config(file)?;
    let backend = open_backend(&parsed).await?;
    let provider = get_provider(&parsed).await?;

    let lock = backend
        .acquire_lock_with_timeout("apply", apply_lock_timeout_secs(&parsed.resources))
        .await
        .map_err(|e| format!("Failed to acquire state lock: {}", e))?;
    let result = apply_locked(&parsed, backend.as_ref(), provider, auto_approve).await;
    release_lock(backend.as_ref(), &lock).await;
    result
}

async fn apply_locked<P: Provider>(
    parsed: &ParsedFile,
    backend: &dyn StateBackend,
    provider: P,
    auto_approve: bool,
) -> Result<(), String> {
    let mut state_file = read_state_file(backend).await?;
    let schemas = get_schemas();
    let current_states = read_current_states(&provider, &state_file).await?;
    let desired = desired_resources(&provider, &parsed.resources);
    let plan = create_plan(&desired, &current_states, &schemas);

    if plan.is_empty() {
        println!("{}", "No changes needed.".green());
        return Ok(());
    }

    display::print_plan(&plan, &schemas);
    println!();

    if !auto_approve && !confirm("Do you want to perform these actions?")? {
        println!("{}", "Apply cancelled.".yellow());
        return Ok(());
    }

    println!("{}", "Applying changes...".cyan().bold());
    println!();

    let interpreter = Interpreter::new(provider);
    let mut success_count = 0;
    let mut failure_count = 0;

    for effect in plan.effects() {
        match interpreter.execute_effect(effect).await {
            Ok(outcome) => {
                println!("  {} {}", "✓".green(), effect);
                success_count += 1;
                record_outcome(&mut state_file, &outcome);
            }
            Err(e) => {
                println!("  {} {} - {}", "✗".red(), effect, e);
                if e.is_retryable() {
                    println!(
                        "    {}",
                        "This failure is retryable; run apply again to resume.".yellow()
                    );
                }
                failure_count += 1;
                record_failure(&mut state_file, interpreter.provider(), effect, &e).await;
            }
        }
        save_state(backend, &mut state_file).await?;

        if failure_count > 0 {
            break;
        }
    }

    println!();
    if failure_count == 0 {
        println!(
            "{}",
            format!("Apply complete! {} changes applied.", success_count)
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Apply failed. {} succeeded, {} failed.",
            success_count, failure_count
        ))
    }
}

async fn run_destroy(file: &Path, auto_approve: bool) -> Result<(), String> {
    let parsed = load_config_or_default(file)?;
    let backend = open_backend(&parsed).await?;
    let provider = get_provider(&parsed).await?;

    let lock = acquire_lock(backend.as_ref(), "destroy").await?;
    let result = destroy_locked(backend.as_ref(), provider, auto_approve).await;
    release_lock(backend.as_ref(), &lock).await;
    result
}

async fn destroy_locked<P: Provider>(
    backend: &dyn StateBackend,
    provider: P,
    auto_approve: bool,
) -> Result<(), String> {
    let mut state_file = read_state_file(backend).await?;

    if state_file.resources.is_empty() {
        println!("{}", "No resources to destroy.".green());
        return Ok(());
    }

    let effects: Vec<Effect> = state_file
        .resources
        .iter()
        .rev()
        .filter_map(|stored| {
            stored.identifier.as_ref().map(|identifier| Effect::Delete {
                id: stored.id(),
                identifier: identifier.clone(),
            })
        })
        .collect();

    println!("{}", "Destroy Plan:".red().bold());
    println!();
    for effect in &effects {
        println!("  {} {}", "-".red().bold(), effect.resource_id());
    }
    println!();
    println!(
        "Plan: {} to destroy.",
        effects.len().to_string().red()
    );
    println!();

    if !auto_approve && !confirm("Do you really want to destroy all resources?")? {
        println!("{}", "Destroy cancelled.".yellow());
        return Ok(());
    }

    println!("{}", "Destroying resources...".red().bold());
    println!();

    let interpreter = Interpreter::new(provider);
    let mut success_count = 0;
    let mut failure_count = 0;

    for effect in &effects {
        match interpreter.execute_effect(effect).await {
            Ok(outcome) => {
                println!("  {} {}", "✓".green(), effect);
                success_count += 1;
                record_outcome(&mut state_file, &outcome);
            }
            Err(e) => {
                println!("  {} {} - {}", "✗".red(), effect, e);
                failure_count += 1;
            }
        }
        save_state(backend, &mut state_file).await?;
    }

    // Entries without an identifier never reached the provider
    let before = state_file.resources.len();
    state_file.resources.retain(|r| r.identifier.is_some());
    if state_file.resources.len() != before {
        save_state(backend, &mut state_file).await?;
    }

    println!();
    if failure_count == 0 {
        println!(
            "{}",
            format!("Destroy complete! {} resources destroyed.", success_count)
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Destroy failed. {} succeeded, {} failed.",
            success_count, failure_count
        ))
    }
}

async fn run_import(address: &str, domain_name: &str, file: &Path) -> Result<(), String> {
    let id = parse_address(address)?;
    let parsed = load_config_or_default(file)?;
    let backend = open_backend(&parsed).await?;
    let provider = get_provider(&parsed).await?;

    let lock = acquire_lock(backend.as_ref(), "import").await?;
    let result = import_locked(&id, domain_name, backend.as_ref(), &provider).await;
    release_lock(backend.as_ref(), &lock).await;
    result?;

    println!(
        "{} Imported {} as {}",
        "✓".green(),
        domain_name.bold(),
        id.to_string().bold()
    );
    if !parsed.resources.iter().any(|r| r.id == id) {
        println!(
            "  {}",
            format!(
                "{} is not declared in {}; the next apply will delete it.",
                id,
                file.display()
            )
            .yellow()
        );
    }
    Ok(())
}

async fn import_locked<P: Provider>(
    id: &ResourceId,
    domain_name: &str,
    backend: &dyn StateBackend,
    provider: &P,
) -> Result<(), String> {
    let mut state_file = read_state_file(backend).await?;
    if state_file.find_resource(&id.resource_type, &id.name).is_some() {
        return Err(format!("{} is already managed by Portico", id));
    }

    let state = provider
        .import(id, domain_name)
        .await
        .map_err(|e| e.to_string())?;
    state_file.apply_state(&state, PROVIDER_NAME);
    save_state(backend, &mut state_file).await
}

async fn run_refresh(file: &Path) -> Result<(), String> {
    let parsed = load_config_or_default(file)?;
    let backend = open_backend(&parsed).await?;
    let provider = get_provider(&parsed).await?;

    let lock = acquire_lock(backend.as_ref(), "refresh").await?;
    let result = refresh_locked(backend.as_ref(), provider).await;
    release_lock(backend.as_ref(), &lock).await;
    result
}

async fn refresh_locked<P: Provider>(backend: &dyn StateBackend, provider: P) -> Result<(), String> {
    let mut state_file = read_state_file(backend).await?;

    let mut plan = Plan::new();
    let mut removed = 0;
    for stored in state_file.resources.clone() {
        let id = stored.id();
        match stored.identifier {
            Some(identifier) => plan.add(Effect::Read { id, identifier }),
            // Never reached the provider
            None => {
                println!("  {} {} (never created)", "-".red(), id);
                state_file.remove_resource(&id.resource_type, &id.name);
                removed += 1;
            }
        }
    }

    let interpreter = Interpreter::new(provider).with_config(InterpreterConfig {
        continue_on_error: true,
    });
    let result = interpreter.apply(&plan).await;

    for (effect, outcome) in plan.effects().iter().zip(&result.outcomes) {
        let id = effect.resource_id();
        match outcome {
            Ok(EffectOutcome::Read { state }) if state.exists => {
                println!("  {} {}", "✓".green(), id);
            }
            Ok(_) => {
                println!("  {} {} (no longer exists)", "-".red(), id);
                removed += 1;
            }
            Err(e) => println!("  {} {} - {}", "✗".red(), id, e),
        }
        if let Ok(outcome) = outcome {
            record_outcome(&mut state_file, outcome);
        }
    }
    save_state(backend, &mut state_file).await?;

    println!();
    if !result.is_success() {
        return Err(format!(
            "Refresh failed for {} resource(s); their state was left unchanged.",
            result.failure_count
        ));
    }
    println!(
        "{}",
        format!(
            "Refresh complete! {} resources in state, {} removed.",
            state_file.resources.len(),
            removed
        )
        .green()
        .bold()
    );
    Ok(())
}

async fn run_state_list(file: &Path) -> Result<(), String> {
    let parsed = load_config_or_default(file)?;
    let backend = open_backend(&parsed).await?;
    let state_file = read_state_file(backend.as_ref()).await?;

    let mut addresses: Vec<_> = state_file
        .resources
        .iter()
        .map(|r| (r.address(), r.identifier.clone().unwrap_or_default()))
        .collect();
    addresses.sort();
    for (address, identifier) in addresses {
        println!("{}  {}", address, identifier.dimmed());
    }
    Ok(())
}

async fn run_state_show(address: &str, file: &Path) -> Result<(), String> {
    let id = parse_address(address)?;
    let parsed = load_config_or_default(file)?;
    let backend = open_backend(&parsed).await?;
    let state_file = read_state_file(backend.as_ref()).await?;

    let stored = state_file
        .find_resource(&id.resource_type, &id.name)
        .ok_or_else(|| format!("{} is not in state", id))?;

    println!("{}", stored.address().bold());
    println!("  provider   = {}", stored.provider);
    if let Some(identifier) = &stored.identifier {
        println!("  identifier = {}", identifier);
    }
    display::print_state_attributes(&stored.to_state().attributes);
    Ok(())
}

async fn run_force_unlock(lock_id: &str, file: &Path) -> Result<(), String> {
    let parsed = load_config_or_default(file)?;
    let backend = open_backend(&parsed).await?;
    backend
        .force_unlock(lock_id)
        .await
        .map_err(|e| format!("Failed to unlock: {}", e))?;
    println!("{} Lock {} released.", "✓".green(), lock_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_core::provider::{BoxFuture, ProviderResult};
    use portico_core::resource::Value;

    /// Provider that knows no domain names
    struct EmptyProvider;

    impl Provider for EmptyProvider {
        fn name(&self) -> &'static str {
            "empty"
        }

        fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
            vec![]
        }

        fn read(
            &self,
            id: &ResourceId,
            identifier: Option<&str>,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            let id = id.clone();
            let denied = identifier == Some("denied.example.com");
            Box::pin(async move {
                if denied {
                    Err(ProviderError::new("AccessDeniedException").for_resource(id))
                } else {
                    Ok(State::not_found(id))
                }
            })
        }

        fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            let id = resource.id.clone();
            Box::pin(async move { Err(ProviderError::new("create not supported").for_resource(id)) })
        }

        fn update(
            &self,
            id: &ResourceId,
            _identifier: &str,
            _from: &State,
            _to: &Resource,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            let id = id.clone();
            Box::pin(async move { Err(ProviderError::new("update not supported").for_resource(id)) })
        }

        fn delete(&self, _id: &ResourceId, _identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn existing(name: &str, domain: &str) -> State {
        State::existing(
            ResourceId::new(RESOURCE_TYPE, name),
            HashMap::from([("domain_name".to_string(), Value::String(domain.to_string()))]),
        )
        .with_identifier(domain)
    }

    #[test]
    fn parse_address_forms() {
        let expected = ResourceId::new("domain_name", "api");
        assert_eq!(parse_address("domain_name.api").unwrap(), expected);
        assert_eq!(parse_address("apigateway.domain_name.api").unwrap(), expected);
        assert_eq!(parse_address("api").unwrap(), expected);
        assert_eq!(
            parse_address("domain_name.api.example.com").unwrap(),
            ResourceId::new("domain_name", "api.example.com")
        );
        assert!(parse_address("domain_name.").is_err());
    }

    #[test]
    fn load_config_validates_and_normalizes() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("main.prt");
        fs::write(
            &file,
            r#"
            let api = apigateway.domain_name {
                domain_name = "http-api.example.com"
                domain_name_configuration {
                    certificate_arn = "arn:aws:acm:us-west-2:123456789012:certificate/abc"
                    endpoint_type   = EndpointType.REGIONAL
                    security_policy = "TLS_1_2"
                }
            }
            "#,
        )
        .unwrap();

        let parsed = load_config(&file).unwrap();
        let config = &parsed.resources[0].attributes["domain_name_configuration"];
        let Value::List(blocks) = config else {
            panic!("expected a block list");
        };
        assert_eq!(
            blocks[0].as_map().unwrap().get("endpoint_type"),
            Some(&Value::String("REGIONAL".to_string()))
        );
    }

    #[test]
    fn load_config_reports_every_invalid_field() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("main.prt");
        fs::write(
            &file,
            r#"
            let api = apigateway.domain_name {
                domain_name = ""
                domain_name_configuration {
                    certificate_arn = "not-an-arn"
                    endpoint_type   = "EDGE"
                    security_policy = "TLS_1_2"
                }
            }
            "#,
        )
        .unwrap();

        let err = load_config(&file).unwrap_err();
        assert!(err.contains("domain_name.api: domain_name"));
        assert!(err.contains("certificate_arn"));
        assert!(err.contains("endpoint_type"));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let resource = Resource::new(RESOURCE_TYPE, "api")
            .with_attribute("_provider", Value::String("aws".to_string()));
        let err = validate_resources(&[resource]).unwrap_err();
        assert!(err.contains("unknown provider 'aws'"));
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let parsed = load_config_or_default(Path::new("/nonexistent/main.prt")).unwrap();
        assert!(parsed.resources.is_empty());
        assert!(parsed.backend.is_none());
    }

    #[test]
    fn apply_lock_covers_every_wait() {
        let plain = Resource::new(RESOURCE_TYPE, "api");
        let slow = Resource::new(RESOURCE_TYPE, "slow").with_attribute(
            "timeouts",
            Value::List(vec![Value::Map(HashMap::from([(
                "create".to_string(),
                Value::String("2h".to_string()),
            )]))]),
        );

        assert_eq!(apply_lock_timeout_secs(&[]), DEFAULT_LOCK_TIMEOUT_SECS);
        assert_eq!(
            apply_lock_timeout_secs(std::slice::from_ref(&plain)),
            DEFAULT_LOCK_TIMEOUT_SECS + 3600
        );
        assert_eq!(
            apply_lock_timeout_secs(&[plain, slow]),
            DEFAULT_LOCK_TIMEOUT_SECS + 3600 + 7200
        );
    }

    #[test]
    fn outcomes_update_state() {
        let mut state_file = StateFile::new();
        record_outcome(
            &mut state_file,
            &EffectOutcome::Created {
                state: existing("api", "api.example.com"),
            },
        );
        assert!(state_file.find_by_address("domain_name.api").is_some());

        record_outcome(
            &mut state_file,
            &EffectOutcome::Deleted {
                id: ResourceId::new(RESOURCE_TYPE, "api"),
            },
        );
        assert!(state_file.resources.is_empty());
    }

    #[tokio::test]
    async fn timeout_failure_saves_last_known_state() {
        let mut state_file = StateFile::new();
        let resource = Resource::new(RESOURCE_TYPE, "api");
        let error = ProviderError::timeout("Timed out")
            .with_state(existing("api", "api.example.com"));

        record_failure(&mut state_file, &EmptyProvider, &Effect::Create(resource), &error).await;

        let stored = state_file.find_by_address("domain_name.api").unwrap();
        assert_eq!(stored.identifier.as_deref(), Some("api.example.com"));
    }

    #[tokio::test]
    async fn failed_replace_drops_deleted_resource() {
        let mut state_file = StateFile::new();
        let old = existing("api", "old.example.com");
        state_file.apply_state(&old, PROVIDER_NAME);

        let effect = Effect::Replace {
            id: old.id.clone(),
            from: old.clone(),
            to: Resource::new(RESOURCE_TYPE, "api"),
            changed_attributes: vec!["domain_name".to_string()],
        };
        let error = ProviderError::new("create not supported");

        record_failure(&mut state_file, &EmptyProvider, &effect, &error).await;
        assert!(state_file.resources.is_empty());
    }

    #[tokio::test]
    async fn import_rejects_managed_address() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::with_path(dir.path().join("portico.state.json"));
        let mut state_file = StateFile::new();
        state_file.apply_state(&existing("api", "api.example.com"), PROVIDER_NAME);
        save_state(&backend, &mut state_file).await.unwrap();

        let id = ResourceId::new(RESOURCE_TYPE, "api");
        let err = import_locked(&id, "api.example.com", &backend, &EmptyProvider)
            .await
            .unwrap_err();
        assert!(err.contains("already managed"));
    }

    #[tokio::test]
    async fn refresh_drops_vanished_resources() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::with_path(dir.path().join("portico.state.json"));
        let mut state_file = StateFile::new();
        state_file.apply_state(&existing("api", "api.example.com"), PROVIDER_NAME);
        save_state(&backend, &mut state_file).await.unwrap();

        refresh_locked(&backend, EmptyProvider).await.unwrap();

        let state_file = read_state_file(&backend).await.unwrap();
        assert!(state_file.resources.is_empty());
        assert_eq!(state_file.serial, 2);
    }

    #[tokio::test]
    async fn refresh_keeps_resources_it_cannot_read() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::with_path(dir.path().join("portico.state.json"));
        let mut state_file = StateFile::new();
        state_file.apply_state(&existing("denied", "denied.example.com"), PROVIDER_NAME);
        state_file.apply_state(&existing("api", "api.example.com"), PROVIDER_NAME);
        save_state(&backend, &mut state_file).await.unwrap();

        let err = refresh_locked(&backend, EmptyProvider).await.unwrap_err();
        assert!(err.contains("1 resource"));

        let state_file = read_state_file(&backend).await.unwrap();
        assert_eq!(state_file.resources.len(), 1);
        assert!(state_file.find_by_address("domain_name.denied").is_some());
    }
}
