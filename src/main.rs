//! semaphoreui CLI entrypoint.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use semaphoreui_provider::cli::{Cli, Commands, OutputFormatter, StateCommands};
use semaphoreui_provider::config::{
    ConfigParser, ConfigValidator, SemaphoreConfig, find_config_file, process_env, resolve_provider,
};
use semaphoreui_provider::error::Result;
use semaphoreui_provider::planner::{DesiredEnvironment, EnvironmentPlan, desired_environments};
use semaphoreui_provider::reconciler::{Reconciler, forget, unlock};
use semaphoreui_provider::semaphore::{EnvironmentResource, SemaphoreClient};
use semaphoreui_provider::state::{LocalStateStore, STATE_DIR, StateStore};

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` overrides the level chosen by `--verbose`.
fn init_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Validate { warnings } => cmd_validate(config, warnings, &formatter),
        Commands::Plan => cmd_plan(config, &formatter).await,
        Commands::Apply {
            yes,
            continue_on_error,
        } => cmd_apply(config, yes, continue_on_error, &formatter).await,
        Commands::Refresh => cmd_refresh(config, &formatter).await,
        Commands::Import { address, id } => cmd_import(config, &address, &id, &formatter).await,
        Commands::Destroy { yes } => cmd_destroy(config, yes, &formatter).await,
        Commands::Drift => cmd_drift(config, &formatter).await,
        Commands::State { command } => cmd_state(config, command, &formatter).await,
    }
}

/// Write a starter configuration.
fn cmd_init(path: &Path, force: bool) -> Result<()> {
    info!("Initializing Semaphore UI configuration in: {}", path.display());

    let config_path = path.join("semaphoreui.yaml");
    let env_path = path.join(".env.example");
    let gitignore_path = path.join(".gitignore");

    if !force && config_path.exists() {
        eprintln!("Configuration file already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    std::fs::write(&config_path, include_str!("../templates/semaphoreui.yaml"))?;
    eprintln!("Created: {}", config_path.display());

    std::fs::write(&env_path, include_str!("../templates/.env.example"))?;
    eprintln!("Created: {}", env_path.display());

    let state_entry = format!("{STATE_DIR}/");
    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        let missing: Vec<&str> = [".env", state_entry.as_str()]
            .into_iter()
            .filter(|entry| !existing.lines().any(|line| line.trim() == *entry))
            .collect();
        if !missing.is_empty() {
            let mut file = std::fs::OpenOptions::new().append(true).open(&gitignore_path)?;
            writeln!(file, "\n# Semaphore UI provider")?;
            for entry in missing {
                writeln!(file, "{entry}")?;
            }
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, format!(".env\n{state_entry}\n"))?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nNext steps:");
    eprintln!("  1. Copy .env.example to .env and fill in the API token and secrets");
    eprintln!("  2. Edit semaphoreui.yaml with your project environments");
    eprintln!("  3. Run 'semaphoreui validate' to check the configuration");
    eprintln!("  4. Run 'semaphoreui plan' to preview changes");
    eprintln!("  5. Run 'semaphoreui apply' to apply them");

    Ok(())
}

/// Validate configuration.
fn cmd_validate(config_path: Option<&Path>, show_warnings: bool, formatter: &OutputFormatter) -> Result<()> {
    let (parser, config) = load_config(config_path)?;

    let result = ConfigValidator::new().check(&config);
    println!("{}", formatter.format_validation(&result, show_warnings));

    if !formatter.is_json() {
        eprintln!("Environments: {}", config.environments.len());
        eprintln!("State file: {}", parser.state_path(&config).display());
    }

    ConfigValidator::new().validate(&config)?;
    Ok(())
}

/// Show the plan.
async fn cmd_plan(config_path: Option<&Path>, formatter: &OutputFormatter) -> Result<()> {
    let ws = Workspace::open(config_path)?;
    let desired = ws.desired()?;
    let resource = ws.resource()?;

    let plan = Reconciler::new(&ws.store, &resource).plan(&desired).await?;
    println!("{}", formatter.format_plan(&plan));
    Ok(())
}

/// Apply the plan.
async fn cmd_apply(
    config_path: Option<&Path>,
    auto_approve: bool,
    continue_on_error: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let ws = Workspace::open(config_path)?;
    let desired = ws.desired()?;
    let resource = ws.resource()?;

    let report = Reconciler::new(&ws.store, &resource)
        .with_continue_on_error(continue_on_error)
        .apply_with(&desired, |plan| {
            confirm_plan(plan, formatter, auto_approve, "Do you want to apply this plan? [y/N]: ", "y")
        })
        .await?;

    println!("{}", formatter.format_apply(&report));
    report.into_result()?;
    Ok(())
}

/// Re-read managed environments.
async fn cmd_refresh(config_path: Option<&Path>, formatter: &OutputFormatter) -> Result<()> {
    let ws = Workspace::open(config_path)?;
    let resource = ws.resource()?;

    let report = Reconciler::new(&ws.store, &resource).refresh().await?;
    println!("{}", formatter.format_refresh(&report));
    Ok(())
}

/// Adopt an existing environment.
async fn cmd_import(
    config_path: Option<&Path>,
    address: &str,
    raw_id: &str,
    formatter: &OutputFormatter,
) -> Result<()> {
    let ws = Workspace::open(config_path)?;
    let resource = ws.resource()?;

    let record = Reconciler::new(&ws.store, &resource).import(address, raw_id).await?;
    println!("{}", formatter.format_record(address, &record));
    if !formatter.is_json() && ws.config.find_environment(address).is_none() {
        eprintln!("Add an environment with address '{address}' to the configuration to manage it.");
    }
    Ok(())
}

/// Delete every managed environment.
async fn cmd_destroy(config_path: Option<&Path>, auto_approve: bool, formatter: &OutputFormatter) -> Result<()> {
    let ws = Workspace::open(config_path)?;
    let resource = ws.resource()?;

    let report = Reconciler::new(&ws.store, &resource)
        .destroy_with(|plan| {
            confirm_plan(
                plan,
                formatter,
                auto_approve,
                "\nThis deletes the environments on the server. Type 'destroy' to confirm: ",
                "destroy",
            )
        })
        .await?;

    println!("{}", formatter.format_apply(&report));
    report.into_result()?;
    Ok(())
}

/// Check for drift.
async fn cmd_drift(config_path: Option<&Path>, formatter: &OutputFormatter) -> Result<()> {
    let ws = Workspace::open(config_path)?;
    let desired = ws.desired()?;
    let resource = ws.resource()?;

    let report = Reconciler::new(&ws.store, &resource).check_drift(&desired).await?;
    println!("{}", formatter.format_drift(&report));
    Ok(())
}

/// State management commands.
async fn cmd_state(config_path: Option<&Path>, command: StateCommands, formatter: &OutputFormatter) -> Result<()> {
    let ws = Workspace::open(config_path)?;

    match command {
        StateCommands::Show => {
            let lock = ws.store.get_lock_info().await?;
            match ws.store.load().await? {
                Some(state) => println!("{}", formatter.format_state(&state, lock.as_ref())),
                None => println!("{}", formatter.message("warning", "No state found.")),
            }
        }
        StateCommands::Lock { holder } => {
            let lock = ws
                .store
                .acquire_lock(holder.as_deref().unwrap_or(""), "manual")
                .await?;
            println!("{}", formatter.message("success", &format!("State locked: {}", lock.lock_id)));
        }
        StateCommands::Unlock { lock_id, force } => {
            if force {
                let message = match ws.store.force_unlock().await? {
                    Some(lock) => format!("Removed lock {lock}"),
                    None => String::from("State was not locked."),
                };
                println!("{}", formatter.message("success", &message));
            } else if let Some(id) = lock_id {
                let message = match unlock(&ws.store, &id).await? {
                    Some(_) => "State unlocked.",
                    None => "State was not locked.",
                };
                println!("{}", formatter.message("success", message));
            }
        }
        StateCommands::Rm { address } => {
            forget(&ws.store, &address).await?;
            println!(
                "{}",
                formatter.message("success", &format!("Removed {address} from state; the server was not changed."))
            );
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Loaded configuration plus the state store it points at.
struct Workspace {
    config: SemaphoreConfig,
    store: LocalStateStore,
}

impl Workspace {
    /// Loads and validates the configuration and opens its state store.
    fn open(config_path: Option<&Path>) -> Result<Self> {
        let (parser, config) = load_config(config_path)?;
        let validation = ConfigValidator::new().validate(&config)?;
        for warning in &validation.warnings {
            tracing::warn!("{warning}");
        }

        let store = LocalStateStore::with_state_path(parser.state_path(&config));
        debug!("Using {} state at {}", store.backend_type(), store.state_path().display());
        Ok(Self { config, store })
    }

    /// Resolves desired environments, reading secret values from the environment.
    fn desired(&self) -> Result<Vec<DesiredEnvironment>> {
        desired_environments(&self.config, process_env)
    }

    /// Builds the API-backed environment resource.
    fn resource(&self) -> Result<EnvironmentResource<SemaphoreClient>> {
        let provider = resolve_provider(&self.config.provider, process_env)?;
        debug!("Connecting to {}", provider.api_base_url);
        Ok(EnvironmentResource::new(SemaphoreClient::new(&provider)?))
    }
}

/// Finds, parses and returns the configuration, loading `.env` beside it.
fn load_config(config_path: Option<&Path>) -> Result<(ConfigParser, SemaphoreConfig)> {
    let config_file = config_path.map_or_else(|| find_config_file("."), |p| Ok(p.to_path_buf()))?;
    debug!("Loading configuration from: {}", config_file.display());

    let base = config_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let parser = ConfigParser::new().with_base_path(base);
    parser.load_dotenv()?;

    let config = parser.load_file(&config_file)?;
    Ok((parser, config))
}

/// Shows a plan and asks for confirmation unless `auto_approve` is set.
fn confirm_plan(
    plan: &EnvironmentPlan,
    formatter: &OutputFormatter,
    auto_approve: bool,
    prompt: &str,
    expected: &str,
) -> bool {
    if !formatter.is_json() {
        eprintln!("{}", formatter.format_plan(plan));
    }
    if auto_approve {
        return true;
    }

    eprint!("{prompt}");
    if std::io::stderr().flush().is_err() {
        return false;
    }

    let mut input = String::new();
    if std::io::stdin().read_line(&mut input).is_err() {
        return false;
    }
    input.trim().eq_ignore_ascii_case(expected)
}
