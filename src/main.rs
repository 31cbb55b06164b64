//! Dockhand CLI entrypoint.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use dockhand_reconcile::cli::{Cli, Commands, OutputFormatter, StateCommands};
use dockhand_reconcile::config::{
    ConfigHasher, ConfigParser, ConfigValidator, DockhandConfig, find_config_file,
};
use dockhand_reconcile::error::{ConfigError, DockhandError, Result};
use dockhand_reconcile::gateway::{DockhandClient, HealthChecker, Inventory};
use dockhand_reconcile::planner::{DeploymentPlan, DiffEngine, ExecutionResult, PlanExecutor};
use dockhand_reconcile::reconciler::Reconciler;
use dockhand_reconcile::resource::{Action, ResourceKind};
use dockhand_reconcile::state::{
    HistoryEntry, LocalStateStore, StateFile, StateOperation, StateStore,
};

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Interval between health probes when waiting, in seconds.
const HEALTH_POLL_SECS: u64 = 2;

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

/// Initializes logging on stderr; `RUST_LOG` wins unless `--verbose` is set.
fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

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

async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Validate { warnings } => cmd_validate(config_path, warnings, &formatter),
        Commands::Plan { detailed } => cmd_plan(config_path, detailed, &formatter).await,
        Commands::Apply {
            yes,
            continue_on_error,
        } => cmd_apply(config_path, yes, continue_on_error, &formatter).await,
        Commands::Refresh => cmd_refresh(config_path, &formatter).await,
        Commands::Destroy { yes } => cmd_destroy(config_path, yes, &formatter).await,
        Commands::Action { address, action } => {
            cmd_action(config_path, &address, action, &formatter).await
        }
        Commands::Inventory { kind, environment } => {
            cmd_inventory(config_path, kind, &environment, &formatter).await
        }
        Commands::Health { wait } => cmd_health(config_path, wait, &formatter).await,
        Commands::State { command } => cmd_state(config_path, command, &formatter).await,
    }
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    info!("Initializing Dockhand project in {}", path.display());

    let config_path = path.join("dockhand.yaml");
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

    std::fs::write(&config_path, include_str!("../templates/dockhand.yaml"))?;
    eprintln!("Created: {}", config_path.display());

    std::fs::write(&env_path, include_str!("../templates/.env.example"))?;
    eprintln!("Created: {}", env_path.display());

    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        let missing: Vec<&str> = [".env", ".dockhand/"]
            .into_iter()
            .filter(|entry| !existing.lines().any(|line| line.trim() == *entry))
            .collect();
        if !missing.is_empty() {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&gitignore_path)?;
            writeln!(file, "\n# Dockhand")?;
            for entry in missing {
                writeln!(file, "{entry}")?;
            }
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, ".env\n.dockhand/\n")?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nNext steps:");
    eprintln!("  1. Copy .env.example to .env and set DOCKHAND_ENDPOINT and DOCKHAND_API_KEY");
    eprintln!("  2. Declare your resources in dockhand.yaml");
    eprintln!("  3. Run 'dockhand plan' to preview, then 'dockhand apply'");

    Ok(())
}

fn cmd_validate(
    config_path: Option<&Path>,
    warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, _) = load_config(config_path)?;
    let result = ConfigValidator::new().check(&config);

    emit(&formatter.format_validation(&result, warnings));
    if !result.errors.is_empty() {
        return Err(ConfigError::validation_general(format!(
            "{} error(s) found",
            result.errors.len()
        ))
        .into());
    }

    if !formatter.is_json() {
        eprintln!(
            "\n{} resource(s) declared against {}",
            config.resource_count(),
            config.provider.endpoint
        );
    }
    Ok(())
}

async fn cmd_plan(
    config_path: Option<&Path>,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let workspace = Workspace::load(config_path)?;
    let state = workspace.store.load_or_default().await?;
    let plan = workspace.plan(&state)?;

    emit(&formatter.format_plan(&plan, detailed));
    Ok(())
}

async fn cmd_apply(
    config_path: Option<&Path>,
    yes: bool,
    continue_on_error: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let workspace = Workspace::load(config_path)?;
    let mut state = workspace.store.load_or_default().await?;
    let plan = workspace.plan(&state)?;

    emit(&formatter.format_plan(&plan, false));
    // An empty plan still runs: unchanged records may need their hash updated.
    if !plan.is_empty() && !yes && !confirm("Apply this plan? [y/N]: ", "y")? {
        eprintln!("Apply cancelled.");
        return Ok(());
    }

    let reconciler = Reconciler::new(workspace.client()?);
    let result = PlanExecutor::new(&reconciler, &workspace.store)
        .with_continue_on_error(continue_on_error)
        .execute(&plan, &workspace.config, &mut state)
        .await?;

    finish(formatter, &result)
}

async fn cmd_refresh(config_path: Option<&Path>, formatter: &OutputFormatter) -> Result<()> {
    let workspace = Workspace::load(config_path)?;
    let mut state = workspace.store.load_or_default().await?;

    let reconciler = Reconciler::new(workspace.client()?);
    let result = PlanExecutor::new(&reconciler, &workspace.store)
        .refresh(&mut state)
        .await?;

    finish(formatter, &result)
}

async fn cmd_destroy(
    config_path: Option<&Path>,
    yes: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let workspace = Workspace::load(config_path)?;
    let mut state = workspace.store.load_or_default().await?;

    if state.records.is_empty() {
        emit(&formatter.message(true, "Nothing to destroy."));
        return Ok(());
    }

    let plan = DeploymentPlan::destroy(&state);
    emit(&formatter.format_plan(&plan, false));
    if !yes && !confirm("\nThis is irreversible. Type 'destroy' to confirm: ", "destroy")? {
        eprintln!("Destroy cancelled.");
        return Ok(());
    }

    let reconciler = Reconciler::new(workspace.client()?);
    let result = PlanExecutor::new(&reconciler, &workspace.store)
        .execute(&plan, &workspace.config, &mut state)
        .await?;

    finish(formatter, &result)
}

async fn cmd_action(
    config_path: Option<&Path>,
    address: &str,
    action: Action,
    formatter: &OutputFormatter,
) -> Result<()> {
    let workspace = Workspace::load(config_path)?;
    let mut state = workspace.store.load_or_default().await?;

    let reconciler = Reconciler::new(workspace.client()?);
    let record = PlanExecutor::new(&reconciler, &workspace.store)
        .run_action(address, action, &mut state)
        .await?;

    let message = match record {
        Some(_) => format!("{action} {address}"),
        None => format!("{action} {address}; the object no longer exists and was forgotten"),
    };
    emit(&formatter.message(true, &message));
    Ok(())
}

async fn cmd_inventory(
    config_path: Option<&Path>,
    kind: Option<ResourceKind>,
    environment_id: &str,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, _) = load_config(config_path)?;
    let inventory = Inventory::new(DockhandClient::new(&config.provider)?);

    let items = match kind {
        Some(kind) => inventory.list(kind, environment_id).await?,
        None => inventory.list_environment(environment_id).await?,
    };

    emit(&formatter.format_inventory(&items));
    Ok(())
}

async fn cmd_health(
    config_path: Option<&Path>,
    wait: Option<u64>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, _) = load_config(config_path)?;
    let checker = HealthChecker::new(&config.provider)?;

    let status = match wait {
        Some(timeout) => checker.wait_for_healthy(timeout, HEALTH_POLL_SECS).await?,
        None => checker.check().await,
    };

    emit(&formatter.format_health(&status));
    if status.healthy {
        Ok(())
    } else {
        Err(DockhandError::internal("Dockhand API is unhealthy"))
    }
}

async fn cmd_state(
    config_path: Option<&Path>,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<()> {
    let workspace = Workspace::load(config_path)?;

    let Some(mut state) = workspace.store.load().await? else {
        emit(&formatter.message(true, "No state found."));
        return Ok(());
    };

    match command {
        StateCommands::Show => emit(&formatter.format_state(&state)),
        StateCommands::List => emit(&formatter.format_addresses(&state)),
        StateCommands::Rm { address } => {
            if state.remove(&address).is_none() {
                return Err(ConfigError::UnknownAddress { address }.into());
            }
            state.add_history(HistoryEntry::new(
                StateOperation::Forget,
                vec![address.clone()],
            ));
            workspace.store.save(&state).await?;
            emit(&formatter.message(
                true,
                &format!("Removed {address} from state; the remote object was not touched"),
            ));
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Loaded configuration bound to its state store.
struct Workspace {
    config: DockhandConfig,
    store: LocalStateStore,
}

impl Workspace {
    fn load(config_path: Option<&Path>) -> Result<Self> {
        let (config, base_dir) = load_config(config_path)?;
        ConfigValidator::new().validate(&config)?;

        let store = LocalStateStore::with_state_path(base_dir.join(&config.state.path));
        debug!("Using state file {}", store.path().display());

        Ok(Self { config, store })
    }

    fn plan(&self, state: &StateFile) -> Result<DeploymentPlan> {
        let diff = DiffEngine::new().compute_diff(&self.config, state)?;
        let hash = ConfigHasher::new().hash_config(&self.config);
        Ok(DeploymentPlan::from_diff(&diff, &hash))
    }

    fn client(&self) -> Result<DockhandClient> {
        DockhandClient::new(&self.config.provider)
    }
}

/// Loads the configuration, returning it with the directory it lives in.
fn load_config(config_path: Option<&Path>) -> Result<(DockhandConfig, PathBuf)> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file(".")?,
    };
    debug!("Loading configuration from {}", config_file.display());

    let base_dir = config_file
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let config = ConfigParser::new()
        .with_base_path(&base_dir)
        .load_with_env(&config_file)?;

    Ok((config, base_dir))
}

/// Prints an execution result and fails the command if any action failed.
fn finish(formatter: &OutputFormatter, result: &ExecutionResult) -> Result<()> {
    emit(&formatter.format_execution(result));
    if result.success {
        Ok(())
    } else {
        Err(DockhandError::internal(format!(
            "{} action(s) failed",
            result.failed
        )))
    }
}

/// Asks for confirmation on stderr.
fn confirm(prompt: &str, expected: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case(expected))
}

/// Writes command output to stdout.
fn emit(output: &str) {
    let mut stdout = std::io::stdout().lock();
    let _ = stdout.write_all(output.as_bytes());
    if !output.ends_with('\n') {
        let _ = stdout.write_all(b"\n");
    }
}
