//! # apex-cli
//!
//! Operator command line for the Apex constraint kernel.
//!
//! Agents never use this tool; it is for the humans who fund, release and
//! audit them:
//! - `apex state show/transition` — inspect or move the system state
//! - `apex budget allocate/show` — fund agents and inspect their spend
//! - `apex immune ...` — quarantine, release, terminate, checkpoints
//! - `apex events tail/verify` — read and verify the provenance log
//! - `apex actions pending/show` — find actions that never finished

mod commands;

use std::path::{Path, PathBuf};

use anyhow::Context;
use apex_kernel::ApexConfig;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Apex constraint kernel — operator tools.
#[derive(Parser)]
#[command(name = "apex", version, about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or change the system state.
    State {
        #[command(subcommand)]
        command: commands::state::StateCommands,
    },
    /// Allocate and inspect agent budgets.
    Budget {
        #[command(subcommand)]
        command: commands::budget::BudgetCommands,
    },
    /// Quarantine, release and terminate agents; manage checkpoints.
    Immune {
        #[command(subcommand)]
        command: commands::immune::ImmuneCommands,
    },
    /// Read and verify the event log.
    Events {
        #[command(subcommand)]
        command: commands::events::EventsCommands,
    },
    /// Inspect actuator actions.
    Actions {
        #[command(subcommand)]
        command: commands::actions::ActionsCommands,
    },
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output on stdout stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("apex_kernel=info".parse()?)
                .add_directive("apex_arbiter=info".parse()?)
                .add_directive("apex_immune=info".parse()?)
                .add_directive("apex_metabolism=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let project_root = resolve_project_root(&cli.project_root)?;
    let config = ApexConfig::load(&project_root)?;
    tracing::debug!(
        project_root = %project_root.display(),
        database = %config.database.display(),
        "config loaded"
    );

    match &cli.command {
        Commands::State { command } => commands::state::execute(command, &config),
        Commands::Budget { command } => commands::budget::execute(command, &config),
        Commands::Immune { command } => commands::immune::execute(command, &config),
        Commands::Events { command } => commands::events::execute(command, &config),
        Commands::Actions { command } => commands::actions::execute(command, &config),
    }
}

/// The project root must already exist; a mistyped path would otherwise get
/// a fresh, empty database.
fn resolve_project_root(path: &Path) -> anyhow::Result<PathBuf> {
    let root = path
        .canonicalize()
        .with_context(|| format!("project root {} does not exist", path.display()))?;
    anyhow::ensure!(root.is_dir(), "project root {} is not a directory", root.display());
    Ok(root)
}
