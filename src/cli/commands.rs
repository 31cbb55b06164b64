//! CLI command definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::resource::{Action, ResourceKind};

/// Dockhand - declarative Docker resource reconciliation.
#[derive(Parser, Debug)]
#[command(name = "dockhand")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "DOCKHAND_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter configuration.
    Init {
        /// Directory to initialize.
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the configuration.
    Validate {
        /// Print warnings as well as errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Show what apply would change.
    Plan {
        /// Print field-level changes.
        #[arg(short, long)]
        detailed: bool,
    },

    /// Converge Dockhand towards the configuration.
    Apply {
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Keep going after a failed action.
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Re-read every managed object and report drift.
    Refresh,

    /// Delete every managed object.
    Destroy {
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Run a lifecycle action on a managed object.
    Action {
        /// Resource address, e.g. `container.web`.
        address: String,

        /// Action to run (start, stop, restart, pause, unpause).
        action: Action,
    },

    /// List objects known to Dockhand, managed or not.
    Inventory {
        /// Kind to list; all environment-scoped kinds when omitted.
        kind: Option<ResourceKind>,

        /// Environment to list from.
        #[arg(short, long, default_value = "")]
        environment: String,
    },

    /// Probe the Dockhand API.
    Health {
        /// Poll until healthy, for at most this many seconds.
        #[arg(long)]
        wait: Option<u64>,
    },

    /// Inspect or edit the state file.
    State {
        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// State management subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Show the state summary.
    Show,

    /// List recorded addresses.
    List,

    /// Forget a record without touching the remote object.
    Rm {
        /// Resource address.
        address: String,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_action_command() {
        let cli = Cli::try_parse_from(["dockhand", "action", "container.web", "restart"])
            .expect("parse");

        match cli.command {
            Commands::Action { address, action } => {
                assert_eq!(address, "container.web");
                assert_eq!(action, Action::Restart);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_inventory_kind() {
        let cli = Cli::try_parse_from([
            "dockhand",
            "--output",
            "json",
            "inventory",
            "compose-stacks",
            "-e",
            "3",
        ])
        .expect("parse");

        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::Inventory { kind, environment } => {
                assert_eq!(kind, Some(ResourceKind::ComposeStack));
                assert_eq!(environment, "3");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        assert!(Cli::try_parse_from(["dockhand", "action", "container.web", "explode"]).is_err());
    }
}
