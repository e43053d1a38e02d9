//! CLI command definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// semaphoreui - Declarative Semaphore UI project environments.
#[derive(Parser, Debug)]
#[command(name = "semaphoreui")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "SEMAPHOREUI_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON.
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
        /// Directory to initialize (defaults to current directory).
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the configuration.
    Validate {
        /// Show warnings as well as errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Show the changes an apply would make.
    Plan,

    /// Apply configuration to the server.
    Apply {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Keep going after a failed change.
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Re-read every managed environment into state.
    Refresh,

    /// Adopt an existing environment.
    Import {
        /// Address to track the environment under.
        address: String,

        /// Identifier in the form `project/environment`, e.g. `1/12`.
        id: String,
    },

    /// Delete every managed environment.
    Destroy {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Compare configuration, state and server without changing anything.
    Drift,

    /// Inspect or repair state.
    State {
        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// State management subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Show current state.
    Show,

    /// Lock the state.
    Lock {
        /// Lock holder identifier.
        #[arg(long)]
        holder: Option<String>,
    },

    /// Unlock the state.
    Unlock {
        /// Lock ID to release.
        #[arg(long, required_unless_present = "force")]
        lock_id: Option<String>,

        /// Remove the lock whoever holds it.
        #[arg(long)]
        force: bool,
    },

    /// Stop managing an environment without deleting it.
    Rm {
        /// Address to forget.
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

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_import() {
        let cli = Cli::try_parse_from(["semaphoreui", "import", "staging", "1/12"]).unwrap();
        match cli.command {
            Commands::Import { address, id } => {
                assert_eq!(address, "staging");
                assert_eq!(id, "1/12");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["semaphoreui", "plan", "--output", "json", "--log-json"]).unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(cli.log_json);
    }

    #[test]
    fn test_unlock_requires_id_or_force() {
        assert!(Cli::try_parse_from(["semaphoreui", "state", "unlock"]).is_err());
        assert!(Cli::try_parse_from(["semaphoreui", "state", "unlock", "--force"]).is_ok());
    }
}
