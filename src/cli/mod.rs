//! Command-line interface for the `semaphoreui` binary.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, StateCommands};
pub use output::{OutputFormatter, SENSITIVE};
