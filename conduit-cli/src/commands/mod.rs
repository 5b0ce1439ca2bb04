//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod build;
mod health;
mod output;
mod run;
mod validate;

pub use build::BuildCommands;
pub use run::RunCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Parse a definition file locally and show its execution order
    Validate {
        /// Path to the definition file (JSON)
        file: String,
    },
    /// Run a pipeline on the server
    Run {
        #[command(subcommand)]
        command: RunCommands,
    },
    /// Stored build management
    Build {
        #[command(subcommand)]
        command: BuildCommands,
    },
    /// Show circuit breaker state on the server
    Breakers,
    /// Check that the server is reachable
    Health,
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Validate { file } => validate::validate_file(&file),
        Commands::Run { command } => run::handle_run_command(command, config).await,
        Commands::Build { command } => build::handle_build_command(command, config).await,
        Commands::Breakers => health::show_breakers(config).await,
        Commands::Health => health::check_health(config).await,
    }
}
