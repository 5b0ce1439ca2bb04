//! Build command handlers
//!
//! Stores definitions for later by-reference runs and shows build status.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use conduit_client::ServerClient;
use conduit_core::dto::build::{BuildRecord, StoreDefinition};
use serde_json::Value as JsonValue;

use super::output::colorize_execution_status;
use crate::config::Config;

/// Build subcommands
#[derive(Subcommand)]
pub enum BuildCommands {
    /// Store a definition under a build key
    Store {
        /// Customer (account) ID
        customer: String,

        /// Pipeline name
        pipeline: String,

        /// Build version
        version: String,

        /// Path to the definition file (JSON)
        #[arg(short, long)]
        file: String,

        /// Path to a stage selections file (JSON)
        #[arg(short, long)]
        selections: Option<String>,

        /// Author recorded on the build
        #[arg(long)]
        created_by: Option<String>,
    },
    /// Get build status
    Get {
        /// Customer (account) ID
        customer: String,

        /// Pipeline name
        pipeline: String,

        /// Build version
        version: String,
    },
}

/// Handle build commands
pub async fn handle_build_command(command: BuildCommands, config: &Config) -> Result<()> {
    let client = ServerClient::new(&config.server_url);

    match command {
        BuildCommands::Store {
            customer,
            pipeline,
            version,
            file,
            selections,
            created_by,
        } => {
            let definition_text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read definition file: {}", file))?;

            let stages_state = match selections {
                Some(path) => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read selections file: {}", path))?;
                    let value: JsonValue = serde_json::from_str(&text)
                        .with_context(|| format!("Selections file is not JSON: {}", path))?;
                    Some(value)
                }
                None => None,
            };

            let req = StoreDefinition {
                definition_text,
                stages_state,
                created_by,
                pipeline_id: None,
                build_job_id: None,
            };

            client
                .store_definition(&customer, &pipeline, &version, &req)
                .await
                .context("Failed to store definition")?;

            println!("{}", "✓ Definition stored".green().bold());
            println!("  Build: {}/{}/{}", customer, pipeline.bold(), version.cyan());
            Ok(())
        }
        BuildCommands::Get {
            customer,
            pipeline,
            version,
        } => {
            let record = client
                .get_build(&customer, &pipeline, &version)
                .await
                .context("Failed to fetch build")?;
            print_build(&record);
            Ok(())
        }
    }
}

/// Print detailed build information
fn print_build(record: &BuildRecord) {
    println!("{}", "Build Details:".bold());
    println!(
        "  Build:     {}/{}/{}",
        record.customer_id,
        record.pipeline_name.bold(),
        record.build_version.cyan()
    );
    match record.status {
        Some(status) => println!("  Status:    {}", colorize_execution_status(status)),
        None => println!("  Status:    {}", "never run".dimmed()),
    }
    if let Some(execution_id) = &record.execution_id {
        println!("  Execution: {}", execution_id.dimmed());
    }
    if let Some(started) = record.started_at {
        println!("  Started:   {}", started.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(completed) = record.completed_at {
        println!("  Completed: {}", completed.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(author) = &record.created_by {
        println!("  Author:    {}", author);
    }
    if let Some(error) = &record.error_message {
        println!("\n{}", "Error:".bold());
        println!("{}", error.red());
    }
}
