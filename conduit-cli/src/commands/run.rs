//! Run command handlers
//!
//! Starts direct or by-reference runs on the server and prints the outcome.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use conduit_client::ServerClient;
use conduit_core::dto::invocation::{DirectInvocation, ReferenceInvocation};
use conduit_engine::parser;
use uuid::Uuid;

use super::output::print_outcome;
use crate::config::Config;

/// Run subcommands
#[derive(Subcommand)]
pub enum RunCommands {
    /// Parse a local definition and run it directly
    Direct {
        /// Path to the definition file (JSON)
        file: String,

        /// Account that owns the referenced credentials
        #[arg(short, long)]
        account: String,

        /// Execution ID (generated when omitted)
        #[arg(long)]
        execution_id: Option<String>,

        /// Approver emails (comma-separated)
        #[arg(long, value_delimiter = ',')]
        approvers: Vec<String>,
    },
    /// Run a stored build
    Reference {
        /// Customer (account) ID
        customer: String,

        /// Pipeline name
        pipeline: String,

        /// Build version
        version: String,
    },
}

/// Handle run commands
pub async fn handle_run_command(command: RunCommands, config: &Config) -> Result<()> {
    let client = ServerClient::new(&config.server_url);

    match command {
        RunCommands::Direct {
            file,
            account,
            execution_id,
            approvers,
        } => run_direct(&client, &file, account, execution_id, approvers).await,
        RunCommands::Reference {
            customer,
            pipeline,
            version,
        } => {
            let invocation = ReferenceInvocation {
                customer_id: customer,
                pipeline_name: pipeline,
                build_version: version,
            };
            let outcome = client
                .run_by_reference(&invocation)
                .await
                .context("Failed to start by-reference run")?;
            print_outcome(&outcome);
            Ok(())
        }
    }
}

/// Parse locally first so syntax errors never reach the server
async fn run_direct(
    client: &ServerClient,
    path: &str,
    account_id: String,
    execution_id: Option<String>,
    approver_emails: Vec<String>,
) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read definition file: {}", path))?;
    let parsed_pipeline = parser::parse(&text).context("Definition does not parse")?;

    let execution_id = execution_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    println!(
        "{} {} ({})",
        "Running".cyan(),
        parsed_pipeline.name.bold(),
        execution_id.dimmed()
    );

    let invocation = DirectInvocation {
        execution_id,
        account_id,
        pipeline_name: Some(parsed_pipeline.name.clone()),
        parsed_pipeline,
        is_customer: false,
        is_private: false,
        user_id: None,
        user_email: None,
        approver_emails,
        pipeline_id: None,
        build_job_id: None,
        branch: None,
    };

    let outcome = client
        .run_direct(&invocation)
        .await
        .context("Failed to start direct run")?;
    print_outcome(&outcome);

    Ok(())
}
