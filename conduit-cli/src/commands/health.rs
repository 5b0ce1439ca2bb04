//! Health command handlers

use anyhow::{Context, Result};
use colored::*;
use conduit_client::ServerClient;

use super::output::print_breakers;
use crate::config::Config;

/// Check server health
pub async fn check_health(config: &Config) -> Result<()> {
    let client = ServerClient::new(&config.server_url);
    let health = client
        .health()
        .await
        .with_context(|| format!("Server at {} is not reachable", config.server_url))?;

    let status = health["status"].as_str().unwrap_or("unknown");
    if status == "ok" {
        println!("{} {}", "✓".green(), config.server_url);
    } else {
        println!("{} {} ({})", "✗".red(), config.server_url, status);
    }
    Ok(())
}

/// Show circuit breaker state
pub async fn show_breakers(config: &Config) -> Result<()> {
    let client = ServerClient::new(&config.server_url);
    let breakers = client
        .breakers()
        .await
        .context("Failed to fetch breaker metrics")?;

    if breakers.is_empty() {
        println!("{}", "No breakers reported.".yellow());
        return Ok(());
    }

    println!("{}", "Circuit Breakers:".bold());
    print_breakers(&breakers);
    Ok(())
}
