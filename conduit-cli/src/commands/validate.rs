//! Validate command
//!
//! Parses a definition locally with the engine's parser, without a server.

use anyhow::{Context, Result};
use colored::*;
use conduit_core::domain::pipeline::PipelineDefinition;
use conduit_engine::orchestrator::NodeGraph;
use conduit_engine::parser;

/// Validate a definition file and print its execution order
pub fn validate_file(path: &str) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read definition file: {}", path))?;

    let (definition, levels) = execution_order(&text)?;

    println!("{}", "✓ Definition is valid".green().bold());
    println!("  Name:   {}", definition.name.bold());
    println!("  Nodes:  {}", definition.nodes.len().to_string().cyan());
    println!("  Edges:  {}", definition.edges.len().to_string().cyan());

    println!("\n{}", "Execution order:".bold());
    for (i, level) in levels.iter().enumerate() {
        println!("  {} {}", format!("{}.", i + 1).dimmed(), level.join(", "));
    }

    println!("\n{}", "Stages:".bold());
    for node in &definition.nodes {
        println!("  {} {}", "▸".cyan(), node.id.bold());
        if node.stages.is_empty() {
            println!("    {}", "(no stages)".dimmed());
        }
        for stage in &node.stages {
            let flag = if !stage.execution_enabled {
                " (disabled)".yellow()
            } else {
                "".normal()
            };
            println!(
                "    - {} {}{}",
                stage.id,
                format!("[{}]", stage.kind).dimmed(),
                flag
            );
        }
    }

    Ok(())
}

/// Parse `text` and group node ids into execution levels
fn execution_order(text: &str) -> Result<(PipelineDefinition, Vec<Vec<String>>)> {
    let definition = parser::parse(text).context("Definition does not parse")?;
    let graph = NodeGraph::build(&definition).context("Definition graph is invalid")?;

    let levels = graph
        .levels()
        .iter()
        .map(|level| {
            level
                .iter()
                .map(|&i| definition.nodes[i].id.clone())
                .collect()
        })
        .collect();

    Ok((definition, levels))
}
