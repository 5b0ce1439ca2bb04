//! Shared display helpers

use colored::*;
use conduit_core::domain::breaker::{BreakerSnapshot, BreakerState};
use conduit_core::domain::execution::{ExecutionStatus, StageStatus};
use conduit_core::dto::run::{NodeStatus, RunOutcome, RunStatus};

/// Print a run outcome with every node and stage
pub fn print_outcome(outcome: &RunOutcome) {
    println!("{}", "Run Outcome:".bold());
    println!(
        "  Execution: {}",
        outcome.execution_id.as_deref().unwrap_or("-").cyan()
    );
    println!("  Status:    {}", colorize_run_status(outcome.status));

    if let Some(failure) = &outcome.failure {
        println!(
            "  Failed in: {} {}",
            failure.phase.to_string().bold(),
            failure.message.red()
        );
    }

    for node in &outcome.nodes {
        println!("\n  {} {} {}", "▸".cyan(), node.node_id.bold(), colorize_node_status(node.status));
        for stage in &node.stages {
            match &stage.result {
                Some(result) => {
                    let duration = result
                        .duration_ms
                        .map(|ms| format!(" {}ms", ms))
                        .unwrap_or_default();
                    println!(
                        "    - {} {}{}",
                        stage.stage_id,
                        colorize_stage_status(result.status),
                        duration.dimmed()
                    );
                    if let Some(message) = &result.message {
                        println!("      {}", message.dimmed());
                    }
                }
                None => println!("    - {} {}", stage.stage_id, "NOT_RUN".dimmed()),
            }
        }
    }

    if !outcome.diagnostics.is_empty() {
        println!("\n{}", "Diagnostics:".bold());
        for diagnostic in &outcome.diagnostics {
            println!("  {} {}", "⚠".yellow(), diagnostic);
        }
    }
}

/// Print one line per breaker
pub fn print_breakers(breakers: &[BreakerSnapshot]) {
    for b in breakers {
        println!(
            "  {:<22} {:<10} failures {}/{}",
            b.name,
            colorize_breaker_state(b.state),
            b.failure_count,
            b.threshold
        );
    }
}

pub fn colorize_run_status(status: RunStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        RunStatus::Success => status_str.green(),
        RunStatus::Failed => status_str.red(),
        RunStatus::WaitingApproval => status_str.yellow(),
    }
}

pub fn colorize_execution_status(status: ExecutionStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        ExecutionStatus::Running => status_str.cyan(),
        ExecutionStatus::Success => status_str.green(),
        ExecutionStatus::Failed => status_str.red(),
    }
}

fn colorize_node_status(status: NodeStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        NodeStatus::Completed => status_str.green(),
        NodeStatus::Failed => status_str.red(),
        NodeStatus::WaitingApproval => status_str.yellow(),
        NodeStatus::NotRun => status_str.dimmed(),
    }
}

fn colorize_stage_status(status: StageStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        StageStatus::Success => status_str.green(),
        StageStatus::Failed => status_str.red(),
        StageStatus::Skipped => status_str.dimmed(),
        StageStatus::WaitingApproval => status_str.yellow(),
    }
}

fn colorize_breaker_state(state: BreakerState) -> ColoredString {
    let state_str = state.to_string();
    match state {
        BreakerState::Closed => state_str.green(),
        BreakerState::HalfOpen => state_str.yellow(),
        BreakerState::Open => state_str.red(),
    }
}
