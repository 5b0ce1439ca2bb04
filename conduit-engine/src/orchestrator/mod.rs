//! Execution orchestrator
//!
//! Drives one run from invocation to [`RunOutcome`]:
//! - Direct: the caller supplies the parsed pipeline
//! - By reference: fetch, parse and re-resolve a stored definition first
//!
//! Status writes (execution records, build records) are best-effort. Their
//! failures are reported in `RunOutcome::diagnostics` and never change the
//! run's status.

mod graph;

pub use graph::{NodeGraph, Predecessor};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use conduit_core::domain::execution::{ExecutionRecord, ExecutionStatus, RunPhase, StageStatus};
use conduit_core::domain::pipeline::{Node, PipelineDefinition};
use conduit_core::dto::build::{BuildStatusUpdate, StoredDefinition};
use conduit_core::dto::invocation::{DirectInvocation, Invocation, ReferenceInvocation};
use conduit_core::dto::run::{
    NodeOutcome, NodeStatus, RunFailure, RunOutcome, RunStatus, StageOutcome,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::dispatcher::{HandlerTable, StageDispatcher};
use crate::error::{EngineError, Result};
use crate::parser;
use crate::repository::{
    BuildStatusRepository, Collaborators, DefinitionRepository, ExecutionRepository,
};
use crate::resilience::{Dependency, Resilience};
use crate::resolver::CredentialResolver;

pub struct Orchestrator {
    definitions: Arc<dyn DefinitionRepository>,
    builds: Arc<dyn BuildStatusRepository>,
    executions: Arc<dyn ExecutionRepository>,
    resolver: Arc<CredentialResolver>,
    dispatcher: StageDispatcher,
    resilience: Resilience,
}

/// Where a run ended up after traversal
struct Settled {
    status: RunStatus,
    nodes: Vec<NodeOutcome>,
    /// Run-level failure, e.g. a cyclic graph
    failure: Option<RunFailure>,
    /// Message written to status records when the run failed
    error_message: Option<String>,
}

impl Settled {
    fn from_traversal(result: Result<Vec<NodeOutcome>>) -> Self {
        match result {
            Ok(nodes) => {
                let status = run_status(&nodes);
                let error_message = first_stage_failure(&nodes);
                Self {
                    status,
                    nodes,
                    failure: None,
                    error_message,
                }
            }
            Err(e) => {
                let message = e.to_string();
                Self {
                    status: RunStatus::Failed,
                    nodes: Vec::new(),
                    failure: Some(RunFailure {
                        phase: RunPhase::Execute,
                        message: message.clone(),
                    }),
                    error_message: Some(message),
                }
            }
        }
    }
}

/// FAILED if any node failed, else WAITING_APPROVAL if any node waits
fn run_status(nodes: &[NodeOutcome]) -> RunStatus {
    if nodes.iter().any(|n| n.status == NodeStatus::Failed) {
        RunStatus::Failed
    } else if nodes.iter().any(|n| n.status == NodeStatus::WaitingApproval) {
        RunStatus::WaitingApproval
    } else {
        RunStatus::Success
    }
}

fn first_stage_failure(nodes: &[NodeOutcome]) -> Option<String> {
    nodes.iter().find_map(|node| {
        node.stages.iter().find_map(|s| match &s.result {
            Some(r) if r.status == StageStatus::Failed => Some(format!(
                "stage '{}' in node '{}' failed: {}",
                s.stage_id,
                node.node_id,
                r.message.as_deref().unwrap_or("unknown error")
            )),
            _ => None,
        })
    })
}

impl Orchestrator {
    pub fn new(
        collaborators: Collaborators,
        handlers: HandlerTable,
        resilience: Resilience,
        stage_timeout: Duration,
    ) -> Self {
        let resolver = Arc::new(CredentialResolver::new(&collaborators, resilience.clone()));
        let dispatcher = StageDispatcher::new(resolver.clone(), handlers, stage_timeout);

        Self {
            definitions: collaborators.definitions,
            builds: collaborators.builds,
            executions: collaborators.executions,
            resolver,
            dispatcher,
            resilience,
        }
    }

    pub fn resilience(&self) -> &Resilience {
        &self.resilience
    }

    /// Run either invocation shape
    pub async fn run(&self, invocation: Invocation) -> RunOutcome {
        match invocation {
            Invocation::Direct(direct) => self.run_direct(*direct).await,
            Invocation::ByReference(reference) => self.run_by_reference(reference).await,
        }
    }

    /// Run an already-parsed pipeline
    pub async fn run_direct(&self, invocation: DirectInvocation) -> RunOutcome {
        let DirectInvocation {
            execution_id,
            account_id,
            parsed_pipeline,
            approver_emails,
            pipeline_name,
            ..
        } = invocation;
        let mut diagnostics = Vec::new();

        info!(
            execution_id = %execution_id,
            account_id = %account_id,
            pipeline = pipeline_name.as_deref().unwrap_or(&parsed_pipeline.name),
            nodes = parsed_pipeline.nodes.len(),
            "Starting direct run"
        );

        let mut record = ExecutionRecord {
            execution_id: execution_id.clone(),
            account_id: account_id.clone(),
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
        };
        best_effort(
            &mut diagnostics,
            "record execution start",
            self.record_execution(&record),
        )
        .await;

        let settled = Settled::from_traversal(
            self.traverse(&execution_id, &account_id, &parsed_pipeline, &approver_emails)
                .await,
        );

        // Waiting runs stay RUNNING; there is no resumption yet
        let terminal = match settled.status {
            RunStatus::Success => Some(ExecutionStatus::Success),
            RunStatus::Failed => Some(ExecutionStatus::Failed),
            RunStatus::WaitingApproval => None,
        };
        if let Some(terminal) = terminal.filter(|t| record.status.can_transition_to(*t)) {
            record.status = terminal;
            record.completed_at = Some(Utc::now());
            record.error_message = settled.error_message.clone();
            best_effort(
                &mut diagnostics,
                "record execution result",
                self.record_execution(&record),
            )
            .await;
        }

        self.finish(Some(execution_id), settled, diagnostics)
    }

    /// Run a stored definition
    ///
    /// Fetch and validation failures make no build-status write. Later
    /// failures mark the build FAILED.
    pub async fn run_by_reference(&self, invocation: ReferenceInvocation) -> RunOutcome {
        let customer_id = invocation.customer_id.as_str();
        let mut diagnostics = Vec::new();

        info!(
            customer_id,
            pipeline = %invocation.pipeline_name,
            build_version = %invocation.build_version,
            "Starting by-reference run"
        );

        let stored = match self.fetch_stored(&invocation).await {
            Ok(stored) => stored,
            Err(e) => {
                error!(customer_id, error = %e, "Failed to load stored definition");
                return self.fail_early(RunPhase::Fetch, e, diagnostics);
            }
        };

        let Some(text) = stored
            .definition_text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
        else {
            let e = EngineError::InvalidDefinition(format!(
                "build {}/{}/{} has no definition text",
                customer_id, invocation.pipeline_name, invocation.build_version
            ));
            warn!(customer_id, error = %e, "Stored definition is empty");
            return self.fail_early(RunPhase::Fetch, e, diagnostics);
        };

        let definition = match parser::parse(text) {
            Ok(definition) => definition,
            Err(e) => {
                let e = EngineError::from(e);
                warn!(customer_id, error = %e, "Stored definition does not parse");
                let update = BuildStatusUpdate {
                    status: ExecutionStatus::Failed,
                    execution_id: None,
                    error_message: Some(e.to_string()),
                    started_at: None,
                    completed_at: Some(Utc::now()),
                };
                best_effort(
                    &mut diagnostics,
                    "update build status",
                    self.update_build(&invocation, &update),
                )
                .await;
                return self.fail_early(RunPhase::Parse, e, diagnostics);
            }
        };

        let (selections, warnings) = stored.selections();
        for warning in warnings {
            warn!(customer_id, %warning, "Stored stage selections are malformed");
            diagnostics.push(warning);
        }
        let (definition, report) = self
            .resolver
            .resolve_credentials_for_pipeline(definition, customer_id, &selections)
            .await;
        if !report.unresolved.is_empty() {
            diagnostics.push(format!(
                "credentials not resolved for: {}",
                report.unresolved.join(", ")
            ));
        }

        let execution_id = Uuid::new_v4().to_string();
        best_effort(
            &mut diagnostics,
            "update build status",
            self.update_build(&invocation, &BuildStatusUpdate::running(&execution_id)),
        )
        .await;

        let settled = Settled::from_traversal(
            self.traverse(
                &execution_id,
                customer_id,
                &definition,
                &selections.approver_emails,
            )
            .await,
        );

        if settled.status != RunStatus::WaitingApproval {
            let update = BuildStatusUpdate::finished(&execution_id, settled.error_message.clone());
            best_effort(
                &mut diagnostics,
                "update build status",
                self.update_build(&invocation, &update),
            )
            .await;
        }

        self.finish(Some(execution_id), settled, diagnostics)
    }

    async fn fetch_stored(&self, invocation: &ReferenceInvocation) -> Result<StoredDefinition> {
        let definitions = &self.definitions;
        let stored = self
            .resilience
            .call(Dependency::Store, "fetch_stored_definition", || {
                definitions.fetch_stored_definition(
                    &invocation.customer_id,
                    &invocation.pipeline_name,
                    &invocation.build_version,
                )
            })
            .await?;

        stored.ok_or_else(|| {
            EngineError::NotFound(format!(
                "no stored definition for {}/{}/{}",
                invocation.customer_id, invocation.pipeline_name, invocation.build_version
            ))
        })
    }

    async fn update_build(
        &self,
        invocation: &ReferenceInvocation,
        update: &BuildStatusUpdate,
    ) -> Result<()> {
        let builds = &self.builds;
        self.resilience
            .call(Dependency::Store, "update_build_status", || {
                builds.update_build_status(
                    &invocation.customer_id,
                    &invocation.pipeline_name,
                    &invocation.build_version,
                    update,
                )
            })
            .await
    }

    async fn record_execution(&self, record: &ExecutionRecord) -> Result<()> {
        let executions = &self.executions;
        self.resilience
            .call(Dependency::Store, "record_execution", || {
                executions.record_execution(record)
            })
            .await
    }

    /// Walk the graph level by level, nodes in definition order
    ///
    /// A node runs only when every predecessor completed, unless the edge
    /// allows continuing past a failure.
    async fn traverse(
        &self,
        execution_id: &str,
        account_id: &str,
        definition: &PipelineDefinition,
        approver_emails: &[String],
    ) -> Result<Vec<NodeOutcome>> {
        let graph = NodeGraph::build(definition)?;
        let mut outcomes: Vec<Option<NodeOutcome>> = vec![None; definition.nodes.len()];

        for level in graph.levels() {
            for &index in level {
                let node = &definition.nodes[index];

                let blocked_by = graph.predecessors(index).iter().find(|p| {
                    let status = outcomes[p.node].as_ref().map(|o| o.status);
                    !p.continue_on_failure && status != Some(NodeStatus::Completed)
                });

                let outcome = match blocked_by {
                    Some(blocker) => {
                        info!(
                            execution_id,
                            node_id = %node.id,
                            blocked_by = %definition.nodes[blocker.node].id,
                            "Node not run"
                        );
                        not_run(node)
                    }
                    None => {
                        self.run_node(execution_id, account_id, node, approver_emails)
                            .await
                    }
                };

                outcomes[index] = Some(outcome);
            }
        }

        Ok(outcomes.into_iter().flatten().collect())
    }

    /// Stages in order; FAILED or WAITING_APPROVAL halts the rest
    async fn run_node(
        &self,
        execution_id: &str,
        account_id: &str,
        node: &Node,
        approver_emails: &[String],
    ) -> NodeOutcome {
        let mut stages = Vec::with_capacity(node.stages.len());
        let mut status = NodeStatus::Completed;

        for stage in &node.stages {
            if status != NodeStatus::Completed {
                stages.push(StageOutcome {
                    stage_id: stage.id.clone(),
                    result: None,
                });
                continue;
            }

            let result = self
                .dispatcher
                .execute_stage(execution_id, &node.id, stage, approver_emails, account_id)
                .await;

            status = match result.status {
                StageStatus::Failed => NodeStatus::Failed,
                StageStatus::WaitingApproval => NodeStatus::WaitingApproval,
                StageStatus::Success | StageStatus::Skipped => NodeStatus::Completed,
            };

            stages.push(StageOutcome {
                stage_id: stage.id.clone(),
                result: Some(result),
            });
        }

        NodeOutcome {
            node_id: node.id.clone(),
            status,
            stages,
        }
    }

    fn fail_early(&self, phase: RunPhase, error: EngineError, diagnostics: Vec<String>) -> RunOutcome {
        let mut outcome = RunOutcome::failed(None, phase, error.to_string());
        outcome.diagnostics = diagnostics;
        outcome.breakers = self.resilience.emit_metrics();
        outcome
    }

    /// Assemble the outcome and emit breaker metrics
    fn finish(
        &self,
        execution_id: Option<String>,
        settled: Settled,
        diagnostics: Vec<String>,
    ) -> RunOutcome {
        info!(
            execution_id = execution_id.as_deref().unwrap_or_default(),
            status = %settled.status,
            nodes = settled.nodes.len(),
            diagnostics = diagnostics.len(),
            "Run finished"
        );

        RunOutcome {
            execution_id,
            status: settled.status,
            nodes: settled.nodes,
            failure: settled.failure,
            breakers: self.resilience.emit_metrics(),
            diagnostics,
        }
    }
}

fn not_run(node: &Node) -> NodeOutcome {
    NodeOutcome {
        node_id: node.id.clone(),
        status: NodeStatus::NotRun,
        stages: node
            .stages
            .iter()
            .map(|s| StageOutcome {
                stage_id: s.id.clone(),
                result: None,
            })
            .collect(),
    }
}

/// Await a status write, turning failure into a diagnostic
async fn best_effort(
    diagnostics: &mut Vec<String>,
    what: &str,
    write: impl Future<Output = Result<()>>,
) {
    if let Err(e) = write.await {
        warn!(error = %e, "Best-effort {} failed", what);
        diagnostics.push(format!("{} failed: {}", what, e));
    }
}
