//! Stage dispatcher
//!
//! Per stage: skip rules, approval gating, auth resolution, then the
//! handler for the stage kind under a timeout. Always produces a terminal
//! [`StageResult`]; handler errors become FAILED here.

mod handlers;

pub use handlers::{CodeHandler, DeployHandler, NoopHandler, PlanHandler, artifact_collection};

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use conduit_core::domain::auth::ConnectorAuth;
use conduit_core::domain::execution::{StageResult, StageStatus};
use conduit_core::domain::pipeline::{Stage, StageKind, ToolConfig};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{EngineError, MAX_MESSAGE_LEN, Result, truncate};
use crate::resilience::Resilience;
use crate::resolver::CredentialResolver;
use crate::tools::ToolSet;

/// Everything a handler may look at for one stage
#[derive(Debug)]
pub struct StageContext<'a> {
    pub execution_id: &'a str,
    pub node_id: &'a str,
    pub account_id: &'a str,
    pub stage: &'a Stage,
    pub tool_config: Option<&'a ToolConfig>,
    pub auth: Option<&'a ConnectorAuth>,
}

/// Type-specific stage work
///
/// Returns optional result data. Data must never contain secrets.
#[async_trait]
pub trait StageHandler: Send + Sync {
    async fn handle(&self, ctx: &StageContext<'_>) -> Result<Option<Value>>;
}

/// One handler per dispatchable stage kind
#[derive(Clone)]
pub struct HandlerTable {
    pub plan: Arc<dyn StageHandler>,
    pub code: Arc<dyn StageHandler>,
    pub build: Arc<dyn StageHandler>,
    pub deploy: Arc<dyn StageHandler>,
    pub release: Arc<dyn StageHandler>,
    pub test: Arc<dyn StageHandler>,
    pub other: Arc<dyn StageHandler>,
}

impl HandlerTable {
    /// Handlers backed by the given tool clients
    pub fn standard(tools: &ToolSet, resilience: Resilience, source_control_api_url: &str) -> Self {
        Self {
            plan: Arc::new(PlanHandler::new(tools.issue_tracker.clone(), resilience.clone())),
            code: Arc::new(CodeHandler::new(
                tools.source_control.clone(),
                resilience.clone(),
                source_control_api_url,
            )),
            build: Arc::new(NoopHandler::new("build")),
            deploy: Arc::new(DeployHandler::new(tools.integration.clone(), resilience)),
            release: Arc::new(NoopHandler::new("release")),
            test: Arc::new(NoopHandler::new("test")),
            other: Arc::new(NoopHandler::new("other")),
        }
    }

    /// Approval stages never reach a handler
    fn handler_for(&self, kind: &StageKind) -> Option<&dyn StageHandler> {
        match kind {
            StageKind::Plan => Some(self.plan.as_ref()),
            StageKind::Code => Some(self.code.as_ref()),
            StageKind::Build => Some(self.build.as_ref()),
            StageKind::Deploy => Some(self.deploy.as_ref()),
            StageKind::Release => Some(self.release.as_ref()),
            StageKind::Test => Some(self.test.as_ref()),
            StageKind::Approval => None,
            StageKind::Other(_) => Some(self.other.as_ref()),
        }
    }
}

pub struct StageDispatcher {
    resolver: Arc<CredentialResolver>,
    handlers: HandlerTable,
    stage_timeout: Duration,
}

impl StageDispatcher {
    pub fn new(resolver: Arc<CredentialResolver>, handlers: HandlerTable, stage_timeout: Duration) -> Self {
        Self {
            resolver,
            handlers,
            stage_timeout,
        }
    }

    /// Run one stage to a terminal result
    ///
    /// Skip rules apply first, then approval gating; neither makes an
    /// external call.
    pub async fn execute_stage(
        &self,
        execution_id: &str,
        node_id: &str,
        stage: &Stage,
        approver_emails: &[String],
        account_id: &str,
    ) -> StageResult {
        if let Some(result) = gate(stage, approver_emails) {
            info!(
                execution_id,
                node_id,
                stage_id = %stage.id,
                stage_type = %stage.kind,
                status = %result.status,
                reason = result.message.as_deref().unwrap_or_default(),
                "Stage not dispatched"
            );
            return result;
        }

        let Some(handler) = self.handlers.handler_for(&stage.kind) else {
            return StageResult::failed(format!("no handler for stage type '{}'", stage.kind), 0);
        };

        let resolved = self.resolver.resolve_auth(stage, account_id).await;

        info!(
            execution_id,
            node_id,
            stage_id = %stage.id,
            stage_type = %stage.kind,
            auth_source = resolved.source.as_str(),
            "Stage started"
        );

        let ctx = StageContext {
            execution_id,
            node_id,
            account_id,
            stage,
            tool_config: resolved.tool_config.as_ref(),
            auth: resolved.auth.as_ref(),
        };

        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.stage_timeout, handler.handle(&ctx)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::timeout(
                format!("stage '{}'", stage.id),
                self.stage_timeout,
            )),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(data) => {
                info!(
                    execution_id,
                    node_id,
                    stage_id = %stage.id,
                    status = %StageStatus::Success,
                    duration_ms,
                    "Stage finished"
                );
                StageResult::success(duration_ms, data)
            }
            Err(e) => {
                let message = truncate(&e.to_string(), MAX_MESSAGE_LEN);
                warn!(
                    execution_id,
                    node_id,
                    stage_id = %stage.id,
                    status = %StageStatus::Failed,
                    duration_ms,
                    error = %message,
                    "Stage finished"
                );
                StageResult::failed(message, duration_ms)
            }
        }
    }
}

/// Skip rules and approval gating, in precedence order
fn gate(stage: &Stage, approver_emails: &[String]) -> Option<StageResult> {
    if !stage.execution_enabled {
        return Some(StageResult::skipped("execution disabled"));
    }

    if stage.tool_id.is_some() && !stage.tool_selected {
        return Some(StageResult::skipped("tool not selected"));
    }

    if stage.kind == StageKind::Approval {
        let approvers = approver_emails.iter().filter(|e| !e.trim().is_empty()).count();
        if approvers == 0 {
            return Some(StageResult::skipped("no approvers configured"));
        }
        return Some(StageResult::waiting_approval(approvers));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingTools, FakeStore, fast_resilience};
    use conduit_core::domain::pipeline::ConnectorConfig;

    fn stage(kind: StageKind) -> Stage {
        Stage {
            id: "s1".to_string(),
            kind,
            name: "stage".to_string(),
            tool_id: None,
            tool_config: None,
            execution_enabled: true,
            tool_selected: true,
            credential_id: None,
        }
    }

    fn dispatcher(tools: &CountingTools, timeout: Duration) -> StageDispatcher {
        let resilience = fast_resilience();
        let store = std::sync::Arc::new(FakeStore::default());
        let resolver = Arc::new(CredentialResolver::new(&store.collaborators(), resilience.clone()));
        let handlers = HandlerTable::standard(&tools.tool_set(), resilience, "https://api.github.com");
        StageDispatcher::new(resolver, handlers, timeout)
    }

    #[test]
    fn test_skip_precedence() {
        let mut s = stage(StageKind::Approval);
        s.execution_enabled = false;
        s.tool_id = Some("jira".to_string());
        s.tool_selected = false;
        let approvers = vec!["lead@acme.io".to_string()];

        assert_eq!(
            gate(&s, &approvers).unwrap().message.as_deref(),
            Some("execution disabled")
        );

        s.execution_enabled = true;
        assert_eq!(
            gate(&s, &approvers).unwrap().message.as_deref(),
            Some("tool not selected")
        );

        s.tool_selected = true;
        assert_eq!(gate(&s, &approvers).unwrap().status, StageStatus::WaitingApproval);
    }

    #[test]
    fn test_tool_not_selected_requires_tool_id() {
        let mut s = stage(StageKind::Build);
        s.tool_selected = false;
        assert!(gate(&s, &[]).is_none());
    }

    #[tokio::test]
    async fn test_approval_gating_makes_no_external_calls() {
        let tools = CountingTools::default();
        let dispatcher = dispatcher(&tools, Duration::from_secs(5));
        let s = stage(StageKind::Approval);

        let waiting = dispatcher
            .execute_stage("e1", "n1", &s, &["lead@acme.io".to_string()], "acct")
            .await;
        assert_eq!(waiting.status, StageStatus::WaitingApproval);

        let skipped = dispatcher.execute_stage("e1", "n1", &s, &[], "acct").await;
        assert_eq!(skipped.status, StageStatus::Skipped);
        assert_eq!(skipped.message.as_deref(), Some("no approvers configured"));

        assert_eq!(tools.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_code_stage_with_embedded_token_succeeds_after_two_calls() {
        let tools = CountingTools::default();
        let dispatcher = dispatcher(&tools, Duration::from_secs(5));

        let mut s = stage(StageKind::Code);
        s.tool_config = Some(ToolConfig {
            tool_type: "github".to_string(),
            connector: Some(ConnectorConfig {
                url: "https://github.com".to_string(),
                repo_url: Some("https://github.com/acme/widgets.git".to_string()),
                authentication: Some(ConnectorAuth::bearer("ghp_secret")),
                ..Default::default()
            }),
            ..Default::default()
        });

        let result = dispatcher.execute_stage("e1", "n1", &s, &[], "acct").await;

        assert_eq!(result.status, StageStatus::Success, "{:?}", result.message);
        assert!(result.duration_ms.is_some());
        assert_eq!(tools.source_control_calls(), 2);
        assert_eq!(tools.total_calls(), 2);

        let data = result.data.unwrap().to_string();
        assert!(data.contains("acme/widgets"));
        assert!(data.contains("main"));
        assert!(!data.contains("ghp_secret"));
    }

    #[tokio::test]
    async fn test_plan_stage_without_auth_fails() {
        let tools = CountingTools::default();
        let dispatcher = dispatcher(&tools, Duration::from_secs(5));

        let mut s = stage(StageKind::Plan);
        s.tool_config = Some(ToolConfig {
            connector: Some(ConnectorConfig {
                url: "https://acme.atlassian.net".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        });

        let result = dispatcher.execute_stage("e1", "n1", &s, &[], "acct").await;

        assert_eq!(result.status, StageStatus::Failed);
        assert!(result.message.unwrap().contains("Missing credentials"));
        assert_eq!(tools.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_handler_timeout_fails_stage() {
        let tools = CountingTools::default().with_delay(Duration::from_millis(200));
        let dispatcher = dispatcher(&tools, Duration::from_millis(20));

        let mut s = stage(StageKind::Plan);
        s.tool_config = Some(ToolConfig {
            connector: Some(ConnectorConfig {
                url: "https://acme.atlassian.net".to_string(),
                authentication: Some(ConnectorAuth::bearer("t")),
                ..Default::default()
            }),
            ..Default::default()
        });

        let result = dispatcher.execute_stage("e1", "n1", &s, &[], "acct").await;

        assert_eq!(result.status, StageStatus::Failed);
        assert!(result.message.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_placeholder_kinds_succeed() {
        let tools = CountingTools::default();
        let dispatcher = dispatcher(&tools, Duration::from_secs(5));

        for kind in [
            StageKind::Build,
            StageKind::Release,
            StageKind::Test,
            StageKind::Other("security-scan".to_string()),
        ] {
            let result = dispatcher.execute_stage("e1", "n1", &stage(kind), &[], "acct").await;
            assert_eq!(result.status, StageStatus::Success);
        }
        assert_eq!(tools.total_calls(), 0);
    }
}
