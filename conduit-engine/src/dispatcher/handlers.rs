//! Stage handlers
//!
//! Each handler validates what it needs from the stage, then makes its
//! external calls through the resilience layer.

use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::domain::auth::ConnectorAuth;
use conduit_core::domain::pipeline::{ArtifactDescriptor, ToolConfig};
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{StageContext, StageHandler};
use crate::error::{EngineError, Result};
use crate::resilience::{Dependency, Resilience};
use crate::tools::{HttpAuth, IntegrationPlatform, IssueTracker, SourceControl};

const ISSUE_KEY_INPUTS: &[&str] = &["issueKey", "issue_key", "jiraKey"];
const REPOSITORY_INPUTS: &[&str] = &["repository", "repo", "repoUrl"];
const DEFAULT_BRANCH: &str = "main";

/// Design-time collection holding artifacts of `artifact_type`
pub fn artifact_collection(artifact_type: &str) -> Option<&'static str> {
    match artifact_type.trim() {
        "IntegrationFlow" => Some("IntegrationDesigntimeArtifacts"),
        "ValueMapping" => Some("ValueMappingDesigntimeArtifacts"),
        "MessageMapping" => Some("MessageMappingDesigntimeArtifacts"),
        "ScriptCollection" | "GroovyScript" => Some("ScriptCollectionDesigntimeArtifacts"),
        "MessageResource" => Some("MessageResourcesDesigntimeArtifacts"),
        _ => None,
    }
}

fn config<'a>(ctx: &'a StageContext<'_>) -> Result<&'a ToolConfig> {
    ctx.tool_config.ok_or_else(|| {
        EngineError::InvalidDefinition(format!(
            "{} stage '{}' has no tool configuration",
            ctx.stage.kind, ctx.stage.id
        ))
    })
}

fn require_auth<'a>(ctx: &'a StageContext<'_>) -> Result<&'a ConnectorAuth> {
    ctx.auth.ok_or_else(|| {
        EngineError::MissingCredentials(format!(
            "{} stage '{}' has no resolved credentials",
            ctx.stage.kind, ctx.stage.id
        ))
    })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

// =============================================================================
// Plan
// =============================================================================

/// Reads an issue, or the caller's own identity, from the issue tracker
pub struct PlanHandler {
    tracker: Arc<dyn IssueTracker>,
    resilience: Resilience,
}

impl PlanHandler {
    pub fn new(tracker: Arc<dyn IssueTracker>, resilience: Resilience) -> Self {
        Self { tracker, resilience }
    }

    fn http_auth(ctx: &StageContext<'_>) -> Result<HttpAuth> {
        let auth = require_auth(ctx)?;

        if let Some(token) = non_blank(auth.token.as_deref()) {
            return Ok(HttpAuth::Bearer(token.to_string()));
        }

        match (non_blank(auth.username.as_deref()), non_blank(auth.api_key.as_deref())) {
            (Some(username), Some(api_key)) => Ok(HttpAuth::Basic {
                username: username.to_string(),
                password: api_key.to_string(),
            }),
            _ => Err(EngineError::MissingCredentials(format!(
                "plan stage '{}' needs a token or a username and API key",
                ctx.stage.id
            ))),
        }
    }
}

#[async_trait]
impl StageHandler for PlanHandler {
    async fn handle(&self, ctx: &StageContext<'_>) -> Result<Option<Value>> {
        let config = config(ctx)?;
        let auth = Self::http_auth(ctx)?;

        let base_url = config
            .connector
            .as_ref()
            .and_then(|c| non_blank(Some(c.url.as_str())))
            .ok_or_else(|| {
                EngineError::InvalidDefinition(format!(
                    "plan stage '{}' has no issue tracker URL",
                    ctx.stage.id
                ))
            })?;

        let tracker = &self.tracker;
        let auth = &auth;

        match config.input_str(ISSUE_KEY_INPUTS) {
            Some(key) => {
                let issue = self
                    .resilience
                    .call(Dependency::IssueTracker, "fetch_issue", || {
                        tracker.fetch_issue(base_url, auth, key)
                    })
                    .await?;

                let fields = &issue["fields"];
                let status = fields["status"]["name"].as_str().unwrap_or("unknown");
                let issue_type = fields["issuetype"]["name"].as_str().unwrap_or("unknown");
                let summary = fields["summary"].as_str().unwrap_or_default();

                info!(
                    execution_id = ctx.execution_id,
                    stage_id = %ctx.stage.id,
                    issue_key = key,
                    status,
                    issue_type,
                    summary,
                    "Fetched issue"
                );

                Ok(Some(json!({
                    "issueKey": key,
                    "status": status,
                    "issueType": issue_type,
                    "summary": summary,
                })))
            }
            None => {
                let me = self
                    .resilience
                    .call(Dependency::IssueTracker, "fetch_myself", || {
                        tracker.fetch_myself(base_url, auth)
                    })
                    .await?;

                let display_name = me["displayName"].as_str().unwrap_or_default();
                info!(
                    execution_id = ctx.execution_id,
                    stage_id = %ctx.stage.id,
                    display_name,
                    "Verified issue tracker identity"
                );

                Ok(Some(json!({ "displayName": display_name })))
            }
        }
    }
}

// =============================================================================
// Code
// =============================================================================

/// Reads repository and branch metadata from source control
pub struct CodeHandler {
    source_control: Arc<dyn SourceControl>,
    resilience: Resilience,
    api_url: String,
}

impl CodeHandler {
    pub fn new(
        source_control: Arc<dyn SourceControl>,
        resilience: Resilience,
        api_url: impl Into<String>,
    ) -> Self {
        Self {
            source_control,
            resilience,
            api_url: api_url.into(),
        }
    }
}

/// Owner and repository name from a repository URL or `owner/repo`
///
/// Accepts `https://host/owner/repo(.git)`, `git@host:owner/repo.git` and
/// bare `owner/repo`.
pub(crate) fn parse_repository(raw: &str) -> Option<(String, String)> {
    let trimmed = raw.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);

    let path = if let Some((_, rest)) = trimmed.split_once("://") {
        rest.split_once('/').map(|(_, path)| path)?
    } else if let Some((_, path)) = trimmed.strip_prefix("git@").and_then(|r| r.split_once(':')) {
        path
    } else {
        trimmed
    };

    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let owner = segments.next()?;
    let repo = segments.next()?;
    Some((owner.to_string(), repo.to_string()))
}

#[async_trait]
impl StageHandler for CodeHandler {
    async fn handle(&self, ctx: &StageContext<'_>) -> Result<Option<Value>> {
        let config = config(ctx)?;
        let auth = require_auth(ctx)?;

        let token = non_blank(auth.token.as_deref())
            .or_else(|| non_blank(auth.api_key.as_deref()))
            .ok_or_else(|| {
                EngineError::MissingCredentials(format!(
                    "code stage '{}' needs a token",
                    ctx.stage.id
                ))
            })?;
        let auth = &HttpAuth::Bearer(token.to_string());

        let connector = config.connector.as_ref();
        let (owner, repo) = connector
            .and_then(|c| c.repo_url.as_deref())
            .or_else(|| config.input_str(REPOSITORY_INPUTS))
            .or_else(|| connector.map(|c| c.url.as_str()))
            .and_then(parse_repository)
            .ok_or_else(|| {
                EngineError::InvalidDefinition(format!(
                    "code stage '{}' has no repository",
                    ctx.stage.id
                ))
            })?;

        let branch = non_blank(connector.and_then(|c| c.branch.as_deref()))
            .or_else(|| config.input_str(&["branch"]))
            .unwrap_or(DEFAULT_BRANCH);

        let (owner, repo) = (owner.as_str(), repo.as_str());
        let api_url = self.api_url.as_str();
        let source_control = &self.source_control;

        let repository = self
            .resilience
            .call(Dependency::SourceControl, "fetch_repository", || {
                source_control.fetch_repository(api_url, auth, owner, repo)
            })
            .await?;

        let branch_info = self
            .resilience
            .call(Dependency::SourceControl, "fetch_branch", || {
                source_control.fetch_branch(api_url, auth, owner, repo, branch)
            })
            .await?;

        let full_name = repository["full_name"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}/{}", owner, repo));
        let commit = branch_info["commit"]["sha"].as_str().unwrap_or_default();

        info!(
            execution_id = ctx.execution_id,
            stage_id = %ctx.stage.id,
            repository = %full_name,
            branch,
            commit,
            "Verified repository and branch"
        );

        Ok(Some(json!({
            "repository": full_name,
            "defaultBranch": repository["default_branch"],
            "branch": branch,
            "commit": commit,
        })))
    }
}

// =============================================================================
// Deploy
// =============================================================================

/// Authenticates against the integration platform and downloads artifacts
pub struct DeployHandler {
    integration: Arc<dyn IntegrationPlatform>,
    resilience: Resilience,
}

impl DeployHandler {
    pub fn new(integration: Arc<dyn IntegrationPlatform>, resilience: Resilience) -> Self {
        Self {
            integration,
            resilience,
        }
    }
}

#[async_trait]
impl StageHandler for DeployHandler {
    async fn handle(&self, ctx: &StageContext<'_>) -> Result<Option<Value>> {
        let config = config(ctx)?;
        let auth = require_auth(ctx)?;

        let api_url = config
            .environment
            .as_ref()
            .and_then(|e| non_blank(Some(e.api_url.as_str())))
            .ok_or_else(|| {
                EngineError::InvalidDefinition(format!(
                    "deploy stage '{}' has no environment API URL",
                    ctx.stage.id
                ))
            })?;

        let (client_id, client_secret, token_url) = match (
            non_blank(auth.client_id.as_deref()),
            non_blank(auth.client_secret.as_deref()),
            non_blank(auth.token_url.as_deref()),
        ) {
            (Some(id), Some(secret), Some(url)) => (id, secret, url),
            _ => {
                return Err(EngineError::MissingCredentials(format!(
                    "deploy stage '{}' needs client id, client secret and token URL",
                    ctx.stage.id
                )));
            }
        };

        // Reject unknown types before any download starts
        let planned: Vec<(&ArtifactDescriptor, &'static str)> = config
            .artifacts
            .iter()
            .map(|a| {
                artifact_collection(&a.artifact_type)
                    .map(|collection| (a, collection))
                    .ok_or_else(|| EngineError::UnsupportedArtifactType(a.artifact_type.clone()))
            })
            .collect::<Result<_>>()?;

        let integration = &self.integration;
        let token = self
            .resilience
            .call(Dependency::IntegrationPlatform, "fetch_token", || {
                integration.fetch_token(token_url, client_id, client_secret)
            })
            .await?;
        let token = token.as_str();

        if planned.is_empty() {
            self.resilience
                .call(Dependency::IntegrationPlatform, "probe", || {
                    integration.probe(api_url, token)
                })
                .await?;

            info!(
                execution_id = ctx.execution_id,
                stage_id = %ctx.stage.id,
                "Integration platform reachable, no artifacts to deploy"
            );
            return Ok(Some(json!({ "artifacts": [], "probe": "ok" })));
        }

        let mut downloaded = Vec::with_capacity(planned.len());
        for (artifact, collection) in planned {
            let (id, version) = (artifact.id.as_str(), artifact.version.as_str());
            let content = self
                .resilience
                .call(Dependency::IntegrationPlatform, "download_artifact", || {
                    integration.download_artifact(api_url, token, collection, id, version)
                })
                .await?;

            debug!(
                execution_id = ctx.execution_id,
                artifact_id = id,
                collection,
                bytes = content.len(),
                "Downloaded artifact"
            );

            downloaded.push(json!({
                "id": id,
                "name": artifact.name,
                "type": artifact.artifact_type,
                "version": version,
                "bytes": content.len(),
            }));
        }

        info!(
            execution_id = ctx.execution_id,
            stage_id = %ctx.stage.id,
            artifacts = downloaded.len(),
            "Downloaded deploy artifacts"
        );

        Ok(Some(json!({ "artifacts": downloaded })))
    }
}

// =============================================================================
// Placeholders
// =============================================================================

/// Succeeds without external calls
pub struct NoopHandler {
    kind: &'static str,
}

impl NoopHandler {
    pub fn new(kind: &'static str) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl StageHandler for NoopHandler {
    async fn handle(&self, ctx: &StageContext<'_>) -> Result<Option<Value>> {
        debug!(
            execution_id = ctx.execution_id,
            stage_id = %ctx.stage.id,
            handler = self.kind,
            "No-op stage"
        );
        Ok(None)
    }
}
