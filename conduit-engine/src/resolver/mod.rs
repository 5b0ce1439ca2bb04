//! Credential resolver
//!
//! Produces the authentication a stage handler runs with. Two entry points:
//! - [`CredentialResolver::resolve_auth`] per stage at dispatch time
//! - [`CredentialResolver::resolve_credentials_for_pipeline`] once per
//!   by-reference run, re-injecting secrets that stored definitions omit
//!
//! Resolution failures are never fatal here; the handler decides whether a
//! missing auth matters.

mod normalize;

pub use normalize::{lookup, normalize_credential};

use std::sync::Arc;

use conduit_core::domain::auth::{ConnectorAuth, Credential, Environment, EnvironmentConnector};
use conduit_core::domain::pipeline::{PipelineDefinition, Stage, StageKind, ToolConfig};
use conduit_core::dto::build::StageSelections;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::repository::{
    Collaborators, ConnectorRepository, CredentialRepository, EnvironmentRepository,
};
use crate::resilience::{Dependency, Resilience};

/// Connector names that identify a deploy target inside an environment
const DEPLOY_TOOL_NAMES: &[&str] = &["cloud integration", "cpi", "sap cpi", "integration suite"];

/// Where a stage's auth came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSource {
    Embedded,
    Credential,
    None,
}

impl AuthSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthSource::Embedded => "embedded",
            AuthSource::Credential => "credential",
            AuthSource::None => "none",
        }
    }
}

/// Outcome of per-stage auth resolution
#[derive(Debug, Clone)]
pub struct ResolvedAuth {
    pub auth: Option<ConnectorAuth>,
    pub credential: Option<Credential>,
    pub tool_config: Option<ToolConfig>,
    pub source: AuthSource,
}

/// Stage keys touched by pipeline-wide resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    pub resolved: Vec<String>,
    pub unresolved: Vec<String>,
}

/// Account records fetched at most once per pipeline resolution
#[derive(Default)]
struct AccountLookups {
    environments: Option<Vec<Environment>>,
    credentials: Option<Vec<Credential>>,
}

pub struct CredentialResolver {
    credentials: Arc<dyn CredentialRepository>,
    connectors: Arc<dyn ConnectorRepository>,
    environments: Arc<dyn EnvironmentRepository>,
    resilience: Resilience,
}

impl CredentialResolver {
    pub fn new(collaborators: &Collaborators, resilience: Resilience) -> Self {
        Self {
            credentials: collaborators.credentials.clone(),
            connectors: collaborators.connectors.clone(),
            environments: collaborators.environments.clone(),
            resilience,
        }
    }

    /// Resolve the auth for one stage
    ///
    /// First match wins: embedded auth, then the referenced credential, then
    /// none. A failed credential fetch is logged and treated as none.
    pub async fn resolve_auth(&self, stage: &Stage, account_id: &str) -> ResolvedAuth {
        let tool_config = stage.tool_config.clone();

        if let Some(auth) = tool_config.as_ref().and_then(|c| c.embedded_auth()) {
            debug!(stage_id = %stage.id, source = "embedded", "Resolved stage auth");
            return ResolvedAuth {
                auth: Some(auth.clone()),
                credential: None,
                tool_config,
                source: AuthSource::Embedded,
            };
        }

        if let Some(credential_id) = stage.credential_id.as_deref() {
            match self.fetch_credential(credential_id, account_id).await {
                Ok(credential) => {
                    debug!(stage_id = %stage.id, source = "credential", "Resolved stage auth");
                    return ResolvedAuth {
                        auth: Some(normalize_credential(&credential)),
                        credential: Some(credential),
                        tool_config,
                        source: AuthSource::Credential,
                    };
                }
                Err(e) => {
                    warn!(
                        stage_id = %stage.id,
                        credential_id,
                        error = %e,
                        "Failed to fetch referenced credential, continuing without auth"
                    );
                }
            }
        }

        ResolvedAuth {
            auth: None,
            credential: None,
            tool_config,
            source: AuthSource::None,
        }
    }

    /// Re-inject auth into a stored definition from the saved selections
    ///
    /// Selections are matched per stage by `"{node}__{stage}"`,
    /// `"{node}::{stage}"` and then `"{stage}"`. Every failure is logged and
    /// skipped.
    pub async fn resolve_credentials_for_pipeline(
        &self,
        mut definition: PipelineDefinition,
        account_id: &str,
        selections: &StageSelections,
    ) -> (PipelineDefinition, ResolutionReport) {
        let mut report = ResolutionReport::default();
        let mut lookups = AccountLookups::default();

        for node in &mut definition.nodes {
            for stage in &mut node.stages {
                let keys = candidate_keys(&node.id, &stage.id);
                let connector_id = first_match(&keys, &selections.selected_connectors);
                let environment_id = first_match(&keys, &selections.selected_environments);

                if connector_id.is_none() && environment_id.is_none() {
                    continue;
                }

                let resolved = match stage.kind {
                    StageKind::Plan | StageKind::Code => match connector_id {
                        Some(id) => self
                            .auth_from_connector(id, account_id)
                            .await
                            .map(|auth| inject_connector_auth(stage, auth)),
                        None => None,
                    },
                    StageKind::Deploy => {
                        let from_environment = match environment_id {
                            Some(id) => {
                                self.auth_from_environment(id, account_id, &mut lookups)
                                    .await
                            }
                            None => None,
                        };

                        match (from_environment, connector_id) {
                            (Some((auth, api_url)), _) => {
                                inject_environment_auth(stage, auth, api_url);
                                Some(())
                            }
                            (None, Some(id)) => self
                                .auth_from_connector(id, account_id)
                                .await
                                .map(|auth| inject_connector_auth(stage, auth)),
                            (None, None) => None,
                        }
                    }
                    _ => None,
                };

                let key = format!("{}__{}", node.id, stage.id);
                match resolved {
                    Some(()) => report.resolved.push(key),
                    None => {
                        warn!(stage = %key, kind = %stage.kind, "No credentials resolved for selected stage");
                        report.unresolved.push(key);
                    }
                }
            }
        }

        info!(
            resolved = report.resolved.len(),
            unresolved = report.unresolved.len(),
            "Pipeline credential resolution finished"
        );

        (definition, report)
    }

    /// Treat `id` as a connector, else as a credential id
    async fn auth_from_connector(&self, id: &str, account_id: &str) -> Option<ConnectorAuth> {
        let via_connector = async {
            let connector = self
                .resilience
                .call(Dependency::Connectors, "find_connector", || {
                    self.connectors.find_connector(id, account_id)
                })
                .await?;
            self.fetch_credential(&connector.credential_id, account_id)
                .await
        };

        match via_connector.await {
            Ok(credential) => return Some(normalize_credential(&credential)),
            Err(e) => debug!(id, error = %e, "Selection is not a usable connector, trying as credential"),
        }

        match self.fetch_credential(id, account_id).await {
            Ok(credential) => Some(normalize_credential(&credential)),
            Err(e) => {
                warn!(id, error = %e, "Failed to resolve selected connector");
                None
            }
        }
    }

    /// Auth and API URL from the deploy entry of the selected environment
    async fn auth_from_environment(
        &self,
        selected: &str,
        account_id: &str,
        lookups: &mut AccountLookups,
    ) -> Option<(ConnectorAuth, Option<String>)> {
        let environment = self
            .cached_environments(account_id, lookups)
            .await
            .iter()
            .find(|e| e.id == selected || e.name.eq_ignore_ascii_case(selected))?;
        let environment_id = environment.id.clone();
        let entry = deploy_entry(environment)?.clone();

        if let Some(name) = entry.credential_name.as_deref().filter(|n| !n.trim().is_empty()) {
            let credentials = self.cached_credentials(account_id, lookups).await;
            let matched = credentials.iter().find(|c| {
                c.name
                    .as_deref()
                    .is_some_and(|n| n.trim().eq_ignore_ascii_case(name.trim()))
            });
            if let Some(credential) = matched {
                return Some((normalize_credential(credential), entry.api_url));
            }
            debug!(environment = %environment_id, credential_name = name, "No credential matches environment entry");
        }

        match (entry.client_id, entry.client_secret) {
            (Some(client_id), Some(client_secret)) => Some((
                ConnectorAuth {
                    auth_type: "oauth2".to_string(),
                    client_id: Some(client_id),
                    client_secret: Some(client_secret),
                    token_url: entry.token_url,
                    ..Default::default()
                },
                entry.api_url,
            )),
            _ => None,
        }
    }

    async fn fetch_credential(&self, id: &str, account_id: &str) -> Result<Credential> {
        self.resilience
            .call(Dependency::Credentials, "find_credential", || {
                self.credentials.find_credential(id, account_id)
            })
            .await
    }

    async fn cached_environments<'a>(
        &self,
        account_id: &str,
        lookups: &'a mut AccountLookups,
    ) -> &'a [Environment] {
        if lookups.environments.is_none() {
            let fetched = self
                .resilience
                .call(Dependency::Environments, "list_environments", || {
                    self.environments.list_environments(account_id)
                })
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Failed to list environments");
                    Vec::new()
                });
            lookups.environments = Some(fetched);
        }
        lookups.environments.as_deref().unwrap_or_default()
    }

    async fn cached_credentials<'a>(
        &self,
        account_id: &str,
        lookups: &'a mut AccountLookups,
    ) -> &'a [Credential] {
        if lookups.credentials.is_none() {
            let fetched = self
                .resilience
                .call(Dependency::Credentials, "list_credentials", || {
                    self.credentials.list_credentials(account_id)
                })
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Failed to list credentials");
                    Vec::new()
                });
            lookups.credentials = Some(fetched);
        }
        lookups.credentials.as_deref().unwrap_or_default()
    }
}

fn candidate_keys(node_id: &str, stage_id: &str) -> [String; 3] {
    [
        format!("{}__{}", node_id, stage_id),
        format!("{}::{}", node_id, stage_id),
        stage_id.to_string(),
    ]
}

fn first_match<'a>(
    keys: &[String],
    map: &'a std::collections::HashMap<String, String>,
) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| map.get(k))
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty())
}

fn deploy_entry(environment: &Environment) -> Option<&EnvironmentConnector> {
    environment.connectors.iter().find(|c| {
        c.category.eq_ignore_ascii_case("deploy")
            || DEPLOY_TOOL_NAMES.contains(&c.connector.trim().to_ascii_lowercase().as_str())
    })
}

fn inject_connector_auth(stage: &mut Stage, auth: ConnectorAuth) {
    let config = stage.tool_config.get_or_insert_default();
    config.connector.get_or_insert_default().authentication = Some(auth);
}

fn inject_environment_auth(stage: &mut Stage, auth: ConnectorAuth, api_url: Option<String>) {
    let config = stage.tool_config.get_or_insert_default();
    let environment = config.environment.get_or_insert_default();
    environment.authentication = Some(auth);
    if environment.api_url.trim().is_empty() {
        if let Some(url) = api_url {
            environment.api_url = url;
        }
    }
}
