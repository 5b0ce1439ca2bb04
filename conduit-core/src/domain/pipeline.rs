//! Pipeline domain types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::domain::auth::ConnectorAuth;

/// Parsed pipeline definition
///
/// Produced once per run and never mutated by dispatch. The orchestrator
/// owns it for the lifetime of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDefinition {
    pub name: String,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl PipelineDefinition {
    /// Number of nodes that carry at least one stage
    pub fn executable_node_count(&self) -> usize {
        self.nodes.iter().filter(|n| !n.stages.is_empty()).count()
    }

    /// Total number of stages across all nodes
    pub fn stage_count(&self) -> usize {
        self.nodes.iter().map(|n| n.stages.len()).sum()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// A unit of the pipeline graph grouping ordered stages
///
/// Deserializes from `{ id, stages }` or the graph editor's
/// `{ id, data: { stages } }`; a node without either has no stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawNode")]
pub struct Node {
    pub id: String,
    pub stages: Vec<Stage>,
}

#[derive(Deserialize)]
struct RawNode {
    id: String,
    #[serde(default)]
    stages: Option<Vec<Stage>>,
    #[serde(default)]
    data: Option<RawNodeData>,
}

#[derive(Deserialize)]
struct RawNodeData {
    #[serde(default)]
    stages: Option<Vec<Stage>>,
}

impl From<RawNode> for Node {
    fn from(raw: RawNode) -> Self {
        let stages = raw
            .stages
            .or_else(|| raw.data.and_then(|d| d.stages))
            .unwrap_or_default();
        Self { id: raw.id, stages }
    }
}

/// Dependency edge: `source` must complete before `target` starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub continue_on_failure: bool,
}

/// Smallest unit of pipeline work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub id: String,
    #[serde(rename = "type", alias = "stageType")]
    pub kind: StageKind,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<ToolConfig>,
    #[serde(default = "enabled")]
    pub execution_enabled: bool,
    #[serde(default = "enabled")]
    pub tool_selected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<String>,
}

fn enabled() -> bool {
    true
}

/// Closed set of stage kinds
///
/// Parsed case-insensitively from the definition's `type` string. Anything
/// unrecognised is kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StageKind {
    Plan,
    Code,
    Build,
    Deploy,
    Release,
    Test,
    Approval,
    Other(String),
}

impl StageKind {
    pub fn as_str(&self) -> &str {
        match self {
            StageKind::Plan => "plan",
            StageKind::Code => "code",
            StageKind::Build => "build",
            StageKind::Deploy => "deploy",
            StageKind::Release => "release",
            StageKind::Test => "test",
            StageKind::Approval => "approval",
            StageKind::Other(raw) => raw,
        }
    }
}

impl From<&str> for StageKind {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "plan" => StageKind::Plan,
            "code" => StageKind::Code,
            "build" => StageKind::Build,
            "deploy" => StageKind::Deploy,
            "release" => StageKind::Release,
            "test" => StageKind::Test,
            "approval" => StageKind::Approval,
            _ => StageKind::Other(raw.trim().to_string()),
        }
    }
}

impl From<String> for StageKind {
    fn from(raw: String) -> Self {
        StageKind::from(raw.as_str())
    }
}

impl From<StageKind> for String {
    fn from(kind: StageKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tool binding of a stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    #[serde(rename = "type", default)]
    pub tool_type: String,
    #[serde(default)]
    pub inputs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector: Option<ConnectorConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactDescriptor>,
}

impl ToolConfig {
    /// Authentication embedded directly in the definition, connector first
    pub fn embedded_auth(&self) -> Option<&ConnectorAuth> {
        self.connector
            .as_ref()
            .and_then(|c| c.authentication.as_ref())
            .or_else(|| {
                self.environment
                    .as_ref()
                    .and_then(|e| e.authentication.as_ref())
            })
    }

    /// First non-empty string input among `keys`
    pub fn input_str(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|k| self.inputs.get(*k))
            .filter_map(Value::as_str)
            .map(str::trim)
            .find(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<ConnectorAuth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub api_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<ConnectorAuth>,
}

/// An artifact a deploy stage downloads from the integration platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub artifact_type: String,
    #[serde(default = "active_version")]
    pub version: String,
}

fn active_version() -> String {
    "active".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_kind_is_case_insensitive() {
        assert_eq!(StageKind::from("Deploy"), StageKind::Deploy);
        assert_eq!(StageKind::from(" CODE "), StageKind::Code);
        assert_eq!(
            StageKind::from("security-scan"),
            StageKind::Other("security-scan".to_string())
        );
    }

    #[test]
    fn test_stage_defaults() {
        let stage: Stage = serde_json::from_value(serde_json::json!({
            "id": "s1",
            "type": "build"
        }))
        .unwrap();

        assert_eq!(stage.kind, StageKind::Build);
        assert!(stage.execution_enabled);
        assert!(stage.tool_selected);
        assert!(stage.tool_config.is_none());
    }

    #[test]
    fn test_node_stages_from_either_shape() {
        let definition: PipelineDefinition = serde_json::from_value(serde_json::json!({
            "name": "release",
            "nodes": [
                { "id": "plain", "stages": [{ "id": "s1", "type": "build" }] },
                { "id": "editor", "data": { "stages": [{ "id": "s2", "type": "test" }] } },
                { "id": "start" }
            ]
        }))
        .unwrap();

        assert_eq!(definition.nodes[0].stages[0].id, "s1");
        assert_eq!(definition.nodes[1].stages[0].kind, StageKind::Test);
        assert!(definition.nodes[2].stages.is_empty());
        assert_eq!(definition.executable_node_count(), 2);
    }

    #[test]
    fn test_embedded_auth_prefers_connector() {
        let config = ToolConfig {
            connector: Some(ConnectorConfig {
                authentication: Some(ConnectorAuth::bearer("conn")),
                ..Default::default()
            }),
            environment: Some(EnvironmentConfig {
                authentication: Some(ConnectorAuth::bearer("env")),
                ..Default::default()
            }),
            ..Default::default()
        };

        assert_eq!(
            config.embedded_auth().and_then(|a| a.token.as_deref()),
            Some("conn")
        );
    }

    #[test]
    fn test_input_str_skips_blank_values() {
        let config = ToolConfig {
            inputs: serde_json::json!({ "issueKey": "  ", "jiraKey": "OPS-7" })
                .as_object()
                .cloned()
                .unwrap(),
            ..Default::default()
        };

        assert_eq!(config.input_str(&["issueKey", "jiraKey"]), Some("OPS-7"));
    }
}
