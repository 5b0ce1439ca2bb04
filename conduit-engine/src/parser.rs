//! Definition parser
//!
//! Turns raw definition text into a [`PipelineDefinition`]. Node and stage
//! order follow the input exactly. No external calls.
//!
//! Accepted node shapes:
//! - `{ "id": "n1", "stages": [...] }`
//! - `{ "id": "n1", "data": { "stages": [...] } }` (graph editor export)

use std::collections::HashSet;

use conduit_core::domain::pipeline::{Edge, Node, PipelineDefinition, Stage};
use serde_json::{Map, Value};
use thiserror::Error;

const DEFAULT_PIPELINE_NAME: &str = "unnamed";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("definition is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("definition has no 'nodes' list")]
    MissingNodes,

    #[error("node {index} is not an object")]
    InvalidNode { index: usize },

    #[error("node {index} has no id")]
    MissingNodeId { index: usize },

    #[error("node id '{0}' appears more than once")]
    DuplicateNode(String),

    #[error("stage {index} of node '{node}' has no '{field}'")]
    MissingStageField {
        node: String,
        index: usize,
        field: &'static str,
    },

    #[error("stage {index} of node '{node}' is malformed: {message}")]
    InvalidStage {
        node: String,
        index: usize,
        message: String,
    },

    #[error("edge {index} is malformed: {message}")]
    InvalidEdge { index: usize, message: String },

    #[error("edge {index} references unknown node '{node}'")]
    UnknownEdgeNode { index: usize, node: String },

    #[error("definition has no node with at least one stage")]
    NoExecutableNodes,
}

/// Parse definition text into a pipeline graph
///
/// Fails when the text is not JSON, when the node list is absent, or when no
/// node carries a stage.
pub fn parse(text: &str) -> Result<PipelineDefinition, ParseError> {
    let root: Value =
        serde_json::from_str(text).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    let nodes_value = root
        .get("nodes")
        .and_then(Value::as_array)
        .ok_or(ParseError::MissingNodes)?;

    let mut seen = HashSet::new();
    let mut nodes = Vec::with_capacity(nodes_value.len());
    for (index, raw) in nodes_value.iter().enumerate() {
        let node = parse_node(index, raw)?;
        if !seen.insert(node.id.clone()) {
            return Err(ParseError::DuplicateNode(node.id));
        }
        nodes.push(node);
    }

    let edges = match root.get("edges") {
        Some(Value::Array(raw)) => parse_edges(raw, &seen)?,
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            return Err(ParseError::InvalidEdge {
                index: 0,
                message: "'edges' must be a list".to_string(),
            });
        }
    };

    let name = root
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_PIPELINE_NAME)
        .to_string();

    let definition = PipelineDefinition { name, nodes, edges };

    if definition.executable_node_count() == 0 {
        return Err(ParseError::NoExecutableNodes);
    }

    Ok(definition)
}

fn parse_node(index: usize, raw: &Value) -> Result<Node, ParseError> {
    let object = raw.as_object().ok_or(ParseError::InvalidNode { index })?;

    let id = object
        .get("id")
        .and_then(id_string)
        .ok_or(ParseError::MissingNodeId { index })?;

    let stages_value = object
        .get("stages")
        .or_else(|| object.get("data").and_then(|d| d.get("stages")));

    let stages = match stages_value {
        Some(Value::Array(raw_stages)) => raw_stages
            .iter()
            .enumerate()
            .map(|(i, s)| parse_stage(&id, i, s))
            .collect::<Result<Vec<_>, _>>()?,
        _ => Vec::new(),
    };

    Ok(Node { id, stages })
}

fn parse_stage(node: &str, index: usize, raw: &Value) -> Result<Stage, ParseError> {
    let invalid = |message: String| ParseError::InvalidStage {
        node: node.to_string(),
        index,
        message,
    };
    let missing = |field: &'static str| ParseError::MissingStageField {
        node: node.to_string(),
        index,
        field,
    };

    let mut object: Map<String, Value> = raw
        .as_object()
        .cloned()
        .ok_or_else(|| invalid("stage is not an object".to_string()))?;

    let id = object.get("id").and_then(id_string).ok_or_else(|| missing("id"))?;
    object.insert("id".to_string(), Value::String(id));

    let kind = object
        .get("type")
        .or_else(|| object.get("stageType"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| missing("type"))?;
    object.remove("stageType");
    object.insert("type".to_string(), Value::String(kind));

    serde_json::from_value(Value::Object(object)).map_err(|e| invalid(e.to_string()))
}

fn parse_edges(raw: &[Value], nodes: &HashSet<String>) -> Result<Vec<Edge>, ParseError> {
    raw.iter()
        .enumerate()
        .map(|(index, value)| {
            let edge: Edge =
                serde_json::from_value(value.clone()).map_err(|e| ParseError::InvalidEdge {
                    index,
                    message: e.to_string(),
                })?;

            for endpoint in [&edge.source, &edge.target] {
                if !nodes.contains(endpoint) {
                    return Err(ParseError::UnknownEdgeNode {
                        index,
                        node: endpoint.clone(),
                    });
                }
            }

            Ok(edge)
        })
        .collect()
}

/// Ids may be written as strings or numbers
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
