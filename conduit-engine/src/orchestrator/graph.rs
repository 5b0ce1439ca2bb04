//! Node dependency graph
//!
//! Kahn's algorithm grouped into levels. Within a level nodes keep their
//! definition order, so traversal is deterministic.

use std::collections::HashMap;

use conduit_core::domain::pipeline::PipelineDefinition;

use crate::error::{EngineError, Result};

/// Incoming edge of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predecessor {
    pub node: usize,
    pub continue_on_failure: bool,
}

#[derive(Debug)]
pub struct NodeGraph {
    predecessors: Vec<Vec<Predecessor>>,
    levels: Vec<Vec<usize>>,
}

impl NodeGraph {
    /// Build the graph, failing on duplicate ids, unknown endpoints or cycles
    pub fn build(definition: &PipelineDefinition) -> Result<Self> {
        let count = definition.nodes.len();
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(count);
        for (i, node) in definition.nodes.iter().enumerate() {
            if index.insert(node.id.as_str(), i).is_some() {
                return Err(EngineError::InvalidDefinition(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
        }

        let mut predecessors: Vec<Vec<Predecessor>> = vec![Vec::new(); count];
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); count];

        for edge in &definition.edges {
            let lookup = |id: &str| {
                index.get(id).copied().ok_or_else(|| {
                    EngineError::InvalidDefinition(format!("edge references unknown node '{}'", id))
                })
            };
            let source = lookup(&edge.source)?;
            let target = lookup(&edge.target)?;

            predecessors[target].push(Predecessor {
                node: source,
                continue_on_failure: edge.continue_on_failure,
            });
            successors[source].push(target);
        }

        let mut in_degree: Vec<usize> = predecessors.iter().map(Vec::len).collect();
        let mut done = vec![false; count];
        let mut levels = Vec::new();
        let mut processed = 0;

        while processed < count {
            let level: Vec<usize> = (0..count)
                .filter(|&i| !done[i] && in_degree[i] == 0)
                .collect();

            if level.is_empty() {
                let stuck: Vec<&str> = (0..count)
                    .filter(|&i| !done[i])
                    .map(|i| definition.nodes[i].id.as_str())
                    .collect();
                return Err(EngineError::InvalidDefinition(format!(
                    "circular dependency between nodes: {}",
                    stuck.join(", ")
                )));
            }

            for &node in &level {
                done[node] = true;
                for &next in &successors[node] {
                    in_degree[next] -= 1;
                }
            }

            processed += level.len();
            levels.push(level);
        }

        Ok(Self {
            predecessors,
            levels,
        })
    }

    /// Node indices grouped by dependency depth
    pub fn levels(&self) -> &[Vec<usize>] {
        &self.levels
    }

    pub fn predecessors(&self, node: usize) -> &[Predecessor] {
        &self.predecessors[node]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::domain::pipeline::{Edge, Node};

    fn definition(ids: &[&str], edges: &[(&str, &str)]) -> PipelineDefinition {
        PipelineDefinition {
            name: "p".to_string(),
            nodes: ids
                .iter()
                .map(|id| Node {
                    id: id.to_string(),
                    stages: vec![],
                })
                .collect(),
            edges: edges
                .iter()
                .map(|(s, t)| Edge {
                    source: s.to_string(),
                    target: t.to_string(),
                    continue_on_failure: false,
                })
                .collect(),
        }
    }

    #[test]
    fn test_levels_keep_definition_order() {
        let graph = NodeGraph::build(&definition(
            &["a", "b", "c", "d"],
            &[("a", "c"), ("b", "c"), ("c", "d")],
        ))
        .unwrap();

        assert_eq!(graph.levels(), &[vec![0, 1], vec![2], vec![3]]);
        assert_eq!(graph.predecessors(2).len(), 2);
    }

    #[test]
    fn test_no_edges_is_one_level() {
        let graph = NodeGraph::build(&definition(&["x", "y"], &[])).unwrap();
        assert_eq!(graph.levels(), &[vec![0, 1]]);
    }

    #[test]
    fn test_duplicate_node_id_is_invalid() {
        let err = NodeGraph::build(&definition(&["x", "gate", "x"], &[("gate", "x")])).unwrap_err();

        assert!(matches!(err, EngineError::InvalidDefinition(msg) if msg.contains("'x'")));
    }

    #[test]
    fn test_cycle_is_invalid() {
        let err = NodeGraph::build(&definition(
            &["a", "b", "c"],
            &[("a", "b"), ("b", "c"), ("c", "b")],
        ))
        .unwrap_err();

        assert!(matches!(err, EngineError::InvalidDefinition(msg) if msg.contains("b, c")));
    }
}
