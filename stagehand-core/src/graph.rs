//! Material shader graph

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::node::{NodeId, ShaderNode};
use crate::port::{Connection, ShaderInput, ValueType};

/// Errors raised when wiring a graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("node `{0}` already exists")]
    DuplicateNode(NodeId),
    #[error("node `{0}` does not exist")]
    UnknownNode(NodeId),
    #[error("node `{node}` has no output `{output}`")]
    UnknownOutput { node: NodeId, output: String },
    #[error("cannot connect node `{0}` to itself")]
    SelfConnection(NodeId),
    #[error("connecting `{from}` to `{to}` would create a cycle")]
    Cycle { from: NodeId, to: NodeId },
}

/// The terminal outputs of a material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaterialOutput {
    Surface,
    Displacement,
}

impl MaterialOutput {
    pub fn name(&self) -> &'static str {
        match self {
            MaterialOutput::Surface => "surface",
            MaterialOutput::Displacement => "displacement",
        }
    }
}

/// A DAG of shader nodes rooted at a material's surface and displacement outputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShaderGraph {
    pub nodes: BTreeMap<NodeId, ShaderNode>,
    pub surface: Option<Connection>,
    pub displacement: Option<Connection>,
    /// Custom metadata attached to the material prim
    pub metadata: BTreeMap<String, String>,
}

impl ShaderGraph {
    /// Creates a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node, rejecting duplicate ids
    pub fn add_node(&mut self, node: ShaderNode) -> Result<NodeId, GraphError> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode(node.id));
        }
        let id = node.id.clone();
        self.nodes.insert(id.clone(), node);
        Ok(id)
    }

    pub fn node(&self, id: &str) -> Option<&ShaderNode> {
        self.nodes.get(id)
    }

    /// Wires an upstream output into a node input
    pub fn connect(
        &mut self,
        from: Connection,
        to_node: &str,
        to_input: impl Into<String>,
        value_type: ValueType,
    ) -> Result<(), GraphError> {
        if from.node == to_node {
            return Err(GraphError::SelfConnection(from.node));
        }
        self.check_source(&from)?;
        if !self.nodes.contains_key(to_node) {
            return Err(GraphError::UnknownNode(to_node.to_string()));
        }
        if self.upstream_of(&from.node).contains(to_node) {
            return Err(GraphError::Cycle {
                from: from.node,
                to: to_node.to_string(),
            });
        }

        // An existing literal is kept as the fallback value
        if let Some(node) = self.nodes.get_mut(to_node) {
            node.inputs
                .entry(to_input.into())
                .and_modify(|input| {
                    input.value_type = value_type;
                    input.upstream = Some(from.clone());
                })
                .or_insert_with(|| ShaderInput::with_connection(value_type, from));
        }
        Ok(())
    }

    /// Binds one of the material's terminal outputs
    pub fn set_output(&mut self, output: MaterialOutput, from: Connection) -> Result<(), GraphError> {
        self.check_source(&from)?;
        match output {
            MaterialOutput::Surface => self.surface = Some(from),
            MaterialOutput::Displacement => self.displacement = Some(from),
        }
        Ok(())
    }

    /// The node driving the surface output
    pub fn surface_shader(&self) -> Option<&ShaderNode> {
        self.surface.as_ref().and_then(|c| self.nodes.get(&c.node))
    }

    /// All edges as `(source, target node, target input)`
    pub fn connections(&self) -> Vec<(&Connection, &str, &str)> {
        self.nodes
            .values()
            .flat_map(|node| {
                node.inputs.iter().filter_map(move |(name, input)| {
                    input
                        .connection()
                        .map(|c| (c, node.id.as_str(), name.as_str()))
                })
            })
            .collect()
    }

    /// Every node that feeds `id`, directly or transitively
    pub fn upstream_of(&self, id: &str) -> BTreeSet<NodeId> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                for input in node.inputs.values() {
                    if let Some(c) = input.connection() {
                        if seen.insert(c.node.clone()) {
                            stack.push(c.node.clone());
                        }
                    }
                }
            }
        }
        seen
    }

    /// Nodes ordered so that every node comes after the nodes feeding it
    pub fn topological_order(&self) -> Vec<&ShaderNode> {
        let mut ordered = Vec::with_capacity(self.nodes.len());
        let mut placed = BTreeSet::new();
        while placed.len() < self.nodes.len() {
            let before = placed.len();
            for node in self.nodes.values() {
                if placed.contains(&node.id) {
                    continue;
                }
                let ready = node
                    .inputs
                    .values()
                    .filter_map(|i| i.connection())
                    .all(|c| placed.contains(&c.node));
                if ready {
                    placed.insert(node.id.clone());
                    ordered.push(node);
                }
            }
            if placed.len() == before {
                break;
            }
        }
        ordered
    }

    fn check_source(&self, from: &Connection) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get(&from.node)
            .ok_or_else(|| GraphError::UnknownNode(from.node.clone()))?;
        if !node.has_output(&from.output) {
            return Err(GraphError::UnknownOutput {
                node: from.node.clone(),
                output: from.output.clone(),
            });
        }
        Ok(())
    }
}
