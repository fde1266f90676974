//! Shader node definition

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::port::{ShaderInput, ShaderValue, ValueType};

/// Unique identifier for a node within one material graph
pub type NodeId = String;

/// A single shader in a material graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderNode {
    pub id: NodeId,
    /// Shader definition identifier, e.g. `UsdPreviewSurface`
    pub shader_id: String,
    pub inputs: BTreeMap<String, ShaderInput>,
    pub outputs: BTreeMap<String, ValueType>,
}

impl ShaderNode {
    /// Creates a new node with no ports
    pub fn new(id: impl Into<NodeId>, shader_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            shader_id: shader_id.into(),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Sets a literal input, typed after the value
    pub fn set_input(&mut self, name: impl Into<String>, value: ShaderValue) -> &mut Self {
        let value_type = value.value_type();
        self.set_typed_input(name, value_type, value)
    }

    /// Sets a literal input with an explicit port type
    pub fn set_typed_input(
        &mut self,
        name: impl Into<String>,
        value_type: ValueType,
        value: ShaderValue,
    ) -> &mut Self {
        self.inputs
            .entry(name.into())
            .and_modify(|input| {
                input.value_type = value_type;
                input.literal = Some(value.clone());
            })
            .or_insert_with(|| ShaderInput::with_value(value_type, value));
        self
    }

    /// Declares an output port
    pub fn add_output(&mut self, name: impl Into<String>, value_type: ValueType) -> &mut Self {
        self.outputs.insert(name.into(), value_type);
        self
    }

    pub fn input(&self, name: &str) -> Option<&ShaderInput> {
        self.inputs.get(name)
    }

    pub fn has_output(&self, name: &str) -> bool {
        self.outputs.contains_key(name)
    }
}
