//! Port types for shader node inputs and outputs

use serde::{Deserialize, Serialize};

use crate::node::NodeId;

/// Value type carried by a shader port, named after its USD scene type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Bool,
    Int,
    Float,
    Float2,
    Float3,
    Float4,
    Color3,
    Normal3,
    Vector3,
    Asset,
    Token,
    String,
}

impl ValueType {
    /// USD type name used when authoring the port
    pub fn usd_name(&self) -> &'static str {
        match self {
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Float2 => "float2",
            ValueType::Float3 => "float3",
            ValueType::Float4 => "float4",
            ValueType::Color3 => "color3f",
            ValueType::Normal3 => "normal3f",
            ValueType::Vector3 => "vector3f",
            ValueType::Asset => "asset",
            ValueType::Token => "token",
            ValueType::String => "string",
        }
    }
}

/// A literal value bound to a shader input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShaderValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Float2([f32; 2]),
    Float3([f32; 3]),
    Float4([f32; 4]),
    Color3([f32; 3]),
    Asset(String),
    Token(String),
    String(String),
}

impl ShaderValue {
    /// The natural port type for this value
    pub fn value_type(&self) -> ValueType {
        match self {
            ShaderValue::Bool(_) => ValueType::Bool,
            ShaderValue::Int(_) => ValueType::Int,
            ShaderValue::Float(_) => ValueType::Float,
            ShaderValue::Float2(_) => ValueType::Float2,
            ShaderValue::Float3(_) => ValueType::Float3,
            ShaderValue::Float4(_) => ValueType::Float4,
            ShaderValue::Color3(_) => ValueType::Color3,
            ShaderValue::Asset(_) => ValueType::Asset,
            ShaderValue::Token(_) => ValueType::Token,
            ShaderValue::String(_) => ValueType::String,
        }
    }
}

/// Reference to a named output on an upstream node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub node: NodeId,
    pub output: String,
}

impl Connection {
    /// Creates a new connection source
    pub fn new(node: impl Into<NodeId>, output: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            output: output.into(),
        }
    }
}

/// A typed input port on a shader node
///
/// An input may carry a literal, a connection, or both. When connected the
/// literal stays as the fallback a renderer uses if the upstream node cannot
/// be evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderInput {
    pub value_type: ValueType,
    pub literal: Option<ShaderValue>,
    pub upstream: Option<Connection>,
}

impl ShaderInput {
    pub fn with_value(value_type: ValueType, value: ShaderValue) -> Self {
        Self {
            value_type,
            literal: Some(value),
            upstream: None,
        }
    }

    pub fn with_connection(value_type: ValueType, connection: Connection) -> Self {
        Self {
            value_type,
            literal: None,
            upstream: Some(connection),
        }
    }

    /// Returns the literal value, connected or not
    pub fn value(&self) -> Option<&ShaderValue> {
        self.literal.as_ref()
    }

    /// Returns the upstream connection, if any
    pub fn connection(&self) -> Option<&Connection> {
        self.upstream.as_ref()
    }

    /// Checks if this input is driven by another node
    pub fn is_connected(&self) -> bool {
        self.upstream.is_some()
    }
}
