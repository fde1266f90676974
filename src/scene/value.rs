//! Attribute values stored on scene prims

use glam::{DMat4, DVec3, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use stagehand_core::{ShaderValue, ValueType};

/// A typed attribute value, named after USD scene value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    // Scalar types
    Bool(bool),
    Int(i32),
    Float(f32),
    Double(f64),
    String(String),
    Token(String),
    Asset(String),

    // Vector types
    Float2(Vec2),
    Float3(Vec3),
    Float4(Vec4),
    Double3(DVec3),
    Color3f(Vec3),
    Normal3f(Vec3),
    Point3f(Vec3),
    Vector3f(Vec3),
    TexCoord2f(Vec2),

    // Matrix types
    Matrix4d(DMat4),

    // Array types
    IntArray(Vec<i32>),
    FloatArray(Vec<f32>),
    DoubleArray(Vec<f64>),
    TokenArray(Vec<String>),
    Float2Array(Vec<Vec2>),
    Float3Array(Vec<Vec3>),
    Color3fArray(Vec<Vec3>),
    Normal3fArray(Vec<Vec3>),
    Point3fArray(Vec<Vec3>),
    Vector3fArray(Vec<Vec3>),
    TexCoord2fArray(Vec<Vec2>),
}

impl AttributeValue {
    /// USD type name, e.g. `point3f[]`
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::Bool(_) => "bool",
            AttributeValue::Int(_) => "int",
            AttributeValue::Float(_) => "float",
            AttributeValue::Double(_) => "double",
            AttributeValue::String(_) => "string",
            AttributeValue::Token(_) => "token",
            AttributeValue::Asset(_) => "asset",
            AttributeValue::Float2(_) => "float2",
            AttributeValue::Float3(_) => "float3",
            AttributeValue::Float4(_) => "float4",
            AttributeValue::Double3(_) => "double3",
            AttributeValue::Color3f(_) => "color3f",
            AttributeValue::Normal3f(_) => "normal3f",
            AttributeValue::Point3f(_) => "point3f",
            AttributeValue::Vector3f(_) => "vector3f",
            AttributeValue::TexCoord2f(_) => "texCoord2f",
            AttributeValue::Matrix4d(_) => "matrix4d",
            AttributeValue::IntArray(_) => "int[]",
            AttributeValue::FloatArray(_) => "float[]",
            AttributeValue::DoubleArray(_) => "double[]",
            AttributeValue::TokenArray(_) => "token[]",
            AttributeValue::Float2Array(_) => "float2[]",
            AttributeValue::Float3Array(_) => "float3[]",
            AttributeValue::Color3fArray(_) => "color3f[]",
            AttributeValue::Normal3fArray(_) => "normal3f[]",
            AttributeValue::Point3fArray(_) => "point3f[]",
            AttributeValue::Vector3fArray(_) => "vector3f[]",
            AttributeValue::TexCoord2fArray(_) => "texCoord2f[]",
        }
    }

    pub fn as_token(&self) -> Option<&str> {
        match self {
            AttributeValue::Token(s) | AttributeValue::String(s) | AttributeValue::Asset(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(v) => Some(*v as f64),
            AttributeValue::Double(v) => Some(*v),
            AttributeValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_int_array(&self) -> Option<&[i32]> {
        match self {
            AttributeValue::IntArray(v) => Some(v),
            _ => None,
        }
    }

    /// Any three-component float array, regardless of role
    pub fn as_vec3_array(&self) -> Option<&[Vec3]> {
        match self {
            AttributeValue::Float3Array(v)
            | AttributeValue::Color3fArray(v)
            | AttributeValue::Normal3fArray(v)
            | AttributeValue::Point3fArray(v)
            | AttributeValue::Vector3fArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vec2_array(&self) -> Option<&[Vec2]> {
        match self {
            AttributeValue::Float2Array(v) | AttributeValue::TexCoord2fArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vec3(&self) -> Option<Vec3> {
        match self {
            AttributeValue::Float3(v)
            | AttributeValue::Color3f(v)
            | AttributeValue::Normal3f(v)
            | AttributeValue::Point3f(v)
            | AttributeValue::Vector3f(v) => Some(*v),
            AttributeValue::Double3(v) => Some(v.as_vec3()),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<DMat4> {
        match self {
            AttributeValue::Matrix4d(m) => Some(*m),
            _ => None,
        }
    }

    /// Converts a shader literal, honouring the declared port type
    pub fn from_shader_value(value: &ShaderValue, value_type: ValueType) -> Self {
        match (value, value_type) {
            (ShaderValue::Float3(v) | ShaderValue::Color3(v), ValueType::Color3) => {
                AttributeValue::Color3f(Vec3::from_array(*v))
            }
            (ShaderValue::Float3(v) | ShaderValue::Color3(v), ValueType::Normal3) => {
                AttributeValue::Normal3f(Vec3::from_array(*v))
            }
            (ShaderValue::Float3(v) | ShaderValue::Color3(v), ValueType::Vector3) => {
                AttributeValue::Vector3f(Vec3::from_array(*v))
            }
            (ShaderValue::Float3(v) | ShaderValue::Color3(v), _) => AttributeValue::Float3(Vec3::from_array(*v)),
            (ShaderValue::Bool(v), _) => AttributeValue::Bool(*v),
            (ShaderValue::Int(v), _) => AttributeValue::Int(*v),
            (ShaderValue::Float(v), _) => AttributeValue::Float(*v),
            (ShaderValue::Float2(v), _) => AttributeValue::Float2(Vec2::from_array(*v)),
            (ShaderValue::Float4(v), _) => AttributeValue::Float4(Vec4::from_array(*v)),
            (ShaderValue::Asset(v), _) => AttributeValue::Asset(v.clone()),
            (ShaderValue::Token(v), _) => AttributeValue::Token(v.clone()),
            (ShaderValue::String(v), _) => AttributeValue::String(v.clone()),
        }
    }
}
