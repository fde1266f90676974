use glam::{DMat4, DVec3, Vec2, Vec3, Vec4};

use super::{parse_error, Parser};
use crate::error::SceneError;
use crate::scene::usda::token::Token;
use crate::scene::value::AttributeValue;

/// Untyped value as written in the file, typed later against the declaration
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Literal {
    None,
    Number(f64),
    Str(String),
    Asset(String),
    Path(String),
    Ident(String),
    Tuple(Vec<Literal>),
    List(Vec<Literal>),
    Dict(Vec<(String, Literal)>),
}

impl<'a> Parser<'a> {
    pub(super) fn read_literal(&mut self) -> Result<Literal, SceneError> {
        match self.fetch_next()? {
            Token::None => Ok(Literal::None),
            Token::Number(text) => text
                .parse::<f64>()
                .map(Literal::Number)
                .map_err(|_| parse_error(self.line(), format!("invalid number `{}`", text))),
            Token::String(text) => Ok(Literal::Str(text)),
            Token::AssetRef(path) => Ok(Literal::Asset(path.to_string())),
            Token::PathRef(path) => Ok(Literal::Path(path.to_string())),
            Token::Identifier(name) | Token::NamespacedIdentifier(name) => Ok(Literal::Ident(name.to_string())),
            Token::Punctuation('(') => Ok(Literal::Tuple(self.read_sequence(')')?)),
            Token::Punctuation('[') => Ok(Literal::List(self.read_sequence(']')?)),
            Token::Punctuation('{') => self.read_dictionary(),
            other => Err(parse_error(self.line(), format!("unexpected {:?}", other))),
        }
    }

    fn read_sequence(&mut self, close: char) -> Result<Vec<Literal>, SceneError> {
        let mut items = Vec::new();
        while !self.eat_pun(close) {
            items.push(self.read_literal()?);
            if !self.eat_pun(',') {
                self.ensure_pun(close)?;
                break;
            }
        }
        Ok(items)
    }

    /// `{ string key = "value" dictionary nested = { ... } }`
    fn read_dictionary(&mut self) -> Result<Literal, SceneError> {
        let mut entries = Vec::new();
        while !self.eat_pun('}') {
            let _value_type = self.fetch_identifier()?;
            if self.eat_pun('[') {
                self.ensure_pun(']')?;
            }
            let key = match self.fetch_next()? {
                Token::String(key) => key,
                Token::Identifier(key) | Token::NamespacedIdentifier(key) => key.to_string(),
                other => return Err(parse_error(self.line(), format!("invalid dictionary key {:?}", other))),
            };
            self.ensure_pun('=')?;
            entries.push((key, self.read_literal()?));
            let _ = self.eat_pun(',') || self.eat_pun(';');
        }
        Ok(Literal::Dict(entries))
    }
}

fn number(literal: &Literal, line: usize) -> Result<f64, SceneError> {
    match literal {
        Literal::Number(n) => Ok(*n),
        Literal::Ident(s) if s == "inf" => Ok(f64::INFINITY),
        Literal::Ident(s) if s == "nan" => Ok(f64::NAN),
        other => Err(parse_error(line, format!("expected number, found {:?}", other))),
    }
}

fn numbers<const N: usize>(literal: &Literal, line: usize) -> Result<[f64; N], SceneError> {
    match literal {
        Literal::Tuple(items) if items.len() == N => {
            let mut out = [0.0; N];
            for (slot, item) in out.iter_mut().zip(items) {
                *slot = number(item, line)?;
            }
            Ok(out)
        }
        other => Err(parse_error(line, format!("expected {}-tuple, found {:?}", N, other))),
    }
}

fn vec2(literal: &Literal, line: usize) -> Result<Vec2, SceneError> {
    let [x, y] = numbers::<2>(literal, line)?;
    Ok(Vec2::new(x as f32, y as f32))
}

fn vec3(literal: &Literal, line: usize) -> Result<Vec3, SceneError> {
    let [x, y, z] = numbers::<3>(literal, line)?;
    Ok(Vec3::new(x as f32, y as f32, z as f32))
}

fn text(literal: &Literal, line: usize) -> Result<String, SceneError> {
    match literal {
        Literal::Str(s) | Literal::Asset(s) | Literal::Ident(s) => Ok(s.clone()),
        other => Err(parse_error(line, format!("expected string, found {:?}", other))),
    }
}

fn list<T>(
    literal: &Literal,
    line: usize,
    item: impl Fn(&Literal, usize) -> Result<T, SceneError>,
) -> Result<Vec<T>, SceneError> {
    match literal {
        Literal::List(items) => items.iter().map(|i| item(i, line)).collect(),
        other => Err(parse_error(line, format!("expected array, found {:?}", other))),
    }
}

/// Types `literal` against the declared USD type name
pub(super) fn to_value(type_name: &str, literal: &Literal, line: usize) -> Result<AttributeValue, SceneError> {
    let value = match type_name {
        "bool" => AttributeValue::Bool(match literal {
            Literal::Ident(s) => s == "true",
            other => number(other, line)? != 0.0,
        }),
        "int" | "uint" | "int64" | "uint64" | "uchar" => AttributeValue::Int(number(literal, line)? as i32),
        "float" | "half" => AttributeValue::Float(number(literal, line)? as f32),
        "double" | "timecode" => AttributeValue::Double(number(literal, line)?),
        "string" => AttributeValue::String(text(literal, line)?),
        "token" => AttributeValue::Token(text(literal, line)?),
        "asset" => AttributeValue::Asset(text(literal, line)?),
        "float2" | "half2" | "double2" => AttributeValue::Float2(vec2(literal, line)?),
        "texCoord2f" | "texCoord2h" | "texCoord2d" => AttributeValue::TexCoord2f(vec2(literal, line)?),
        "float3" | "half3" => AttributeValue::Float3(vec3(literal, line)?),
        "double3" => AttributeValue::Double3(DVec3::from_array(numbers::<3>(literal, line)?)),
        "float4" | "half4" | "color4f" => {
            let [x, y, z, w] = numbers::<4>(literal, line)?;
            AttributeValue::Float4(Vec4::new(x as f32, y as f32, z as f32, w as f32))
        }
        "color3f" | "color3h" | "color3d" => AttributeValue::Color3f(vec3(literal, line)?),
        "normal3f" | "normal3h" | "normal3d" => AttributeValue::Normal3f(vec3(literal, line)?),
        "point3f" | "point3h" | "point3d" => AttributeValue::Point3f(vec3(literal, line)?),
        "vector3f" | "vector3h" | "vector3d" => AttributeValue::Vector3f(vec3(literal, line)?),
        "matrix4d" => match literal {
            Literal::Tuple(rows) if rows.len() == 4 => {
                let mut cols = [[0.0; 4]; 4];
                for (col, row) in cols.iter_mut().zip(rows) {
                    *col = numbers::<4>(row, line)?;
                }
                AttributeValue::Matrix4d(DMat4::from_cols_array_2d(&cols))
            }
            other => return Err(parse_error(line, format!("expected matrix, found {:?}", other))),
        },
        "int[]" | "uint[]" | "int64[]" => AttributeValue::IntArray(list(literal, line, |l, n| Ok(number(l, n)? as i32))?),
        "float[]" | "half[]" => AttributeValue::FloatArray(list(literal, line, |l, n| Ok(number(l, n)? as f32))?),
        "double[]" | "timecode[]" => AttributeValue::DoubleArray(list(literal, line, number)?),
        "token[]" | "string[]" => AttributeValue::TokenArray(list(literal, line, text)?),
        "float2[]" | "half2[]" => AttributeValue::Float2Array(list(literal, line, vec2)?),
        "texCoord2f[]" | "texCoord2h[]" => AttributeValue::TexCoord2fArray(list(literal, line, vec2)?),
        "float3[]" | "half3[]" => AttributeValue::Float3Array(list(literal, line, vec3)?),
        "color3f[]" | "color3h[]" => AttributeValue::Color3fArray(list(literal, line, vec3)?),
        "normal3f[]" | "normal3h[]" => AttributeValue::Normal3fArray(list(literal, line, vec3)?),
        "point3f[]" | "point3h[]" => AttributeValue::Point3fArray(list(literal, line, vec3)?),
        "vector3f[]" | "vector3h[]" => AttributeValue::Vector3fArray(list(literal, line, vec3)?),
        other => return Err(parse_error(line, format!("unsupported attribute type `{}`", other))),
    };
    Ok(value)
}
