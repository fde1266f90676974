//! Canonical material schema shared by every source format

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Canonical property names
pub mod keys {
    pub const BASE_COLOR: &str = "base_color";
    pub const METALLIC: &str = "metallic";
    pub const ROUGHNESS: &str = "roughness";
    pub const SPECULAR: &str = "specular";
    pub const SPECULAR_COLOR: &str = "specular_color";
    pub const EMISSIVE_COLOR: &str = "emissive_color";
    pub const OPACITY: &str = "opacity";
    pub const TRANSMISSION: &str = "transmission";
    pub const SUBSURFACE: &str = "subsurface";
    pub const SUBSURFACE_COLOR: &str = "subsurface_color";
    pub const NORMAL_MAP: &str = "normal_map";
    pub const DISPLACEMENT: &str = "displacement";

    pub const BASE_COLOR_TEXTURE: &str = "base_color_texture";
    pub const METALLIC_TEXTURE: &str = "metallic_texture";
    pub const ROUGHNESS_TEXTURE: &str = "roughness_texture";
    pub const METALLIC_ROUGHNESS_TEXTURE: &str = "metallic_roughness_texture";
    pub const SPECULAR_TEXTURE: &str = "specular_texture";
    pub const EMISSIVE_TEXTURE: &str = "emissive_texture";
    pub const OPACITY_TEXTURE: &str = "opacity_texture";
    pub const OCCLUSION_TEXTURE: &str = "occlusion_texture";
    pub const AMBIENT_TEXTURE: &str = "ambient_texture";
    pub const DISPLACEMENT_TEXTURE: &str = "displacement_texture";
}

/// A canonical property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MaterialValue {
    Scalar(f32),
    Color([f32; 3]),
    Bool(bool),
    /// Opaque path or reference to an image
    Texture(String),
}

/// Format-agnostic material description; absent keys mean "use the default"
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMaterial {
    pub properties: BTreeMap<String, MaterialValue>,
}

impl CanonicalMaterial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: MaterialValue) -> &mut Self {
        self.properties.insert(key.to_string(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&MaterialValue> {
        self.properties.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn scalar(&self, key: &str) -> Option<f32> {
        match self.properties.get(key)? {
            MaterialValue::Scalar(v) => Some(*v),
            MaterialValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            MaterialValue::Color(c) => Some((c[0] + c[1] + c[2]) / 3.0),
            MaterialValue::Texture(_) => None,
        }
    }

    pub fn color(&self, key: &str) -> Option<[f32; 3]> {
        match self.properties.get(key)? {
            MaterialValue::Color(c) => Some(*c),
            MaterialValue::Scalar(v) => Some([*v; 3]),
            _ => None,
        }
    }

    pub fn texture(&self, key: &str) -> Option<&str> {
        match self.properties.get(key)? {
            MaterialValue::Texture(path) => Some(path),
            _ => None,
        }
    }

    /// Texture keys present, in key order
    pub fn textures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties.iter().filter_map(|(k, v)| match v {
            MaterialValue::Texture(path) => Some((k.as_str(), path.as_str())),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_coerce() {
        let mut material = CanonicalMaterial::new();
        material
            .set(keys::SPECULAR, MaterialValue::Color([0.0, 0.3, 0.6]))
            .set(keys::METALLIC, MaterialValue::Scalar(0.25))
            .set(keys::NORMAL_MAP, MaterialValue::Texture("n.png".into()));

        assert!((material.scalar(keys::SPECULAR).unwrap() - 0.3).abs() < 1e-6);
        assert_eq!(material.color(keys::METALLIC), Some([0.25; 3]));
        assert_eq!(material.texture(keys::NORMAL_MAP), Some("n.png"));
        assert_eq!(material.scalar(keys::NORMAL_MAP), None);
        assert_eq!(material.textures().count(), 1);
    }
}
