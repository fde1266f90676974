//! Conversion options
//!
//! Options are built once per request, optionally from a JSON file, and
//! passed by reference through the whole conversion.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use glam::DVec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading an options file
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("cannot read options file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid options file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown value `{value}` for {field}")]
    UnknownValue { field: &'static str, value: String },
}

/// Scene up axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UpAxis {
    #[default]
    Y,
    Z,
}

impl UpAxis {
    pub fn token(&self) -> &'static str {
        match self {
            UpAxis::Y => "Y",
            UpAxis::Z => "Z",
        }
    }
}

impl fmt::Display for UpAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for UpAxis {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "Y" => Ok(UpAxis::Y),
            "Z" => Ok(UpAxis::Z),
            _ => Err(OptionsError::UnknownValue {
                field: "up_axis",
                value: s.to_string(),
            }),
        }
    }
}

/// Requested shading convention for generated materials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MaterialShaderType {
    #[default]
    Auto,
    UsdPreviewSurface,
    MaterialX,
    XMaterial,
    Karma,
    Nuke,
    Blender,
    #[serde(rename = "GlTF_PBR")]
    GltfPbr,
}

impl MaterialShaderType {
    pub const ALL: [MaterialShaderType; 8] = [
        MaterialShaderType::Auto,
        MaterialShaderType::UsdPreviewSurface,
        MaterialShaderType::MaterialX,
        MaterialShaderType::XMaterial,
        MaterialShaderType::Karma,
        MaterialShaderType::Nuke,
        MaterialShaderType::Blender,
        MaterialShaderType::GltfPbr,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MaterialShaderType::Auto => "auto",
            MaterialShaderType::UsdPreviewSurface => "UsdPreviewSurface",
            MaterialShaderType::MaterialX => "MaterialX",
            MaterialShaderType::XMaterial => "XMaterial",
            MaterialShaderType::Karma => "Karma",
            MaterialShaderType::Nuke => "Nuke",
            MaterialShaderType::Blender => "Blender",
            MaterialShaderType::GltfPbr => "GlTF_PBR",
        }
    }
}

impl fmt::Display for MaterialShaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MaterialShaderType {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|t| t.name().to_ascii_lowercase() == wanted)
            .or(match wanted.as_str() {
                "preview" | "usd_preview_surface" => Some(MaterialShaderType::UsdPreviewSurface),
                "gltf" | "gltfpbr" => Some(MaterialShaderType::GltfPbr),
                "mtlx" => Some(MaterialShaderType::MaterialX),
                _ => None,
            })
            .ok_or_else(|| OptionsError::UnknownValue {
                field: "material_shader_type",
                value: s.to_string(),
            })
    }
}

/// Settings for one conversion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionOptions {
    pub up_axis: UpAxis,
    pub meters_per_unit: f64,
    pub scale: f64,
    pub flip_y: bool,
    pub flip_z: bool,

    pub export_materials: bool,
    pub export_normals: bool,
    pub export_uvs: bool,
    pub export_colors: bool,
    pub material_shader_type: MaterialShaderType,
    pub validate_materials: bool,

    pub time_samples: bool,
    pub start_frame: f64,
    pub end_frame: f64,
    pub fps: f64,

    pub default_prim_name: String,
    pub merge_meshes: bool,
    pub preserve_hierarchy: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            up_axis: UpAxis::Y,
            meters_per_unit: 1.0,
            scale: 1.0,
            flip_y: false,
            flip_z: false,
            export_materials: true,
            export_normals: true,
            export_uvs: true,
            export_colors: true,
            material_shader_type: MaterialShaderType::Auto,
            validate_materials: true,
            time_samples: true,
            start_frame: 0.0,
            end_frame: 100.0,
            fps: 24.0,
            default_prim_name: "World".to_string(),
            merge_meshes: false,
            preserve_hierarchy: true,
        }
    }
}

impl ConversionOptions {
    /// Loads options from a JSON file; missing fields keep their defaults
    pub fn load(path: &Path) -> Result<Self, OptionsError> {
        let text = std::fs::read_to_string(path).map_err(|source| OptionsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| OptionsError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes options as pretty JSON
    pub fn save(&self, path: &Path) -> Result<(), OptionsError> {
        let io_err = |source| OptionsError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let text = serde_json::to_string_pretty(self).map_err(|source| OptionsError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, text).map_err(io_err)
    }

    /// Per-user options file, `<config dir>/stagehand/options.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("stagehand").join("options.json"))
    }

    /// Loads the per-user options file if present, otherwise defaults
    pub fn load_or_default() -> Result<Self, OptionsError> {
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Scale correction applied as a transform op on the root prim
    pub fn correction_scale(&self) -> DVec3 {
        let s = self.scale;
        DVec3::new(
            s,
            if self.flip_y { -s } else { s },
            if self.flip_z { -s } else { s },
        )
    }

    /// Path of the root prim written by the mesh writers
    pub fn root_path(&self) -> String {
        format!("/{}", self.default_prim_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ConversionOptions::default();
        assert_eq!(options.up_axis, UpAxis::Y);
        assert_eq!(options.meters_per_unit, 1.0);
        assert_eq!(options.fps, 24.0);
        assert_eq!(options.end_frame, 100.0);
        assert_eq!(options.material_shader_type, MaterialShaderType::Auto);
        assert_eq!(options.correction_scale(), DVec3::ONE);
        assert_eq!(options.root_path(), "/World");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let options: ConversionOptions =
            serde_json::from_str(r#"{"up_axis": "Z", "material_shader_type": "GlTF_PBR"}"#).unwrap();
        assert_eq!(options.up_axis, UpAxis::Z);
        assert_eq!(options.material_shader_type, MaterialShaderType::GltfPbr);
        assert!(options.export_normals);
        assert_eq!(options.scale, 1.0);
    }

    #[test]
    fn test_parse_shader_type() {
        assert_eq!("karma".parse::<MaterialShaderType>().unwrap(), MaterialShaderType::Karma);
        assert_eq!("gltf_pbr".parse::<MaterialShaderType>().unwrap(), MaterialShaderType::GltfPbr);
        assert_eq!("mtlx".parse::<MaterialShaderType>().unwrap(), MaterialShaderType::MaterialX);
        assert!("toon".parse::<MaterialShaderType>().is_err());
        assert_eq!("z".parse::<UpAxis>().unwrap(), UpAxis::Z);
    }

    #[test]
    fn test_flip_scale() {
        let options = ConversionOptions {
            scale: 2.0,
            flip_z: true,
            ..Default::default()
        };
        assert_eq!(options.correction_scale(), DVec3::new(2.0, 2.0, -2.0));
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("stagehand-options-{}", std::process::id()));
        let path = dir.join("options.json");
        let options = ConversionOptions {
            fps: 30.0,
            default_prim_name: "Root".into(),
            ..Default::default()
        };
        options.save(&path).unwrap();
        assert_eq!(ConversionOptions::load(&path).unwrap(), options);
        let _ = std::fs::remove_dir_all(dir);
    }
}
