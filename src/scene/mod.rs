//! Scene capability
//!
//! The conversion pipeline reads and writes scenes only through the
//! [`Stage`] and [`SceneBackend`] traits. `UsdaBackend` is a pure Rust
//! implementation writing USDA text; with the `usd` feature the `python`
//! adapter drives the `pxr` library instead.

pub mod memory;
pub mod plugin;
pub mod usda;
pub mod value;

#[cfg(feature = "usd")]
pub mod python;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SceneError;

pub use memory::MemoryStage;
pub use plugin::{FileFormatPlugin, PluginRegistry};
pub use usda::UsdaBackend;
pub use value::AttributeValue;

/// Time at which an attribute value is read or authored
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TimeCode {
    #[default]
    Default,
    At(f64),
}

/// Layer-level metadata of a stage
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StageMetadata {
    pub up_axis: Option<String>,
    pub meters_per_unit: Option<f64>,
    pub start_time_code: Option<f64>,
    pub end_time_code: Option<f64>,
    pub frames_per_second: Option<f64>,
    pub time_codes_per_second: Option<f64>,
    pub default_prim: Option<String>,
    pub doc: Option<String>,
    pub sublayers: Vec<String>,
}

impl StageMetadata {
    /// True when the stage spans a non-degenerate time range
    pub fn has_animation(&self) -> bool {
        matches!((self.start_time_code, self.end_time_code), (Some(s), Some(e)) if s != e)
    }
}

/// An open scene
pub trait Stage {
    /// Path of the root layer
    fn identifier(&self) -> String;

    fn metadata(&self) -> StageMetadata;
    fn set_metadata(&mut self, metadata: StageMetadata) -> Result<(), SceneError>;

    /// Defines a prim, creating untyped ancestors as needed
    fn define_prim(&mut self, path: &str, type_name: &str) -> Result<(), SceneError>;
    fn remove_prim(&mut self, path: &str) -> Result<(), SceneError>;
    fn has_prim(&self, path: &str) -> bool;
    fn prim_type(&self, path: &str) -> Option<String>;
    /// All prims, depth first, excluding the pseudo-root
    fn prim_paths(&self) -> Vec<String>;
    fn children(&self, path: &str) -> Vec<String>;

    /// Declares a typed attribute without authoring a value
    fn declare_attribute(&mut self, prim: &str, name: &str, type_name: &str) -> Result<(), SceneError>;
    fn set_attribute(
        &mut self,
        prim: &str,
        name: &str,
        value: AttributeValue,
        time: TimeCode,
    ) -> Result<(), SceneError>;
    fn attribute(&self, prim: &str, name: &str, time: TimeCode) -> Option<AttributeValue>;
    fn time_samples(&self, prim: &str, name: &str) -> Vec<f64>;
    fn attribute_names(&self, prim: &str) -> Vec<String>;
    fn attribute_type(&self, prim: &str, name: &str) -> Option<String>;
    fn has_attribute(&self, prim: &str, name: &str) -> bool {
        self.attribute_type(prim, name).is_some()
    }
    fn set_attribute_metadata(&mut self, prim: &str, name: &str, key: &str, value: &str) -> Result<(), SceneError>;
    fn attribute_metadata(&self, prim: &str, name: &str, key: &str) -> Option<String>;

    /// Connects an attribute to `source`, a property path such as `/Mat/Shader.outputs:surface`
    fn set_connection(&mut self, prim: &str, name: &str, type_name: &str, source: &str) -> Result<(), SceneError>;
    fn connection(&self, prim: &str, name: &str) -> Option<String>;

    fn set_relationship_targets(&mut self, prim: &str, name: &str, targets: &[String]) -> Result<(), SceneError>;
    fn relationship_targets(&self, prim: &str, name: &str) -> Vec<String>;
    fn relationship_names(&self, prim: &str) -> Vec<String>;

    fn set_prim_metadata(&mut self, prim: &str, key: &str, value: &str) -> Result<(), SceneError>;
    fn prim_metadata(&self, prim: &str, key: &str) -> Option<String>;
    fn prim_metadata_keys(&self, prim: &str) -> Vec<String>;

    /// Writes the root layer back to its identifier
    fn save(&mut self) -> Result<(), SceneError>;
    /// Writes a flattened copy of the stage to `path`
    fn export(&self, path: &Path) -> Result<(), SceneError>;
}

/// Factory for stages backed by one scene engine
pub trait SceneBackend {
    fn name(&self) -> &'static str;
    fn create_new(&self, path: &Path) -> Result<Box<dyn Stage>, SceneError>;
    fn open(&self, path: &Path) -> Result<Box<dyn Stage>, SceneError>;
    /// Whether a file format plugin such as `usdAbc` is loaded
    fn has_plugin(&self, name: &str) -> bool;
    fn supports_materialx(&self) -> bool;
}

/// Copies every prim, attribute and relationship from `source` into `dest`.
///
/// With `all_samples` every time sample is carried over; otherwise each
/// attribute is reduced to its default value, falling back to its earliest
/// sample.
pub fn copy_prim_tree(source: &dyn Stage, dest: &mut dyn Stage, all_samples: bool) -> Result<(), SceneError> {
    for path in source.prim_paths() {
        let type_name = source.prim_type(&path).unwrap_or_default();
        dest.define_prim(&path, &type_name)?;

        for key in source.prim_metadata_keys(&path) {
            if let Some(value) = source.prim_metadata(&path, &key) {
                dest.set_prim_metadata(&path, &key, &value)?;
            }
        }

        for name in source.attribute_names(&path) {
            let attr_type = source.attribute_type(&path, &name).unwrap_or_default();
            if let Some(target) = source.connection(&path, &name) {
                dest.set_connection(&path, &name, &attr_type, &target)?;
            }

            let samples = source.time_samples(&path, &name);
            match source.attribute(&path, &name, TimeCode::Default) {
                Some(value) => dest.set_attribute(&path, &name, value, TimeCode::Default)?,
                None if !all_samples => {
                    if let Some(value) = samples
                        .first()
                        .and_then(|t| source.attribute(&path, &name, TimeCode::At(*t)))
                    {
                        dest.set_attribute(&path, &name, value, TimeCode::Default)?;
                    }
                }
                None => {}
            }
            if all_samples {
                for time in samples {
                    if let Some(value) = source.attribute(&path, &name, TimeCode::At(time)) {
                        dest.set_attribute(&path, &name, value, TimeCode::At(time))?;
                    }
                }
            }
            if !dest.has_attribute(&path, &name) {
                dest.declare_attribute(&path, &name, &attr_type)?;
            }
            if let Some(interpolation) = source.attribute_metadata(&path, &name, "interpolation") {
                dest.set_attribute_metadata(&path, &name, "interpolation", &interpolation)?;
            }
        }

        for name in source.relationship_names(&path) {
            let targets = source.relationship_targets(&path, &name);
            dest.set_relationship_targets(&path, &name, &targets)?;
        }
    }
    Ok(())
}

/// Checks a prim path is absolute and made of identifier segments
pub fn is_valid_prim_path(path: &str) -> bool {
    let Some(rest) = path.strip_prefix('/') else {
        return false;
    };
    !rest.is_empty() && rest.split('/').all(is_identifier)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parent of a prim path; `/` for root prims
pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

pub fn prim_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

pub fn child_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Turns an arbitrary name into a valid prim identifier
pub fn sanitize_name(name: &str) -> String {
    let mut result = String::new();
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            if result.is_empty() && c.is_ascii_digit() {
                result.push('_');
            }
            result.push(c);
        } else if c == ' ' || c == '-' || c == '.' {
            result.push('_');
        }
    }
    if result.is_empty() {
        result = "unnamed".to_string();
    }
    result
}

/// Splits `/Prim.outputs:name` into prim path and property name
pub fn split_property_path(path: &str) -> Option<(&str, &str)> {
    let slash = path.rfind('/')?;
    let dot = path[slash..].find('.')? + slash;
    Some((&path[..dot], &path[dot + 1..]))
}
