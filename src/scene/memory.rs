//! In-memory stage
//!
//! Holds a single layer as a tree of prim specs. The USDA backend reads
//! into and writes out of this structure.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::error::SceneError;

use super::usda;
use super::value::AttributeValue;
use super::{child_path, is_valid_prim_path, parent_path, prim_name, Stage, StageMetadata, TimeCode};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSpec {
    pub type_name: String,
    pub default: Option<AttributeValue>,
    /// Sorted by time
    pub samples: Vec<(f64, AttributeValue)>,
    pub connection: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrimSpec {
    pub type_name: String,
    /// Child names in authoring order
    pub children: Vec<String>,
    pub attributes: BTreeMap<String, AttributeSpec>,
    pub relationships: BTreeMap<String, Vec<String>>,
    pub metadata: BTreeMap<String, String>,
}

/// A stage held entirely in memory
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryStage {
    identifier: PathBuf,
    pub metadata: StageMetadata,
    prims: HashMap<String, PrimSpec>,
}

impl MemoryStage {
    /// Creates an empty stage whose root layer will be saved to `identifier`
    pub fn new(identifier: impl Into<PathBuf>) -> Self {
        let mut prims = HashMap::new();
        prims.insert("/".to_string(), PrimSpec::default());
        Self {
            identifier: identifier.into(),
            metadata: StageMetadata::default(),
            prims,
        }
    }

    pub fn identifier_path(&self) -> &Path {
        &self.identifier
    }

    pub fn prim(&self, path: &str) -> Option<&PrimSpec> {
        self.prims.get(path)
    }

    fn prim_mut(&mut self, path: &str) -> Result<&mut PrimSpec, SceneError> {
        self.prims
            .get_mut(path)
            .ok_or_else(|| SceneError::NoSuchPrim(path.to_string()))
    }

    fn attribute_spec_mut(&mut self, prim: &str, name: &str, type_name: &str) -> Result<&mut AttributeSpec, SceneError> {
        let spec = self.prim_mut(prim)?;
        let attr = spec.attributes.entry(name.to_string()).or_default();
        if attr.type_name.is_empty() {
            attr.type_name = type_name.to_string();
        }
        Ok(attr)
    }

    fn attribute_spec(&self, prim: &str, name: &str) -> Option<&AttributeSpec> {
        self.prims.get(prim).and_then(|p| p.attributes.get(name))
    }

    /// Serializes the layer as USDA text
    pub fn to_usda(&self) -> String {
        usda::write_stage(self)
    }
}

impl Stage for MemoryStage {
    fn identifier(&self) -> String {
        self.identifier.to_string_lossy().into_owned()
    }

    fn metadata(&self) -> StageMetadata {
        self.metadata.clone()
    }

    fn set_metadata(&mut self, metadata: StageMetadata) -> Result<(), SceneError> {
        self.metadata = metadata;
        Ok(())
    }

    fn define_prim(&mut self, path: &str, type_name: &str) -> Result<(), SceneError> {
        if !is_valid_prim_path(path) {
            return Err(SceneError::InvalidPath(path.to_string()));
        }
        if !self.prims.contains_key(path) {
            let parent = parent_path(path).to_string();
            if !self.prims.contains_key(&parent) {
                self.define_prim(&parent, "")?;
            }
            self.prim_mut(&parent)?.children.push(prim_name(path).to_string());
            self.prims.insert(path.to_string(), PrimSpec::default());
        }
        if !type_name.is_empty() {
            self.prim_mut(path)?.type_name = type_name.to_string();
        }
        Ok(())
    }

    fn remove_prim(&mut self, path: &str) -> Result<(), SceneError> {
        if !self.prims.contains_key(path) || path == "/" {
            return Err(SceneError::NoSuchPrim(path.to_string()));
        }
        let name = prim_name(path).to_string();
        self.prim_mut(parent_path(path))?.children.retain(|c| *c != name);
        let prefix = format!("{}/", path);
        self.prims.retain(|p, _| p != path && !p.starts_with(&prefix));
        Ok(())
    }

    fn has_prim(&self, path: &str) -> bool {
        path != "/" && self.prims.contains_key(path)
    }

    fn prim_type(&self, path: &str) -> Option<String> {
        self.prims.get(path).map(|p| p.type_name.clone())
    }

    fn prim_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        let mut stack: Vec<String> = self.children("/").into_iter().rev().collect();
        while let Some(path) = stack.pop() {
            stack.extend(self.children(&path).into_iter().rev());
            paths.push(path);
        }
        paths
    }

    fn children(&self, path: &str) -> Vec<String> {
        self.prims
            .get(path)
            .map(|p| p.children.iter().map(|c| child_path(path, c)).collect())
            .unwrap_or_default()
    }

    fn declare_attribute(&mut self, prim: &str, name: &str, type_name: &str) -> Result<(), SceneError> {
        self.attribute_spec_mut(prim, name, type_name)?;
        Ok(())
    }

    fn set_attribute(&mut self, prim: &str, name: &str, value: AttributeValue, time: TimeCode) -> Result<(), SceneError> {
        let attr = self.attribute_spec_mut(prim, name, value.type_name())?;
        match time {
            TimeCode::Default => attr.default = Some(value),
            TimeCode::At(t) => match attr.samples.binary_search_by(|(s, _)| s.total_cmp(&t)) {
                Ok(i) => attr.samples[i].1 = value,
                Err(i) => attr.samples.insert(i, (t, value)),
            },
        }
        Ok(())
    }

    fn attribute(&self, prim: &str, name: &str, time: TimeCode) -> Option<AttributeValue> {
        let attr = self.attribute_spec(prim, name)?;
        match time {
            TimeCode::Default => attr.default.clone(),
            TimeCode::At(t) => {
                if attr.samples.is_empty() {
                    return attr.default.clone();
                }
                // Held interpolation: the last sample at or before `t`
                let index = attr.samples.partition_point(|(s, _)| *s <= t);
                let index = index.saturating_sub(1);
                attr.samples.get(index).map(|(_, v)| v.clone())
            }
        }
    }

    fn time_samples(&self, prim: &str, name: &str) -> Vec<f64> {
        self.attribute_spec(prim, name)
            .map(|a| a.samples.iter().map(|(t, _)| *t).collect())
            .unwrap_or_default()
    }

    fn attribute_names(&self, prim: &str) -> Vec<String> {
        self.prims
            .get(prim)
            .map(|p| p.attributes.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn attribute_type(&self, prim: &str, name: &str) -> Option<String> {
        self.attribute_spec(prim, name).map(|a| a.type_name.clone())
    }

    fn set_attribute_metadata(&mut self, prim: &str, name: &str, key: &str, value: &str) -> Result<(), SceneError> {
        let attr = self
            .prim_mut(prim)?
            .attributes
            .get_mut(name)
            .ok_or_else(|| SceneError::Backend(format!("no attribute {} on {}", name, prim)))?;
        attr.metadata.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn attribute_metadata(&self, prim: &str, name: &str, key: &str) -> Option<String> {
        self.attribute_spec(prim, name)
            .and_then(|a| a.metadata.get(key).cloned())
    }

    fn set_connection(&mut self, prim: &str, name: &str, type_name: &str, source: &str) -> Result<(), SceneError> {
        let attr = self.attribute_spec_mut(prim, name, type_name)?;
        attr.connection = Some(source.to_string());
        Ok(())
    }

    fn connection(&self, prim: &str, name: &str) -> Option<String> {
        self.attribute_spec(prim, name).and_then(|a| a.connection.clone())
    }

    fn set_relationship_targets(&mut self, prim: &str, name: &str, targets: &[String]) -> Result<(), SceneError> {
        self.prim_mut(prim)?
            .relationships
            .insert(name.to_string(), targets.to_vec());
        Ok(())
    }

    fn relationship_targets(&self, prim: &str, name: &str) -> Vec<String> {
        self.prims
            .get(prim)
            .and_then(|p| p.relationships.get(name).cloned())
            .unwrap_or_default()
    }

    fn relationship_names(&self, prim: &str) -> Vec<String> {
        self.prims
            .get(prim)
            .map(|p| p.relationships.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn set_prim_metadata(&mut self, prim: &str, key: &str, value: &str) -> Result<(), SceneError> {
        self.prim_mut(prim)?
            .metadata
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn prim_metadata(&self, prim: &str, key: &str) -> Option<String> {
        self.prims.get(prim).and_then(|p| p.metadata.get(key).cloned())
    }

    fn prim_metadata_keys(&self, prim: &str) -> Vec<String> {
        self.prims
            .get(prim)
            .map(|p| p.metadata.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn save(&mut self) -> Result<(), SceneError> {
        let path = self.identifier.clone();
        self.export(&path)
    }

    fn export(&self, path: &Path) -> Result<(), SceneError> {
        usda::check_writable(path)?;
        std::fs::write(path, self.to_usda()).map_err(|e| SceneError::io(path, e))
    }
}
