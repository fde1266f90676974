//! Structural compatibility checks for authored materials

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::options::OptionsError;
use crate::scene::{split_property_path, Stage, TimeCode};

/// Issue severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        })
    }
}

/// One finding on a material or shader prim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialIssue {
    pub severity: Severity,
    pub message: String,
    pub target_path: String,
    pub property_name: Option<String>,
}

impl MaterialIssue {
    fn new(severity: Severity, message: impl Into<String>, target_path: &str) -> Self {
        Self {
            severity,
            message: message.into(),
            target_path: target_path.to_string(),
            property_name: None,
        }
    }

    fn on_property(mut self, property: &str) -> Self {
        self.property_name = Some(property.to_string());
        self
    }
}

impl fmt::Display for MaterialIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.target_path, self.message)?;
        if let Some(property) = &self.property_name {
            write!(f, " ({})", property)?;
        }
        Ok(())
    }
}

/// Renderer the materials are checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationTarget {
    #[default]
    Auto,
    Karma,
    Nuke,
    Generic,
}

impl FromStr for ValidationTarget {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ValidationTarget::Auto),
            "karma" | "houdini" => Ok(ValidationTarget::Karma),
            "nuke" => Ok(ValidationTarget::Nuke),
            "generic" => Ok(ValidationTarget::Generic),
            _ => Err(OptionsError::UnknownValue {
                field: "validation target",
                value: s.to_string(),
            }),
        }
    }
}

/// Checks material prims against a target renderer. Never fails; problems
/// found while inspecting become error issues.
#[derive(Debug, Clone, Default)]
pub struct MaterialValidator {
    target: ValidationTarget,
}

impl MaterialValidator {
    pub fn new(target: ValidationTarget) -> Self {
        Self { target }
    }

    pub fn target(&self) -> ValidationTarget {
        self.target
    }

    pub fn validate(&self, stage: &dyn Stage, material_path: &str) -> Vec<MaterialIssue> {
        let mut issues = Vec::new();

        if !stage.has_prim(material_path) {
            issues.push(MaterialIssue::new(Severity::Error, "Material prim does not exist", material_path));
            return issues;
        }
        if !stage.has_attribute(material_path, "outputs:surface") {
            issues.push(MaterialIssue::new(Severity::Error, "Material missing surface output", material_path));
            return issues;
        }
        let Some(source) = stage.connection(material_path, "outputs:surface") else {
            issues.push(MaterialIssue::new(
                Severity::Error,
                "Surface output not connected to shader",
                material_path,
            ));
            return issues;
        };

        let shader_path = split_property_path(&source).map(|(prim, _)| prim).unwrap_or(&source);
        if !stage.has_prim(shader_path) {
            issues.push(MaterialIssue::new(
                Severity::Error,
                format!("Surface output connected to missing shader {}", shader_path),
                material_path,
            ));
            return issues;
        }

        let shader_id = stage
            .attribute(shader_path, "info:id", TimeCode::Default)
            .and_then(|v| v.as_token().map(str::to_string))
            .unwrap_or_default();

        let renderer_target = matches!(
            self.target,
            ValidationTarget::Karma | ValidationTarget::Nuke | ValidationTarget::Auto
        );
        if shader_id.contains("UsdPreviewSurface") && renderer_target {
            issues.push(
                MaterialIssue::new(
                    Severity::Warning,
                    "Using UsdPreviewSurface instead of MaterialX (may not render correctly in Karma/Nuke)",
                    shader_path,
                )
                .on_property("id"),
            );
        }
        if shader_id.contains("standard_surface") && !stage.has_attribute(shader_path, "inputs:base_color") {
            issues.push(
                MaterialIssue::new(Severity::Warning, "MaterialX shader missing base_color input", shader_path)
                    .on_property("base_color"),
            );
        }

        match self.target {
            ValidationTarget::Karma if stage.prim_metadata(material_path, "houdini:material").is_none() => {
                issues.push(MaterialIssue::new(
                    Severity::Info,
                    "Material missing Houdini metadata (optional)",
                    material_path,
                ));
            }
            ValidationTarget::Nuke if stage.prim_metadata(material_path, "nuke:material").is_none() => {
                issues.push(MaterialIssue::new(
                    Severity::Info,
                    "Material missing Nuke metadata (optional)",
                    material_path,
                ));
            }
            _ => {}
        }
        issues
    }

    /// Issues for every Material prim, omitting materials with none
    pub fn validate_scene(&self, stage: &dyn Stage) -> BTreeMap<String, Vec<MaterialIssue>> {
        stage
            .prim_paths()
            .into_iter()
            .filter(|path| stage.prim_type(path).as_deref() == Some("Material"))
            .filter_map(|path| {
                let issues = self.validate(stage, &path);
                (!issues.is_empty()).then_some((path, issues))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::canonical::CanonicalMaterial;
    use crate::materials::creator::MaterialCreator;
    use crate::options::MaterialShaderType;
    use crate::scene::MemoryStage;

    fn stage_with(shader_type: MaterialShaderType) -> MemoryStage {
        let mut stage = MemoryStage::new("validate.usda");
        MaterialCreator::new(shader_type, true)
            .create_material(&mut stage, "/World/Materials/M", &CanonicalMaterial::new())
            .unwrap();
        stage
    }

    #[test]
    fn test_unconnected_surface_is_single_error() {
        let mut stage = MemoryStage::new("validate.usda");
        stage.define_prim("/World/Materials/M", "Material").unwrap();
        stage.declare_attribute("/World/Materials/M", "outputs:surface", "token").unwrap();

        for target in [ValidationTarget::Auto, ValidationTarget::Karma, ValidationTarget::Generic] {
            let issues = MaterialValidator::new(target).validate(&stage, "/World/Materials/M");
            assert_eq!(issues.len(), 1);
            assert_eq!(issues[0].severity, Severity::Error);
            assert_eq!(issues[0].message, "Surface output not connected to shader");
        }
    }

    #[test]
    fn test_missing_surface_output() {
        let mut stage = MemoryStage::new("validate.usda");
        stage.define_prim("/M", "Material").unwrap();
        let issues = MaterialValidator::default().validate(&stage, "/M");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].message, "Material missing surface output");
    }

    #[test]
    fn test_dangling_connection_is_error() {
        let mut stage = MemoryStage::new("validate.usda");
        stage.define_prim("/M", "Material").unwrap();
        stage
            .set_connection("/M", "outputs:surface", "token", "/M/Gone.outputs:surface")
            .unwrap();
        let issues = MaterialValidator::new(ValidationTarget::Generic).validate(&stage, "/M");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Error);
    }

    #[test]
    fn test_preview_surface_warns_for_renderers() {
        let stage = stage_with(MaterialShaderType::UsdPreviewSurface);
        let issues = MaterialValidator::new(ValidationTarget::Nuke).validate(&stage, "/World/Materials/M");
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert_eq!(issues[0].property_name.as_deref(), Some("id"));
        assert_eq!(issues[0].target_path, "/World/Materials/M/PreviewSurface");
        assert_eq!(issues[1].severity, Severity::Info);

        assert!(MaterialValidator::new(ValidationTarget::Generic)
            .validate(&stage, "/World/Materials/M")
            .is_empty());
    }

    #[test]
    fn test_karma_material_is_clean() {
        let stage = stage_with(MaterialShaderType::Karma);
        let validator = MaterialValidator::new(ValidationTarget::Karma);
        assert!(validator.validate(&stage, "/World/Materials/M").is_empty());

        let nuke = MaterialValidator::new(ValidationTarget::Nuke).validate(&stage, "/World/Materials/M");
        assert_eq!(nuke.len(), 1);
        assert_eq!(nuke[0].message, "Material missing Nuke metadata (optional)");
    }

    #[test]
    fn test_standard_surface_without_base_color() {
        let mut stage = MemoryStage::new("validate.usda");
        stage.define_prim("/M/S", "Shader").unwrap();
        stage
            .set_attribute(
                "/M/S",
                "info:id",
                crate::scene::AttributeValue::Token("ND_standard_surface_surfaceshader".into()),
                TimeCode::Default,
            )
            .unwrap();
        stage.define_prim("/M", "Material").unwrap();
        stage.set_connection("/M", "outputs:surface", "token", "/M/S.outputs:out").unwrap();

        let issues = MaterialValidator::new(ValidationTarget::Generic).validate(&stage, "/M");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].property_name.as_deref(), Some("base_color"));
    }

    #[test]
    fn test_validate_scene_omits_clean_materials() {
        let mut stage = stage_with(MaterialShaderType::MaterialX);
        stage.define_prim("/World/Materials/Broken", "Material").unwrap();
        let report = MaterialValidator::new(ValidationTarget::Generic).validate_scene(&stage);
        assert_eq!(report.len(), 1);
        assert!(report.contains_key("/World/Materials/Broken"));
    }
}
