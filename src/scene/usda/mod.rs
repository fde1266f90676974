//! Pure Rust scene backend writing USDA text

mod reader;
mod token;
mod writer;

use std::path::Path;

use crate::error::SceneError;
use crate::scene::memory::MemoryStage;
use crate::scene::plugin::PluginRegistry;
use crate::scene::{SceneBackend, Stage};

pub use reader::parse_stage;
pub use writer::write_stage;

/// Extensions this backend can write
const WRITABLE_EXTENSIONS: [&str; 2] = ["usda", "usd"];

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Rejects output paths that would need a binary layer
pub fn check_writable(path: &Path) -> Result<(), SceneError> {
    let ext = extension(path);
    if WRITABLE_EXTENSIONS.contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(SceneError::FormatNotSupported(format!(
            ".{} output needs the `usd` feature; the text backend writes .usda and .usd",
            ext
        )))
    }
}

/// Scene backend storing stages in memory and persisting them as USDA text
#[derive(Default)]
pub struct UsdaBackend {
    plugins: PluginRegistry,
}

impl UsdaBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that can additionally open formats handled by `plugins`
    pub fn with_plugins(plugins: PluginRegistry) -> Self {
        Self { plugins }
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Opens a layer as a concrete in-memory stage
    pub fn open_memory(&self, path: &Path) -> Result<MemoryStage, SceneError> {
        let ext = extension(path);
        if WRITABLE_EXTENSIONS.contains(&ext.as_str()) {
            let text = std::fs::read_to_string(path).map_err(|e| SceneError::io(path, e))?;
            return parse_stage(&text, path);
        }
        match self.plugins.for_extension(&ext) {
            Some(plugin) => {
                log::debug!("opening {} with plugin {}", path.display(), plugin.name());
                plugin.read(path)
            }
            None => Err(SceneError::FormatNotSupported(format!(
                "no file format plugin for .{} files",
                ext
            ))),
        }
    }
}

impl SceneBackend for UsdaBackend {
    fn name(&self) -> &'static str {
        "usda"
    }

    fn create_new(&self, path: &Path) -> Result<Box<dyn Stage>, SceneError> {
        check_writable(path)?;
        Ok(Box::new(MemoryStage::new(path)))
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Stage>, SceneError> {
        Ok(Box::new(self.open_memory(path)?))
    }

    fn has_plugin(&self, name: &str) -> bool {
        self.plugins.contains(name)
    }

    /// MaterialX shaders are authored as plain shader ids, so they are always available
    fn supports_materialx(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::value::AttributeValue;
    use crate::scene::{StageMetadata, TimeCode};
    use glam::{DMat4, DVec3, Vec2, Vec3};

    fn sample_stage() -> MemoryStage {
        let mut stage = MemoryStage::new("sample.usda");
        stage
            .set_metadata(StageMetadata {
                up_axis: Some("Z".into()),
                meters_per_unit: Some(0.01),
                start_time_code: Some(1.0),
                end_time_code: Some(24.0),
                frames_per_second: Some(24.0),
                default_prim: Some("World".into()),
                sublayers: vec!["./anim.usda".into()],
                ..Default::default()
            })
            .unwrap();
        stage.define_prim("/World", "Xform").unwrap();
        stage
            .set_attribute(
                "/World",
                "xformOp:transform",
                AttributeValue::Matrix4d(DMat4::from_translation(DVec3::new(1.0, 2.0, 3.0))),
                TimeCode::Default,
            )
            .unwrap();
        stage
            .set_attribute(
                "/World",
                "xformOpOrder",
                AttributeValue::TokenArray(vec!["xformOp:transform".into()]),
                TimeCode::Default,
            )
            .unwrap();

        stage.define_prim("/World/Mesh", "Mesh").unwrap();
        stage
            .set_attribute(
                "/World/Mesh",
                "points",
                AttributeValue::Point3fArray(vec![Vec3::ZERO, Vec3::X, Vec3::new(0.0, 1.5, -2.25)]),
                TimeCode::Default,
            )
            .unwrap();
        stage
            .set_attribute("/World/Mesh", "points", AttributeValue::Point3fArray(vec![Vec3::ONE]), TimeCode::At(2.0))
            .unwrap();
        stage
            .set_attribute("/World/Mesh", "faceVertexCounts", AttributeValue::IntArray(vec![3]), TimeCode::Default)
            .unwrap();
        stage
            .set_attribute(
                "/World/Mesh",
                "primvars:st",
                AttributeValue::TexCoord2fArray(vec![Vec2::new(0.0, 0.5)]),
                TimeCode::Default,
            )
            .unwrap();
        stage
            .set_attribute_metadata("/World/Mesh", "primvars:st", "interpolation", "faceVarying")
            .unwrap();
        stage
            .set_relationship_targets("/World/Mesh", "material:binding", &["/World/Materials/Red".into()])
            .unwrap();

        stage.define_prim("/World/Materials/Red", "Material").unwrap();
        stage
            .set_connection(
                "/World/Materials/Red",
                "outputs:surface",
                "token",
                "/World/Materials/Red/Surface.outputs:surface",
            )
            .unwrap();
        stage
            .set_prim_metadata("/World/Materials/Red", "houdini:material", "karma")
            .unwrap();
        stage.define_prim("/World/Materials/Red/Surface", "Shader").unwrap();
        stage
            .set_attribute(
                "/World/Materials/Red/Surface",
                "info:id",
                AttributeValue::Token("UsdPreviewSurface".into()),
                TimeCode::Default,
            )
            .unwrap();
        stage
            .set_attribute(
                "/World/Materials/Red/Surface",
                "inputs:file",
                AttributeValue::Asset("textures/red \"v2\".png".into()),
                TimeCode::Default,
            )
            .unwrap();
        stage
            .declare_attribute("/World/Materials/Red/Surface", "outputs:surface", "token")
            .unwrap();
        stage
    }

    #[test]
    fn test_writer_output_shape() {
        let text = sample_stage().to_usda();
        assert!(text.starts_with("#usda 1.0\n("));
        assert!(text.contains("upAxis = \"Z\""));
        assert!(text.contains("metersPerUnit = 0.01"));
        assert!(text.contains("def Mesh \"Mesh\""));
        assert!(text.contains("int[] faceVertexCounts = [3]"));
        assert!(text.contains("uniform token info:id = \"UsdPreviewSurface\""));
        assert!(text.contains("rel material:binding = </World/Materials/Red>"));
        assert!(text.contains("token outputs:surface.connect = </World/Materials/Red/Surface.outputs:surface>"));
        assert!(text.contains("interpolation = \"faceVarying\""));
        assert!(text.contains("string \"houdini:material\" = \"karma\""));
        assert!(text.contains("( (1, 0, 0, 0), (0, 1, 0, 0), (0, 0, 1, 0), (1, 2, 3, 1) )"));
    }

    #[test]
    fn test_parse_written_stage() {
        let stage = sample_stage();
        let parsed = parse_stage(&stage.to_usda(), Path::new("sample.usda")).unwrap();
        assert_eq!(parsed, stage);
    }

    #[test]
    fn test_parse_foreign_layer() {
        let text = r#"#usda 1.0
(
    doc = """Exported by
    another tool"""
    upAxis = "Y"
)

def Xform "Root" (
    kind = "component"
    prepend apiSchemas = ["MaterialBindingAPI"]
)
{
    custom double weight = 0.5
    float3[] extent = [(-1, -1, -1), (1, 1, 1)]
    bool visible = true
    rel proxyPrim
    def "Child"
    {
        float inputs:roughness.timeSamples = {
            0: 0.25,
            10: 1e-2,
        }
    }
}
"#;
        let stage = parse_stage(text, Path::new("foreign.usda")).unwrap();
        assert_eq!(stage.metadata.doc.as_deref(), Some("Exported by\n    another tool"));
        assert_eq!(stage.prim_type("/Root").as_deref(), Some("Xform"));
        assert_eq!(stage.attribute("/Root", "weight", TimeCode::Default), Some(AttributeValue::Double(0.5)));
        assert_eq!(stage.attribute("/Root", "visible", TimeCode::Default), Some(AttributeValue::Bool(true)));
        assert!(stage.relationship_names("/Root").contains(&"proxyPrim".to_string()));
        assert_eq!(stage.time_samples("/Root/Child", "inputs:roughness"), vec![0.0, 10.0]);
        assert_eq!(
            stage.attribute("/Root/Child", "inputs:roughness", TimeCode::At(10.0)),
            Some(AttributeValue::Float(0.01))
        );
    }

    #[test]
    fn test_parse_errors_report_line() {
        let err = parse_stage("#usda 1.0\n\ndef Mesh \"M\"\n{\n    float x = (1, 2)\n}\n", Path::new("bad.usda"))
            .unwrap_err();
        assert!(matches!(err, SceneError::Parse { line: 5, .. }));
        assert!(parse_stage("not usd", Path::new("bad.usda")).is_err());
    }

    #[test]
    fn test_binary_outputs_rejected() {
        let backend = UsdaBackend::new();
        assert!(matches!(
            backend.create_new(Path::new("out.usdc")),
            Err(SceneError::FormatNotSupported(_))
        ));
        assert!(backend.create_new(Path::new("out.usd")).is_ok());
    }

    #[test]
    fn test_open_without_plugin_fails() {
        let backend = UsdaBackend::new();
        assert!(!backend.has_plugin("usdAbc"));
        assert!(matches!(
            backend.open(Path::new("missing.abc")),
            Err(SceneError::FormatNotSupported(_))
        ));
    }
}
