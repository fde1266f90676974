//! Conversion pipeline
//!
//! [`USDConverter`] dispatches an input file by extension to an ordered
//! [`StrategyChain`]. Each strategy either writes the output itself or
//! fails, in which case the next one is tried.

pub mod alembic;
pub mod external;
pub mod fbx;
pub mod gltf;
pub mod mesh_library;
pub mod native;
#[cfg(feature = "usd")]
pub mod python_sdk;
pub mod source;
pub mod strategy;
pub mod writer;

use std::collections::HashMap;
use std::path::Path;

use crate::error::ConversionError;
use crate::options::ConversionOptions;
use crate::progress::Progress;
use crate::scene::{SceneBackend, UsdaBackend};

pub use external::ToolPaths;
pub use source::SourceScene;
pub use strategy::{ConversionJob, ConversionStrategy, FnStrategy, StrategyChain};
pub use writer::SceneWriter;

/// Input extensions and what they are
pub const SUPPORTED_FORMATS: [(&str, &str); 10] = [
    ("fbx", "Autodesk FBX"),
    ("obj", "Wavefront OBJ"),
    ("abc", "Alembic"),
    ("gltf", "glTF 2.0"),
    ("glb", "glTF 2.0 binary"),
    ("stl", "Stereolithography"),
    ("ply", "Stanford PLY"),
    ("dae", "Collada"),
    ("3ds", "3D Studio"),
    ("blend", "Blender"),
];

/// Extensions sharing the OBJ chain
const MESH_LIBRARY_ALIASES: [&str; 2] = ["dae", "3ds"];

fn extension(path: &Path) -> Option<String> {
    path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase())
}

pub fn is_supported(path: &Path) -> bool {
    extension(path).is_some_and(|ext| SUPPORTED_FORMATS.iter().any(|(e, _)| *e == ext))
}

/// The USD engine used unless one is supplied: `pxr` when built with the
/// `usd` feature and importable, the text backend otherwise
pub fn default_backend() -> Box<dyn SceneBackend> {
    #[cfg(feature = "usd")]
    {
        match crate::scene::python::PyUsdBackend::new() {
            Ok(backend) => return Box::new(backend),
            Err(e) => log::warn!("USD Python bindings unavailable, using the USDA backend: {}", e),
        }
    }
    Box::new(UsdaBackend::new())
}

/// Converts supported files to USD
pub struct USDConverter {
    options: ConversionOptions,
    backend: Box<dyn SceneBackend>,
    tools: ToolPaths,
    chains: HashMap<String, StrategyChain>,
}

impl USDConverter {
    /// Converter using the base FBX and Alembic chains
    pub fn new(options: ConversionOptions) -> Self {
        let chains = Self::chains(fbx::base_chain(), alembic::base_chain());
        Self::with_chains(options, chains)
    }

    /// Converter trying plugin-specific and standalone tools first
    pub fn enhanced(options: ConversionOptions) -> Self {
        let chains = Self::chains(fbx::enhanced_chain(), alembic::enhanced_chain(options.time_samples));
        Self::with_chains(options, chains)
    }

    fn with_chains(options: ConversionOptions, chains: HashMap<String, StrategyChain>) -> Self {
        Self {
            options,
            backend: default_backend(),
            tools: ToolPaths::from_env(),
            chains,
        }
    }

    fn chains(fbx: StrategyChain, alembic: StrategyChain) -> HashMap<String, StrategyChain> {
        let mut chains = HashMap::new();
        chains.insert("fbx".to_string(), fbx);
        chains.insert("abc".to_string(), alembic);
        chains.insert(
            "obj".to_string(),
            StrategyChain::new("OBJ").with(mesh_library::MeshLibraryStrategy),
        );
        chains.insert(
            "stl".to_string(),
            StrategyChain::new("STL").with(mesh_library::MeshLibraryStrategy),
        );
        chains.insert(
            "ply".to_string(),
            StrategyChain::new("PLY").with(mesh_library::MeshLibraryStrategy),
        );
        for ext in ["gltf", "glb"] {
            chains.insert(ext.to_string(), StrategyChain::new("glTF").with(gltf::GltfStrategy));
        }
        chains
    }

    pub fn with_backend(mut self, backend: Box<dyn SceneBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_tools(mut self, tools: ToolPaths) -> Self {
        self.tools = tools;
        self
    }

    /// Replaces the chain used for `extension`
    pub fn with_chain(mut self, extension: &str, chain: StrategyChain) -> Self {
        self.chains.insert(extension.to_ascii_lowercase(), chain);
        self
    }

    pub fn options(&self) -> &ConversionOptions {
        &self.options
    }

    pub fn backend(&self) -> &dyn SceneBackend {
        self.backend.as_ref()
    }

    /// Strategy names tried for `extension`, in order
    pub fn strategy_names(&self, extension: &str) -> Vec<&str> {
        self.chain_for(&extension.to_ascii_lowercase())
            .map(|chain| chain.names())
            .unwrap_or_default()
    }

    fn chain_for(&self, ext: &str) -> Option<&StrategyChain> {
        let key = if MESH_LIBRARY_ALIASES.contains(&ext) { "obj" } else { ext };
        self.chains.get(key)
    }

    /// Converts `input` to a USD file at `output`
    pub fn convert(
        &self,
        input: &Path,
        output: &Path,
        callback: &mut dyn FnMut(u8, &str),
    ) -> Result<(), ConversionError> {
        let mut progress = Progress::new(callback);

        let ext = extension(input).unwrap_or_default();
        if !SUPPORTED_FORMATS.iter().any(|(e, _)| *e == ext) {
            progress.failure(&format!("Error: Unsupported format: .{}", ext));
            return Err(ConversionError::UnsupportedFormat(ext));
        }
        if !input.is_file() {
            progress.failure(&format!("Error: Input file not found: {}", input.display()));
            return Err(ConversionError::InputNotFound(input.to_path_buf()));
        }
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConversionError::SceneWriteFailed(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        if ext == "blend" {
            let message = "Blender conversion requires Blender installation";
            progress.failure(message);
            return Err(ConversionError::NotImplemented(message.to_string()));
        }

        let chain = self
            .chain_for(&ext)
            .ok_or_else(|| ConversionError::UnsupportedFormat(ext.clone()))?;
        log::info!("Converting {} to {}", input.display(), output.display());
        progress.report(1, &format!("Converting {} to USD...", chain.format()));

        let job = ConversionJob {
            input,
            output,
            options: &self.options,
            backend: self.backend.as_ref(),
            tools: &self.tools,
        };
        chain.run(&job, &mut progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{MaterialShaderType, UpAxis};
    use crate::progress::ProgressLog;
    use crate::scene::{AttributeValue, Stage, TimeCode};
    use std::path::PathBuf;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("stagehand_convert_{}_{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn converter(options: ConversionOptions) -> USDConverter {
        USDConverter::new(options)
            .with_backend(Box::new(UsdaBackend::new()))
            .with_tools(ToolPaths {
                usdcat: PathBuf::from("stagehand-test-missing-usdcat"),
                fbx2usd: PathBuf::from("stagehand-test-missing-fbx2usd"),
            })
    }

    const TRIANGLE_OBJ: &str = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";

    #[test]
    fn test_unknown_extension() {
        let mut log = ProgressLog::new();
        let mut callback = |p: u8, m: &str| log.record(p, m);
        let input = PathBuf::from("/nonexistent/dir/model.xyz");
        let output = PathBuf::from("/nonexistent/out/model.usda");
        let result = converter(ConversionOptions::default()).convert(&input, &output, &mut callback);
        assert!(matches!(result, Err(ConversionError::UnsupportedFormat(ext)) if ext == "xyz"));
        assert!(!Path::new("/nonexistent/out").exists());
    }

    #[test]
    fn test_missing_input() {
        let dir = temp_dir("missing");
        let mut callback = |_: u8, _: &str| {};
        let result = converter(ConversionOptions::default()).convert(
            &dir.join("nothing.obj"),
            &dir.join("out.usda"),
            &mut callback,
        );
        assert!(matches!(result, Err(ConversionError::InputNotFound(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_blend_not_implemented() {
        let dir = temp_dir("blend");
        let input = dir.join("scene.blend");
        std::fs::write(&input, b"BLENDER").unwrap();
        let mut callback = |_: u8, _: &str| {};
        let result = converter(ConversionOptions::default()).convert(&input, &dir.join("out.usda"), &mut callback);
        assert!(matches!(result, Err(ConversionError::NotImplemented(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_obj_triangle() {
        let dir = temp_dir("obj");
        let input = dir.join("tri.obj");
        let output = dir.join("nested").join("tri.usda");
        std::fs::write(&input, TRIANGLE_OBJ).unwrap();

        let mut callback = |_: u8, _: &str| {};
        converter(ConversionOptions::default())
            .convert(&input, &output, &mut callback)
            .unwrap();

        let stage = UsdaBackend::new().open_memory(&output).unwrap();
        let mesh = stage
            .prim_paths()
            .into_iter()
            .find(|p| stage.prim_type(p).as_deref() == Some("Mesh"))
            .unwrap();
        assert!(matches!(
            stage.attribute(&mesh, "points", TimeCode::Default),
            Some(AttributeValue::Point3fArray(points)) if points.len() == 3
        ));
        assert_eq!(
            stage.attribute(&mesh, "faceVertexCounts", TimeCode::Default),
            Some(AttributeValue::IntArray(vec![3]))
        );
        assert_eq!(
            stage.attribute(&mesh, "faceVertexIndices", TimeCode::Default),
            Some(AttributeValue::IntArray(vec![0, 1, 2]))
        );
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_fallback_chain() {
        let dir = temp_dir("fallback");
        let input = dir.join("model.fbx");
        let output = dir.join("model.usda");
        std::fs::write(&input, b"not really fbx").unwrap();

        let chain = StrategyChain::new("FBX")
            .with(FnStrategy::new("plugin", |_, _| {
                Err(ConversionError::ExternalToolMissing("usdFbx plugin".into()))
            }))
            .with(FnStrategy::new("cli", |_, _| {
                Err(ConversionError::ExternalToolMissing("usdcat".into()))
            }))
            .with(FnStrategy::new("sdk", |job, progress| {
                progress.report(20, "Reading");
                progress.report(60, "Writing");
                std::fs::write(job.output, "#usda 1.0\n").map_err(|e| ConversionError::SceneWriteFailed(e.to_string()))
            }));

        let mut log = ProgressLog::new();
        let mut callback = |p: u8, m: &str| log.record(p, m);
        converter(ConversionOptions::default())
            .with_chain("fbx", chain)
            .convert(&input, &output, &mut callback)
            .unwrap();

        let failures = log.failures();
        assert_eq!(failures.len(), 2);
        assert!(failures[0].starts_with("plugin failed"));
        assert!(failures[1].starts_with("cli failed"));

        let start = log.events.iter().rposition(|(_, m)| m == "Trying sdk...").unwrap();
        let tail: Vec<u8> = log.events[start..].iter().map(|(p, _)| *p).collect();
        assert!(tail.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(tail.last(), Some(&100));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_metadata_matches_options_for_mesh_formats() {
        let dir = temp_dir("metadata");
        let ply = "ply\nformat ascii 1.0\nelement vertex 3\nproperty float x\nproperty float y\nproperty float z\n\
                   element face 1\nproperty list uchar int vertex_indices\nend_header\n0 0 0\n1 0 0\n0 1 0\n3 0 1 2\n";
        let stl = "solid t\nfacet normal 0 0 1\nouter loop\nvertex 0 0 0\nvertex 1 0 0\nvertex 0 1 0\nendloop\nendfacet\nendsolid t\n";
        let inputs = [("tri.obj", TRIANGLE_OBJ), ("tri.ply", ply), ("tri.stl", stl)];

        for (up_axis, mpu) in [(UpAxis::Z, 0.01), (UpAxis::Y, 1.0)] {
            let options = ConversionOptions {
                up_axis,
                meters_per_unit: mpu,
                material_shader_type: MaterialShaderType::UsdPreviewSurface,
                ..Default::default()
            };
            for (name, text) in inputs {
                let input = dir.join(name);
                std::fs::write(&input, text).unwrap();
                let output = dir.join(format!("{}.usda", name));
                let mut callback = |_: u8, _: &str| {};
                converter(options.clone()).convert(&input, &output, &mut callback).unwrap();

                let metadata = UsdaBackend::new().open_memory(&output).unwrap().metadata;
                assert_eq!(metadata.up_axis.as_deref(), Some(up_axis.token()), "{}", name);
                assert_eq!(metadata.meters_per_unit, Some(mpu), "{}", name);
            }
        }
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_dae_and_3ds_use_mesh_library() {
        let converter = converter(ConversionOptions::default());
        assert_eq!(converter.strategy_names("dae"), vec!["mesh library"]);
        assert_eq!(converter.strategy_names("3DS"), vec!["mesh library"]);
        assert_eq!(converter.strategy_names("fbx").len(), 3);
        assert!(converter.strategy_names("blend").is_empty());
    }

    #[test]
    fn test_enhanced_chains() {
        let converter = USDConverter::enhanced(ConversionOptions::default()).with_backend(Box::new(UsdaBackend::new()));
        assert_eq!(converter.strategy_names("fbx")[0], "Adobe USD FBX plugin");
        assert_eq!(converter.strategy_names("abc")[0], "native Alembic");
    }
}
