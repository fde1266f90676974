//! Generic mesh loading for OBJ, STL, PLY, Collada and 3DS
//!
//! OBJ/MTL goes through `tobj`, everything else through assimp. Each reader
//! turns a file into a [`SourceScene`]; [`MeshLibraryStrategy`] hands that
//! scene to the [`SceneWriter`].

mod assimp;
mod obj;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::converters::source::SourceScene;
use crate::converters::strategy::{ConversionJob, ConversionStrategy};
use crate::converters::writer::SceneWriter;
use crate::error::ConversionError;
use crate::progress::Progress;

/// Errors reading a mesh file
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("OBJ load error: {0}")]
    Obj(#[from] tobj::LoadError),
    #[error("asset import failed: {0}")]
    Import(String),
    #[error("no mesh reader for .{0} files")]
    UnknownExtension(String),
}

/// Extensions with a reader
pub const EXTENSIONS: [&str; 5] = ["obj", "stl", "ply", "dae", "3ds"];

/// Reads `path` with the reader matching its extension
pub fn load(path: &Path) -> Result<SourceScene, MeshError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "obj" => obj::load(path),
        other if assimp::EXTENSIONS.contains(&other) => assimp::load(path),
        _ => Err(MeshError::UnknownExtension(ext)),
    }
}

/// Loads the input with the mesh readers and writes the scene
pub struct MeshLibraryStrategy;

impl ConversionStrategy for MeshLibraryStrategy {
    fn name(&self) -> &str {
        "mesh library"
    }

    fn convert(&self, job: &ConversionJob, progress: &mut Progress) -> Result<(), ConversionError> {
        progress.report(20, "Loading mesh...");
        let scene = load(job.input).map_err(|e| ConversionError::strategy(self.name(), e.to_string()))?;
        if scene.mesh_count() == 0 {
            return Err(ConversionError::strategy(self.name(), "no geometry found"));
        }
        log::info!(
            "Loaded {} meshes and {} materials from {}",
            scene.mesh_count(),
            scene.materials.len(),
            job.input.display()
        );

        progress.report(40, "Building USD scene...");
        SceneWriter::new(job.options, job.backend.supports_materialx()).write_job(job, &scene, progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_extension() {
        assert!(matches!(
            load(Path::new("model.xyz")),
            Err(MeshError::UnknownExtension(ext)) if ext == "xyz"
        ));
    }

    #[test]
    fn test_missing_file() {
        let path = std::env::temp_dir().join(format!("stagehand_missing_{}.stl", std::process::id()));
        assert!(matches!(load(&path), Err(MeshError::Io { .. })));
    }
}
