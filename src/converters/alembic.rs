//! Alembic strategy chains
//!
//! Animated archives keep their own frame range. With hierarchy
//! preservation on, the archive is referenced as a sublayer of the output
//! instead of being copied.

use crate::constants::tools::ALEMBIC_CONVERT_TIMEOUT;
use crate::converters::native::{restore_time_range, NativeOpenStrategy, UsdcatStrategy};
use crate::converters::strategy::{ChainStrategy, ConversionJob, ConversionStrategy, StrategyChain};
use crate::error::ConversionError;
use crate::progress::Progress;
use crate::scene::{copy_prim_tree, StageMetadata};
use crate::stage_settings;

/// Plugin name of the Alembic file format plugin
pub const ALEMBIC_PLUGIN: &str = "usdAbc";

/// Plugin open, then `usdcat`, then the Alembic library
pub fn base_chain() -> StrategyChain {
    StrategyChain::new("Alembic")
        .with(NativeOpenStrategy::new("USD Alembic plugin").keeping_source_range())
        .with(base_usdcat())
        .with(AlembicLibraryStrategy)
}

/// usdcat step of the base chain, layer stack kept as authored
pub fn base_usdcat() -> UsdcatStrategy {
    UsdcatStrategy::new(ALEMBIC_CONVERT_TIMEOUT)
}

/// usdcat step of the enhanced chain; flattens when time samples are dropped
pub fn enhanced_usdcat(time_samples: bool) -> UsdcatStrategy {
    UsdcatStrategy::new(ALEMBIC_CONVERT_TIMEOUT).flattened(!time_samples)
}

/// Time-aware native conversion, flattening `usdcat`, then the base chain
pub fn enhanced_chain(time_samples: bool) -> StrategyChain {
    StrategyChain::new("Alembic")
        .with(AlembicNativeStrategy)
        .with(enhanced_usdcat(time_samples))
        .with(ChainStrategy::new("standard Alembic conversion", base_chain()))
}

/// Builds the output from the archive opened through `usdAbc`
pub struct AlembicNativeStrategy;

impl ConversionStrategy for AlembicNativeStrategy {
    fn name(&self) -> &str {
        "native Alembic"
    }

    fn convert(&self, job: &ConversionJob, progress: &mut Progress) -> Result<(), ConversionError> {
        if !job.backend.has_plugin(ALEMBIC_PLUGIN) {
            return Err(ConversionError::ExternalToolMissing(format!("{} plugin", ALEMBIC_PLUGIN)));
        }

        progress.report(20, "Opening Alembic archive...");
        let source = job.backend.open(job.input)?;
        let source_metadata = source.metadata();
        let animated = job.options.time_samples && source_metadata.has_animation();

        let mut stage = job.backend.create_new(job.output)?;
        if animated && job.options.preserve_hierarchy {
            progress.report(50, "Referencing animated archive...");
            stage.set_metadata(StageMetadata {
                sublayers: vec![job.input.to_string_lossy().into_owned()],
                default_prim: source_metadata.default_prim.clone(),
                ..Default::default()
            })?;
        } else if animated {
            progress.report(50, "Flattening animated archive...");
            copy_prim_tree(source.as_ref(), stage.as_mut(), true)?;
        } else {
            progress.report(50, "Flattening archive snapshot...");
            copy_prim_tree(source.as_ref(), stage.as_mut(), false)?;
        }

        progress.report(70, "Applying stage settings...");
        stage_settings::apply(stage.as_mut(), job.options)?;
        if animated {
            restore_time_range(stage.as_mut(), &source_metadata)?;
        }

        progress.report(90, "Saving USD file...");
        stage
            .save()
            .map_err(|e| ConversionError::SceneWriteFailed(e.to_string()))
    }
}

/// Reads the archive with the `alembic` Python library
pub struct AlembicLibraryStrategy;

impl ConversionStrategy for AlembicLibraryStrategy {
    fn name(&self) -> &str {
        "Alembic library"
    }

    #[cfg(feature = "usd")]
    fn convert(&self, job: &ConversionJob, progress: &mut Progress) -> Result<(), ConversionError> {
        use crate::converters::python_sdk;
        use crate::converters::writer::SceneWriter;

        progress.report(20, "Reading Alembic archive...");
        let options = job.options;
        let scene = python_sdk::read_alembic(
            job.input,
            options.export_normals,
            options.export_uvs,
            options.fps,
            options.time_samples,
        )?;
        SceneWriter::new(options, job.backend.supports_materialx()).write_job(job, &scene, progress)
    }

    #[cfg(not(feature = "usd"))]
    fn convert(&self, _job: &ConversionJob, _progress: &mut Progress) -> Result<(), ConversionError> {
        Err(ConversionError::ExternalToolMissing(
            "alembic Python module (build with the `usd` feature)".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converters::external::ToolPaths;
    use crate::error::SceneError;
    use crate::options::ConversionOptions;
    use crate::progress::ProgressLog;
    use crate::scene::{AttributeValue, FileFormatPlugin, MemoryStage, PluginRegistry, Stage, TimeCode, UsdaBackend};
    use glam::Vec3;
    use std::path::{Path, PathBuf};

    struct FakeAbc;

    impl FileFormatPlugin for FakeAbc {
        fn name(&self) -> &str {
            ALEMBIC_PLUGIN
        }

        fn extensions(&self) -> &[&str] {
            &["abc"]
        }

        fn read(&self, path: &Path) -> Result<MemoryStage, SceneError> {
            let mut stage = MemoryStage::new(path);
            stage.metadata.start_time_code = Some(1.0);
            stage.metadata.end_time_code = Some(12.0);
            stage.metadata.default_prim = Some("World".into());
            stage.define_prim("/World/Ball", "Mesh")?;
            for frame in [1.0, 12.0] {
                stage.set_attribute(
                    "/World/Ball",
                    "points",
                    AttributeValue::Point3fArray(vec![Vec3::splat(frame as f32)]),
                    TimeCode::At(frame),
                )?;
            }
            Ok(stage)
        }
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("stagehand_alembic_{}_{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn backend() -> UsdaBackend {
        let mut plugins = PluginRegistry::new();
        plugins.register(Box::new(FakeAbc));
        UsdaBackend::with_plugins(plugins)
    }

    fn convert(options: &ConversionOptions, name: &str) -> MemoryStage {
        let dir = temp_dir(name);
        let input = dir.join("ball.abc");
        let output = dir.join("ball.usda");
        let backend = backend();
        let tools = ToolPaths::default();
        let job = ConversionJob {
            input: &input,
            output: &output,
            options,
            backend: &backend,
            tools: &tools,
        };
        let mut log = ProgressLog::new();
        let mut callback = |p: u8, m: &str| log.record(p, m);
        AlembicNativeStrategy.convert(&job, &mut Progress::new(&mut callback)).unwrap();
        let written = backend.open_memory(&output).unwrap();
        std::fs::remove_dir_all(&dir).ok();
        written
    }

    #[test]
    fn test_animated_archive_is_sublayered() {
        let stage = convert(&ConversionOptions::default(), "sublayer");
        assert_eq!(stage.metadata.sublayers.len(), 1);
        assert!(stage.metadata.sublayers[0].ends_with("ball.abc"));
        assert_eq!(stage.metadata.start_time_code, Some(1.0));
        assert_eq!(stage.metadata.end_time_code, Some(12.0));
        assert!(!stage.has_prim("/World/Ball"));
    }

    #[test]
    fn test_animated_archive_flattened() {
        let options = ConversionOptions {
            preserve_hierarchy: false,
            ..Default::default()
        };
        let stage = convert(&options, "flatten");
        assert!(stage.metadata.sublayers.is_empty());
        assert_eq!(stage.time_samples("/World/Ball", "points"), vec![1.0, 12.0]);
        assert_eq!(stage.metadata.end_time_code, Some(12.0));
    }

    #[test]
    fn test_snapshot_without_time_samples() {
        let options = ConversionOptions {
            time_samples: false,
            ..Default::default()
        };
        let stage = convert(&options, "snapshot");
        assert!(stage.time_samples("/World/Ball", "points").is_empty());
        assert_eq!(
            stage.attribute("/World/Ball", "points", TimeCode::Default),
            Some(AttributeValue::Point3fArray(vec![Vec3::splat(1.0)]))
        );
    }

    #[test]
    fn test_requires_plugin() {
        let options = ConversionOptions::default();
        let backend = UsdaBackend::new();
        let tools = ToolPaths::default();
        let job = ConversionJob {
            input: Path::new("ball.abc"),
            output: Path::new("ball.usda"),
            options: &options,
            backend: &backend,
            tools: &tools,
        };
        let mut callback = |_: u8, _: &str| {};
        let result = AlembicNativeStrategy.convert(&job, &mut Progress::new(&mut callback));
        assert!(matches!(result, Err(ConversionError::ExternalToolMissing(_))));
    }

    #[test]
    fn test_enhanced_flattens_usdcat_without_time_samples() {
        assert_eq!(
            enhanced_chain(false).names(),
            vec!["native Alembic", "usdcat", "standard Alembic conversion"]
        );
        assert_eq!(base_chain().names(), vec!["USD Alembic plugin", "usdcat", "Alembic library"]);

        let options = ConversionOptions::default();
        let backend = UsdaBackend::new();
        let tools = ToolPaths::default();
        let job = ConversionJob {
            input: Path::new("ball.abc"),
            output: Path::new("ball.usda"),
            options: &options,
            backend: &backend,
            tools: &tools,
        };
        let layered = vec!["ball.abc", "-o", "ball.usda"];
        let flat = vec!["ball.abc", "-o", "ball.usda", "--flattenLayerStack"];
        assert_eq!(base_usdcat().args(&job), layered);
        assert_eq!(enhanced_usdcat(true).args(&job), layered);
        assert_eq!(enhanced_usdcat(false).args(&job), flat);
    }
}
