//! FBX strategy chains

use std::ffi::OsString;

use crate::constants::tools::CONVERT_TIMEOUT;
use crate::converters::external::{query_version, run_tool};
use crate::converters::native::{refresh_output, NativeOpenStrategy, UsdcatStrategy};
use crate::converters::strategy::{ChainStrategy, ConversionJob, ConversionStrategy, StrategyChain};
use crate::error::ConversionError;
use crate::options::UpAxis;
use crate::progress::Progress;
use crate::scene::plugin::{find_plugin_info, plugin_search_paths};

/// Plugin name the FBX file format plugin registers under
pub const FBX_PLUGIN: &str = "usdFbx";

/// Plugin open, then `usdcat`, then the FBX SDK
pub fn base_chain() -> StrategyChain {
    StrategyChain::new("FBX")
        .with(NativeOpenStrategy::new("USD FBX plugin"))
        .with(UsdcatStrategy::new(CONVERT_TIMEOUT))
        .with(FbxSdkStrategy)
}

/// Adobe plugin, `fbx2usd`, the FBX SDK, then the whole base chain
pub fn enhanced_chain() -> StrategyChain {
    StrategyChain::new("FBX")
        .with(AdobePluginStrategy)
        .with(Fbx2UsdStrategy)
        .with(FbxSdkStrategy)
        .with(ChainStrategy::new("standard FBX conversion", base_chain()))
}

/// Native open that first requires an FBX plugin to be installed
pub struct AdobePluginStrategy;

impl ConversionStrategy for AdobePluginStrategy {
    fn name(&self) -> &str {
        "Adobe USD FBX plugin"
    }

    fn convert(&self, job: &ConversionJob, progress: &mut Progress) -> Result<(), ConversionError> {
        progress.report(10, "Checking for Adobe FBX plugin...");
        let installed = job.backend.has_plugin(FBX_PLUGIN)
            || find_plugin_info(&plugin_search_paths(), "fbx").is_some();
        if !installed {
            return Err(ConversionError::ExternalToolMissing(format!("{} plugin", FBX_PLUGIN)));
        }
        NativeOpenStrategy::new(self.name()).convert(job, progress)
    }
}

/// Converts with the standalone `fbx2usd` tool
pub struct Fbx2UsdStrategy;

impl Fbx2UsdStrategy {
    pub fn args(job: &ConversionJob) -> Vec<OsString> {
        let options = job.options;
        let mut args = vec![
            job.input.as_os_str().to_os_string(),
            job.output.as_os_str().to_os_string(),
            OsString::from("--up-axis"),
            OsString::from(match options.up_axis {
                UpAxis::Y => "y",
                UpAxis::Z => "z",
            }),
            OsString::from("--meters-per-unit"),
            OsString::from(options.meters_per_unit.to_string()),
        ];
        if options.export_materials {
            args.push(OsString::from("--materials"));
        }
        if options.export_normals {
            args.push(OsString::from("--normals"));
        }
        args
    }
}

impl ConversionStrategy for Fbx2UsdStrategy {
    fn name(&self) -> &str {
        "fbx2usd"
    }

    fn convert(&self, job: &ConversionJob, progress: &mut Progress) -> Result<(), ConversionError> {
        let version = query_version(&job.tools.fbx2usd)?;
        log::debug!("fbx2usd version: {}", version);

        progress.report(30, "Running fbx2usd...");
        run_tool(&job.tools.fbx2usd, &Self::args(job), CONVERT_TIMEOUT)?;
        refresh_output(job, progress);
        Ok(())
    }
}

/// Walks the FBX scene with the Autodesk SDK and writes it out
pub struct FbxSdkStrategy;

impl ConversionStrategy for FbxSdkStrategy {
    fn name(&self) -> &str {
        "FBX SDK"
    }

    #[cfg(feature = "usd")]
    fn convert(&self, job: &ConversionJob, progress: &mut Progress) -> Result<(), ConversionError> {
        use crate::converters::python_sdk;
        use crate::converters::writer::SceneWriter;

        progress.report(20, "Reading FBX scene...");
        let options = job.options;
        let scene = python_sdk::read_fbx(job.input, options.export_normals, options.export_uvs)?;
        SceneWriter::new(options, job.backend.supports_materialx()).write_job(job, &scene, progress)
    }

    #[cfg(not(feature = "usd"))]
    fn convert(&self, _job: &ConversionJob, _progress: &mut Progress) -> Result<(), ConversionError> {
        Err(ConversionError::ExternalToolMissing(
            "FBX Python SDK (build with the `usd` feature)".to_string(),
        ))
    }
}
