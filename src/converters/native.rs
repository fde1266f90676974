//! Strategies shared by the FBX and Alembic chains: opening the source
//! through a scene plugin, and converting with `usdcat`

use std::ffi::OsString;
use std::time::Duration;

use crate::converters::external::run_tool;
use crate::converters::strategy::{ConversionJob, ConversionStrategy};
use crate::error::ConversionError;
use crate::progress::Progress;
use crate::scene::{Stage, StageMetadata};
use crate::stage_settings;

/// Opens the input as a stage through the backend and exports it
pub struct NativeOpenStrategy {
    name: String,
    /// Keep the source's animated range over the configured one
    keep_source_range: bool,
}

impl NativeOpenStrategy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keep_source_range: false,
        }
    }

    pub fn keeping_source_range(mut self) -> Self {
        self.keep_source_range = true;
        self
    }
}

impl ConversionStrategy for NativeOpenStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn convert(&self, job: &ConversionJob, progress: &mut Progress) -> Result<(), ConversionError> {
        progress.report(20, "Opening with USD plugin...");
        let mut stage = job.backend.open(job.input)?;
        let source = stage.metadata();

        progress.report(60, "Applying stage settings...");
        stage_settings::apply(stage.as_mut(), job.options)?;
        if self.keep_source_range && job.options.time_samples && source.has_animation() {
            restore_time_range(stage.as_mut(), &source)?;
        }

        progress.report(80, "Saving USD file...");
        stage
            .export(job.output)
            .map_err(|e| ConversionError::SceneWriteFailed(e.to_string()))
    }
}

/// Copies the source's start, end and frame rate back onto `stage`
pub fn restore_time_range(stage: &mut dyn Stage, source: &StageMetadata) -> Result<(), crate::error::SceneError> {
    let mut metadata = stage.metadata();
    metadata.start_time_code = source.start_time_code;
    metadata.end_time_code = source.end_time_code;
    if source.frames_per_second.is_some() {
        metadata.frames_per_second = source.frames_per_second;
    }
    if source.time_codes_per_second.is_some() {
        metadata.time_codes_per_second = source.time_codes_per_second;
    }
    stage.set_metadata(metadata)
}

/// Converts with `usdcat <in> -o <out>`
pub struct UsdcatStrategy {
    timeout: Duration,
    flatten: bool,
}

impl UsdcatStrategy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            flatten: false,
        }
    }

    /// Adds `--flattenLayerStack`
    pub fn flattened(mut self, flatten: bool) -> Self {
        self.flatten = flatten;
        self
    }

    pub fn args(&self, job: &ConversionJob) -> Vec<OsString> {
        let mut args = vec![
            job.input.as_os_str().to_os_string(),
            OsString::from("-o"),
            job.output.as_os_str().to_os_string(),
        ];
        if self.flatten {
            args.push(OsString::from("--flattenLayerStack"));
        }
        args
    }
}

impl ConversionStrategy for UsdcatStrategy {
    fn name(&self) -> &str {
        "usdcat"
    }

    fn convert(&self, job: &ConversionJob, progress: &mut Progress) -> Result<(), ConversionError> {
        progress.report(30, "Running usdcat...");
        run_tool(&job.tools.usdcat, &self.args(job), self.timeout)?;
        refresh_output(job, progress);
        Ok(())
    }
}

/// Reopens a tool-written output to apply stage settings. A failure here
/// leaves the tool's output as is.
pub fn refresh_output(job: &ConversionJob, progress: &mut Progress) {
    progress.report(80, "Applying stage settings...");
    let result = job.backend.open(job.output).and_then(|mut stage| {
        stage_settings::apply(stage.as_mut(), job.options)?;
        stage.save()
    });
    if let Err(e) = result {
        log::warn!("Could not apply stage settings to {}: {}", job.output.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converters::external::ToolPaths;
    use crate::options::{ConversionOptions, UpAxis};
    use crate::progress::ProgressLog;
    use crate::scene::{MemoryStage, UsdaBackend};
    use std::path::{Path, PathBuf};

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("stagehand_native_{}_{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn job<'a>(
        input: &'a Path,
        output: &'a Path,
        options: &'a ConversionOptions,
        backend: &'a UsdaBackend,
        tools: &'a ToolPaths,
    ) -> ConversionJob<'a> {
        ConversionJob {
            input,
            output,
            options,
            backend,
            tools,
        }
    }

    #[test]
    fn test_usdcat_args() {
        let options = ConversionOptions::default();
        let backend = UsdaBackend::new();
        let tools = ToolPaths::default();
        let job = job(Path::new("in.abc"), Path::new("out.usda"), &options, &backend, &tools);
        assert_eq!(UsdcatStrategy::new(Duration::from_secs(1)).args(&job), vec!["in.abc", "-o", "out.usda"]);
        assert_eq!(
            UsdcatStrategy::new(Duration::from_secs(1)).flattened(true).args(&job).last(),
            Some(&OsString::from("--flattenLayerStack"))
        );
    }

    #[test]
    fn test_native_open_exports_with_settings() {
        let dir = temp_dir("open");
        let input = dir.join("in.usda");
        let output = dir.join("out.usda");
        let mut source = MemoryStage::new(&input);
        source.define_prim("/World/Cube", "Mesh").unwrap();
        source.metadata.start_time_code = Some(10.0);
        source.metadata.end_time_code = Some(20.0);
        source.save().unwrap();

        let options = ConversionOptions {
            up_axis: UpAxis::Z,
            ..Default::default()
        };
        let backend = UsdaBackend::new();
        let tools = ToolPaths::default();
        let job = job(&input, &output, &options, &backend, &tools);
        let mut log = ProgressLog::new();
        let mut callback = |p: u8, m: &str| log.record(p, m);
        NativeOpenStrategy::new("plugin")
            .keeping_source_range()
            .convert(&job, &mut Progress::new(&mut callback))
            .unwrap();

        let written = backend.open_memory(&output).unwrap();
        assert_eq!(written.metadata.up_axis.as_deref(), Some("Z"));
        assert_eq!(written.metadata.start_time_code, Some(10.0));
        assert_eq!(written.metadata.end_time_code, Some(20.0));
        assert!(written.has_prim("/World/Cube"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_usdcat_missing() {
        let options = ConversionOptions::default();
        let backend = UsdaBackend::new();
        let tools = ToolPaths {
            usdcat: PathBuf::from("stagehand-missing-usdcat"),
            ..Default::default()
        };
        let job = job(Path::new("in.fbx"), Path::new("out.usda"), &options, &backend, &tools);
        let mut callback = |_: u8, _: &str| {};
        let result = UsdcatStrategy::new(Duration::from_secs(1)).convert(&job, &mut Progress::new(&mut callback));
        assert!(matches!(result, Err(ConversionError::ExternalToolMissing(_))));
    }
}
