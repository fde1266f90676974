//! Applies global conversion options to a stage

use crate::constants::scene::CONVENTIONAL_ROOTS;
use crate::error::SceneError;
use crate::options::ConversionOptions;
use crate::scene::{child_path, Stage};

/// Writes up axis, units, optional frame range and default prim.
///
/// Metadata is overwritten field by field, so applying the same options
/// again leaves the stage unchanged.
pub fn apply(stage: &mut dyn Stage, options: &ConversionOptions) -> Result<(), SceneError> {
    let mut metadata = stage.metadata();
    metadata.up_axis = Some(options.up_axis.token().to_string());
    metadata.meters_per_unit = Some(options.meters_per_unit);

    if options.time_samples {
        metadata.start_time_code = Some(options.start_frame);
        metadata.end_time_code = Some(options.end_frame);
        metadata.frames_per_second = Some(options.fps);
    }

    if let Some(root) = default_root(stage, options) {
        metadata.default_prim = Some(root);
    }

    stage.set_metadata(metadata)
}

/// The first existing root among the configured name and the conventional ones
fn default_root(stage: &dyn Stage, options: &ConversionOptions) -> Option<String> {
    std::iter::once(options.default_prim_name.as_str())
        .chain(CONVENTIONAL_ROOTS)
        .find(|name| !name.is_empty() && stage.has_prim(&child_path("/", name)))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::UpAxis;
    use crate::scene::MemoryStage;

    #[test]
    fn test_apply_sets_metadata() {
        let mut stage = MemoryStage::new("settings.usda");
        stage.define_prim("/World", "Xform").unwrap();
        let options = ConversionOptions {
            up_axis: UpAxis::Z,
            meters_per_unit: 0.01,
            start_frame: 1.0,
            end_frame: 48.0,
            fps: 30.0,
            ..Default::default()
        };
        apply(&mut stage, &options).unwrap();

        let metadata = stage.metadata();
        assert_eq!(metadata.up_axis.as_deref(), Some("Z"));
        assert_eq!(metadata.meters_per_unit, Some(0.01));
        assert_eq!(metadata.start_time_code, Some(1.0));
        assert_eq!(metadata.end_time_code, Some(48.0));
        assert_eq!(metadata.frames_per_second, Some(30.0));
        assert_eq!(metadata.default_prim.as_deref(), Some("World"));
    }

    #[test]
    fn test_time_range_only_with_time_samples() {
        let mut stage = MemoryStage::new("settings.usda");
        let options = ConversionOptions {
            time_samples: false,
            ..Default::default()
        };
        apply(&mut stage, &options).unwrap();

        let metadata = stage.metadata();
        assert_eq!(metadata.up_axis.as_deref(), Some("Y"));
        assert_eq!(metadata.start_time_code, None);
        assert_eq!(metadata.frames_per_second, None);
        assert_eq!(metadata.default_prim, None);
    }

    #[test]
    fn test_conventional_root_fallback() {
        let mut stage = MemoryStage::new("settings.usda");
        stage.define_prim("/Root", "Xform").unwrap();
        apply(&mut stage, &ConversionOptions::default()).unwrap();
        assert_eq!(stage.metadata().default_prim.as_deref(), Some("Root"));
    }

    #[test]
    fn test_apply_is_idempotent() {
        let mut stage = MemoryStage::new("settings.usda");
        stage.define_prim("/World", "Xform").unwrap();
        let options = ConversionOptions::default();

        apply(&mut stage, &options).unwrap();
        let once = stage.to_usda();
        apply(&mut stage, &options).unwrap();
        assert_eq!(stage.to_usda(), once);
        assert_eq!(once.matches("startTimeCode").count(), 1);
        assert_eq!(once.matches("metersPerUnit").count(), 1);
    }
}
