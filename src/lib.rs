//! Stagehand: converts FBX, Alembic, OBJ, glTF and other scene files to USD
//!
//! Conversion runs through [`converters::USDConverter`], which tries an
//! ordered chain of strategies per input format. Scenes are read and written
//! only through the [`scene::Stage`] capability; materials are normalized to
//! a canonical property set and rebuilt as shader graphs in the requested
//! convention.

pub mod constants;
pub mod converters;
pub mod error;
pub mod materials;
pub mod options;
pub mod progress;
pub mod scene;
pub mod stage_settings;
pub mod startup_checks;

pub use converters::{ToolPaths, USDConverter};
pub use error::{ConversionError, SceneError, StrategyFailure};
pub use options::{ConversionOptions, MaterialShaderType, UpAxis};
pub use progress::{Progress, ProgressLog};
