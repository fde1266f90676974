//! Conversion-wide constants and default values
//!
//! Numeric defaults here are relied on by downstream validation and by
//! visual parity with other converters, so they are kept exactly as is.

/// Material property defaults
pub mod material {
    /// Mid grey used whenever a base color is missing
    pub const DEFAULT_BASE_COLOR: [f32; 3] = [0.18, 0.18, 0.18];

    pub const DEFAULT_METALLIC: f32 = 0.0;
    pub const DEFAULT_ROUGHNESS: f32 = 0.5;
    pub const DEFAULT_SPECULAR: f32 = 0.5;
    pub const DEFAULT_SPECULAR_COLOR: [f32; 3] = [1.0, 1.0, 1.0];

    /// FBX `Shininess` when absent, giving roughness 0.5
    pub const FBX_DEFAULT_SHININESS: f32 = 50.0;

    /// MTL `Kd` when absent
    pub const OBJ_DEFAULT_DIFFUSE: [f32; 3] = [0.8, 0.8, 0.8];

    /// MTL `Ns` when absent
    pub const OBJ_DEFAULT_SHININESS: f32 = 100.0;

    pub const DEFAULT_NORMAL_SCALE: f32 = 1.0;
    pub const DEFAULT_DISPLACEMENT_SCALE: f32 = 0.1;
}

/// Camera defaults, in millimetres
pub mod camera {
    pub const DEFAULT_HORIZONTAL_APERTURE: f32 = 20.955;
    pub const DEFAULT_VERTICAL_APERTURE: f32 = 15.955;
    pub const DEFAULT_FOCAL_LENGTH: f32 = 50.0;
}

/// External process limits
pub mod tools {
    use std::time::Duration;

    /// Budget for a single usdcat or fbx2usd conversion
    pub const CONVERT_TIMEOUT: Duration = Duration::from_secs(300);

    /// Alembic archives can be large and heavily sampled
    pub const ALEMBIC_CONVERT_TIMEOUT: Duration = Duration::from_secs(600);

    /// Budget for a `--version` query
    pub const VERSION_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

    pub const POLL_INTERVAL: Duration = Duration::from_millis(50);
}

/// Scene layout conventions
pub mod scene {
    /// Name of the scope holding materials under the root prim
    pub const MATERIALS_SCOPE: &str = "Materials";

    /// Root prim names recognised when choosing a default prim
    pub const CONVENTIONAL_ROOTS: [&str; 2] = ["World", "Root"];
}
