//! Stagehand command line

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use stagehand::converters::{default_backend, SUPPORTED_FORMATS};
use stagehand::materials::{MaterialValidator, Severity, ValidationTarget};
use stagehand::options::{ConversionOptions, MaterialShaderType, UpAxis};
use stagehand::startup_checks::check_environment;
use stagehand::{ConversionError, ToolPaths, USDConverter};

#[derive(Parser)]
#[command(name = "stagehand")]
#[command(about = "Convert 3D scene files to USD")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert a file to USD
    Convert(ConvertArgs),
    /// Validate the materials of a USD file
    Validate {
        file: PathBuf,
        /// auto, karma, nuke or generic
        #[arg(long, default_value = "auto")]
        target: ValidationTarget,
    },
    /// List supported input formats
    Formats,
    /// Report available tools and plugins
    Check {
        #[arg(long)]
        usdcat: Option<PathBuf>,
        #[arg(long)]
        fbx2usd: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct ConvertArgs {
    input: PathBuf,
    output: PathBuf,

    /// Try plugin-specific and standalone tools first
    #[arg(long)]
    enhanced: bool,

    /// JSON options file; defaults to the per-user options file
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    up_axis: Option<UpAxis>,
    #[arg(long)]
    meters_per_unit: Option<f64>,
    #[arg(long)]
    scale: Option<f64>,
    /// Material convention, e.g. UsdPreviewSurface, MaterialX, Karma
    #[arg(long)]
    shader: Option<MaterialShaderType>,

    #[arg(long)]
    no_materials: bool,
    #[arg(long)]
    no_normals: bool,
    #[arg(long)]
    no_uvs: bool,
    #[arg(long)]
    no_colors: bool,
    #[arg(long)]
    no_time_samples: bool,

    #[arg(long)]
    start: Option<f64>,
    #[arg(long)]
    end: Option<f64>,
    #[arg(long)]
    fps: Option<f64>,

    /// Write one self-contained, flattened scene
    #[arg(long)]
    flatten: bool,

    #[arg(long)]
    usdcat: Option<PathBuf>,
    #[arg(long)]
    fbx2usd: Option<PathBuf>,
}

impl ConvertArgs {
    fn options(&self) -> Result<ConversionOptions> {
        let mut options = match &self.config {
            Some(path) => ConversionOptions::load(path)?,
            None => ConversionOptions::load_or_default()?,
        };
        if let Some(up_axis) = self.up_axis {
            options.up_axis = up_axis;
        }
        if let Some(mpu) = self.meters_per_unit {
            options.meters_per_unit = mpu;
        }
        if let Some(scale) = self.scale {
            options.scale = scale;
        }
        if let Some(shader) = self.shader {
            options.material_shader_type = shader;
        }
        options.export_materials &= !self.no_materials;
        options.export_normals &= !self.no_normals;
        options.export_uvs &= !self.no_uvs;
        options.export_colors &= !self.no_colors;
        options.time_samples &= !self.no_time_samples;
        if let Some(start) = self.start {
            options.start_frame = start;
        }
        if let Some(end) = self.end {
            options.end_frame = end;
        }
        if let Some(fps) = self.fps {
            options.fps = fps;
        }
        if self.flatten {
            options.preserve_hierarchy = false;
        }
        Ok(options)
    }
}

fn tool_paths(usdcat: Option<PathBuf>, fbx2usd: Option<PathBuf>) -> ToolPaths {
    let mut tools = ToolPaths::from_env();
    if let Some(usdcat) = usdcat {
        tools.usdcat = usdcat;
    }
    if let Some(fbx2usd) = fbx2usd {
        tools.fbx2usd = fbx2usd;
    }
    tools
}

fn convert(args: ConvertArgs) -> Result<ExitCode> {
    let options = args.options()?;
    let converter = if args.enhanced {
        USDConverter::enhanced(options)
    } else {
        USDConverter::new(options)
    };
    let converter = converter.with_tools(tool_paths(args.usdcat.clone(), args.fbx2usd.clone()));

    let mut callback = |percent: u8, message: &str| eprintln!("[{:>3}%] {}", percent, message);
    match converter.convert(&args.input, &args.output, &mut callback) {
        Ok(()) => {
            println!("{}", args.output.display());
            Ok(ExitCode::SUCCESS)
        }
        Err(ConversionError::AllStrategiesFailed { format, failures }) => {
            eprintln!("All {} conversion methods failed:", format);
            for failure in failures {
                eprintln!("  {}", failure);
            }
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e).with_context(|| format!("converting {}", args.input.display())),
    }
}

fn validate(file: PathBuf, target: ValidationTarget) -> Result<ExitCode> {
    let stage = default_backend()
        .open(&file)
        .with_context(|| format!("opening {}", file.display()))?;
    let results = MaterialValidator::new(target).validate_scene(stage.as_ref());
    if results.is_empty() {
        println!("No material issues found");
        return Ok(ExitCode::SUCCESS);
    }

    let mut errors = 0;
    for (material, issues) in &results {
        println!("{}", material);
        for issue in issues {
            println!("  {}", issue);
            if issue.severity == Severity::Error {
                errors += 1;
            }
        }
    }
    Ok(if errors > 0 { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Convert(args) => convert(args),
        Command::Validate { file, target } => validate(file, target),
        Command::Formats => {
            for (ext, description) in SUPPORTED_FORMATS {
                println!(".{:<6} {}", ext, description);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Check { usdcat, fbx2usd } => {
            let report = check_environment(default_backend().as_ref(), &tool_paths(usdcat, fbx2usd));
            print!("{}", report);
            Ok(ExitCode::SUCCESS)
        }
    }
}
