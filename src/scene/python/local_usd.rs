//! Locating and initializing the Python USD runtime
//!
//! A bundled runtime is preferred over a system-wide installation so that
//! conversions run against a known `pxr` build.

use std::env;
use std::path::PathBuf;

use once_cell::sync::OnceCell;
use pyo3::prelude::*;

use crate::error::SceneError;

static USD_INIT: OnceCell<Result<(), String>> = OnceCell::new();

/// Root of the bundled Python runtime, if one can be found
pub fn get_usd_root() -> Option<PathBuf> {
    if let Ok(usd_root) = env::var("STAGEHAND_USD_ROOT") {
        return Some(PathBuf::from(usd_root));
    }

    let exe_path = env::current_exe().ok()?;
    let exe_dir = exe_path.parent()?;

    // Bundled next to the executable
    let vendor_path = exe_dir.join("vendor").join("python-runtime").join("python");
    if vendor_path.exists() {
        return Some(vendor_path);
    }

    // Development layout: relative to the workspace root
    exe_dir
        .ancestors()
        .find(|p| p.join("Cargo.toml").exists())
        .map(|root| root.join("vendor").join("python-runtime").join("python"))
        .filter(|p| p.exists())
}

fn site_packages(root: &PathBuf) -> Option<PathBuf> {
    let lib = root.join("lib");
    std::fs::read_dir(&lib)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("python3"))
        })
        .map(|p| p.join("site-packages"))
}

static PYTHON_READY: OnceCell<()> = OnceCell::new();

/// Points Python at the bundled runtime and starts the interpreter, once
pub fn prepare_interpreter() {
    PYTHON_READY.get_or_init(|| {
        if let Some(root) = get_usd_root() {
            log::info!("Using bundled USD runtime at {}", root.display());
            env::set_var("PYTHONHOME", &root);
            if let Some(path) = site_packages(&root) {
                env::set_var("PYTHONPATH", path);
            }
        }
        pyo3::prepare_freethreaded_python();
    });
}

/// Prepares the interpreter once per process and checks `pxr` imports
pub fn init_local_usd() -> Result<(), SceneError> {
    USD_INIT
        .get_or_init(|| {
            prepare_interpreter();
            Python::with_gil(|py| match py.import("pxr.Usd") {
                Ok(_) => {
                    log::info!("USD initialized");
                    Ok(())
                }
                Err(e) => Err(format!("failed to import pxr.Usd: {}", e)),
            })
        })
        .clone()
        .map_err(SceneError::Backend)
}

/// Version of the loaded USD library, e.g. `(0, 24, 11)`
pub fn get_usd_version() -> Result<(u32, u32, u32), SceneError> {
    init_local_usd()?;
    Python::with_gil(|py| {
        py.import("pxr.Usd")?
            .call_method0("GetVersion")?
            .extract::<(u32, u32, u32)>()
    })
    .map_err(|e| SceneError::Backend(e.to_string()))
}
