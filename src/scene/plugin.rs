//! File format plugins
//!
//! A plugin teaches a backend to open a non-USD file (Alembic, FBX, ...) as
//! a stage. The text backend ships none; callers register their own, and
//! `plugin_search_paths` lists where a USD installation keeps its plugins.

use std::path::{Path, PathBuf};

use crate::error::SceneError;
use crate::scene::memory::MemoryStage;

pub trait FileFormatPlugin {
    /// Plugin name as USD reports it, e.g. `usdAbc`
    fn name(&self) -> &str;
    /// Lower-case extensions without the dot
    fn extensions(&self) -> &[&str];
    fn read(&self, path: &Path) -> Result<MemoryStage, SceneError>;
}

#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn FileFormatPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Box<dyn FileFormatPlugin>) -> &mut Self {
        self.plugins.push(plugin);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.iter().any(|p| p.name() == name)
    }

    pub fn for_extension(&self, ext: &str) -> Option<&dyn FileFormatPlugin> {
        self.plugins
            .iter()
            .find(|p| p.extensions().iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .map(|p| p.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }
}

/// Standard plugin locations, followed by `PXR_PLUGINPATH_NAME` entries
pub fn plugin_search_paths() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = [
        "/usr/local/lib/usd/plugins",
        "/opt/pixar/usd/plugins",
        "/opt/adobe/usd/plugins",
    ]
    .iter()
    .map(PathBuf::from)
    .collect();

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".usd").join("plugins"));
    }
    if let Some(extra) = std::env::var_os("PXR_PLUGINPATH_NAME") {
        paths.extend(std::env::split_paths(&extra));
    }
    paths
}

/// Looks for a `plugInfo.json` under `roots` whose contents mention `needle`
pub fn find_plugin_info(roots: &[PathBuf], needle: &str) -> Option<PathBuf> {
    let needle = needle.to_ascii_lowercase();
    for root in roots.iter().filter(|r| r.is_dir()) {
        let mut stack = vec![root.clone()];
        while let Some(dir) = stack.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if path.file_name().is_some_and(|n| n == "plugInfo.json") {
                    let mentions = std::fs::read_to_string(&path)
                        .map(|text| text.to_ascii_lowercase().contains(&needle))
                        .unwrap_or(false);
                    if mentions {
                        return Some(path);
                    }
                }
            }
        }
    }
    None
}
