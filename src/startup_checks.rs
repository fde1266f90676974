//! Environment checks for the conversion pipeline
//! Reports which external tools, plugins and USD features are available

use std::fmt;
use std::path::PathBuf;

use crate::converters::alembic::ALEMBIC_PLUGIN;
use crate::converters::external::{query_version, ToolPaths};
use crate::converters::fbx::FBX_PLUGIN;
use crate::scene::plugin::{find_plugin_info, plugin_search_paths};
use crate::scene::SceneBackend;

/// Result of probing one command line tool
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCheck {
    pub name: &'static str,
    pub path: PathBuf,
    /// `Ok(version)` when the tool answered `--version`
    pub status: Result<String, String>,
}

/// Whether a file format plugin is usable
#[derive(Debug, Clone, PartialEq)]
pub struct PluginCheck {
    pub name: &'static str,
    pub loaded: bool,
    /// `plugInfo.json` found on the search paths
    pub plug_info: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentReport {
    pub backend: &'static str,
    pub materialx: bool,
    pub usd_version: Option<String>,
    pub tools: Vec<ToolCheck>,
    pub plugins: Vec<PluginCheck>,
}

impl EnvironmentReport {
    /// True when at least one external FBX or Alembic route is present
    pub fn has_external_routes(&self) -> bool {
        self.tools.iter().any(|t| t.status.is_ok()) || self.plugins.iter().any(|p| p.loaded)
    }
}

/// Checks tools, plugins and the MaterialX capability of `backend`
pub fn check_environment(backend: &dyn SceneBackend, tools: &ToolPaths) -> EnvironmentReport {
    log::info!("Checking conversion environment...");

    let tools = [("usdcat", &tools.usdcat), ("fbx2usd", &tools.fbx2usd)]
        .into_iter()
        .map(|(name, path)| ToolCheck {
            name,
            path: path.clone(),
            status: query_version(path).map_err(|e| e.to_string()),
        })
        .collect();

    let search_paths = plugin_search_paths();
    let plugins = [(FBX_PLUGIN, "fbx"), (ALEMBIC_PLUGIN, "abc")]
        .into_iter()
        .map(|(name, needle)| PluginCheck {
            name,
            loaded: backend.has_plugin(name),
            plug_info: find_plugin_info(&search_paths, needle),
        })
        .collect();

    EnvironmentReport {
        backend: backend.name(),
        materialx: backend.supports_materialx(),
        usd_version: usd_version(),
        tools,
        plugins,
    }
}

#[cfg(feature = "usd")]
fn usd_version() -> Option<String> {
    use crate::scene::python::local_usd;

    match local_usd::get_usd_version() {
        Ok((major, minor, patch)) => Some(format!("{}.{}.{}", major, minor, patch)),
        Err(e) => {
            log::warn!("USD found but version check failed: {}", e);
            None
        }
    }
}

#[cfg(not(feature = "usd"))]
fn usd_version() -> Option<String> {
    None
}

impl fmt::Display for EnvironmentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scene backend: {}", self.backend)?;
        if let Some(version) = &self.usd_version {
            writeln!(f, "  ✓ USD {}", version)?;
        }
        let mark = |ok: bool| if ok { "✓" } else { "⚠️ " };
        writeln!(f, "  {} MaterialX shaders", mark(self.materialx))?;

        writeln!(f, "Tools:")?;
        for tool in &self.tools {
            match &tool.status {
                Ok(version) => writeln!(f, "  ✓ {} ({}) {}", tool.name, tool.path.display(), version)?,
                Err(e) => writeln!(f, "  ⚠️  {}: {}", tool.name, e)?,
            }
        }

        writeln!(f, "Plugins:")?;
        for plugin in &self.plugins {
            match (&plugin.plug_info, plugin.loaded) {
                (_, true) => writeln!(f, "  ✓ {} loaded", plugin.name)?,
                (Some(path), false) => writeln!(f, "  ✓ {} at {}", plugin.name, path.display())?,
                (None, false) => writeln!(f, "  ⚠️  {} not found", plugin.name)?,
            }
        }
        Ok(())
    }
}
