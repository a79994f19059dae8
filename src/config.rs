//! Build configuration and external tool descriptors.
//!
//! [`Config`] is loaded once (from TOML or defaults) and passed by reference
//! to every stage. Tool paths are resolved against the SDK root into a
//! [`Toolset`], which is read-only for the rest of the run.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Processor / language identifier handed to Ghidra.
pub const DEFAULT_PROCESSOR: &str = "SuperH4:LE:32:default";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Ghidra installation directory. Falls back to `$GHIDRA_HOME`.
    #[serde(default)]
    pub ghidra_home: Option<PathBuf>,

    /// Ghidra language ID used for import and database population.
    #[serde(default = "default_processor")]
    pub processor: String,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub filters: Filters,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ghidra_home: None,
            processor: default_processor(),
            tools: ToolsConfig::default(),
            filters: Filters::default(),
        }
    }
}

fn default_processor() -> String {
    DEFAULT_PROCESSOR.to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.processor.trim().is_empty() {
            return Err(Error::Config("processor must not be empty".to_string()));
        }
        if self.filters.extensions.is_empty() {
            return Err(Error::Config(
                "filters.extensions must list at least one extension".to_string(),
            ));
        }
        if let Some(ext) = self.filters.extensions.iter().find(|e| !e.starts_with('.')) {
            return Err(Error::Config(format!(
                "filters.extensions entries must start with '.', got {ext:?}"
            )));
        }
        for (name, tool) in self.tools.entries() {
            if tool.path.as_os_str().is_empty() {
                return Err(Error::Config(format!("tools.{name}.path must not be empty")));
            }
        }
        Ok(())
    }

    /// The Ghidra home from the config, else from `$GHIDRA_HOME`.
    pub fn resolve_ghidra_home(&self) -> Result<PathBuf> {
        if let Some(home) = &self.ghidra_home {
            return Ok(home.clone());
        }
        std::env::var_os("GHIDRA_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .ok_or(Error::GhidraHomeUnset)
    }
}

/// Where to find one external helper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    pub path: PathBuf,

    /// Path is relative to the SDK root rather than absolute.
    #[serde(default = "default_relative")]
    pub relative: bool,
}

fn default_relative() -> bool {
    true
}

impl ToolConfig {
    fn sdk_relative(path: &str) -> Self {
        Self {
            path: PathBuf::from(path),
            relative: true,
        }
    }
}

/// The three external helpers shipped inside the SDK.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_ar")]
    pub ar: ToolConfig,
    #[serde(default = "default_libsplit")]
    pub libsplit: ToolConfig,
    #[serde(default = "default_elfcnv")]
    pub elfcnv: ToolConfig,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ar: default_ar(),
            libsplit: default_libsplit(),
            elfcnv: default_elfcnv(),
        }
    }
}

fn default_ar() -> ToolConfig {
    ToolConfig::sdk_relative("Utl/Dev/Gnu/Bin/ar.exe")
}

fn default_libsplit() -> ToolConfig {
    ToolConfig::sdk_relative("Utl/Dev/Hitachi/libsplit.exe")
}

fn default_elfcnv() -> ToolConfig {
    ToolConfig::sdk_relative("Utl/Dev/Hitachi/elfcnv.exe")
}

impl ToolsConfig {
    fn entries(&self) -> [(&'static str, &ToolConfig); 3] {
        [
            ("ar", &self.ar),
            ("libsplit", &self.libsplit),
            ("elfcnv", &self.elfcnv),
        ]
    }
}

/// File selection rules for the tree walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filters {
    /// Allow-listed extensions, including the leading dot. Case-insensitive.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Directory names whose contents are skipped (whole path components).
    #[serde(default = "default_ignore_dirs")]
    pub ignore_dirs: Vec<String>,

    /// Lowercase file names that are always skipped.
    #[serde(default = "default_ignore_files")]
    pub ignore_files: Vec<String>,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            ignore_dirs: default_ignore_dirs(),
            ignore_files: default_ignore_files(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    [".o", ".a", ".elf", ".obj", ".lib"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_ignore_dirs() -> Vec<String> {
    ["demo", "sample", "vmutool"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_ignore_files() -> Vec<String> {
    vec!["copying.lib".to_string()]
}

/// A resolved external helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub path: PathBuf,
    pub exists: bool,
}

impl ToolDescriptor {
    /// Resolve `config` against `sdk_root` and check for existence once.
    ///
    /// The result is absolute, since helpers run inside temporary directories.
    pub fn resolve(name: &'static str, config: &ToolConfig, sdk_root: &Path) -> Self {
        let joined = if config.relative {
            sdk_root.join(&config.path)
        } else {
            config.path.clone()
        };
        let path = std::path::absolute(&joined).unwrap_or(joined);
        let exists = path.is_file();
        debug!(tool = name, path = %path.display(), exists, "resolved tool");
        Self { name, path, exists }
    }
}

impl fmt::Display for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<9}({}) {}",
            self.name,
            if self.exists { "found" } else { "MISSING" },
            self.path.display()
        )
    }
}

/// Archiver, library splitter, and format converter for one SDK.
#[derive(Debug, Clone)]
pub struct Toolset {
    pub ar: ToolDescriptor,
    pub libsplit: ToolDescriptor,
    pub elfcnv: ToolDescriptor,
}

impl Toolset {
    pub fn resolve(config: &ToolsConfig, sdk_root: &Path) -> Self {
        Self {
            ar: ToolDescriptor::resolve("ar", &config.ar, sdk_root),
            libsplit: ToolDescriptor::resolve("libsplit", &config.libsplit, sdk_root),
            elfcnv: ToolDescriptor::resolve("elfcnv", &config.elfcnv, sdk_root),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        [&self.ar, &self.libsplit, &self.elfcnv].into_iter()
    }
}
