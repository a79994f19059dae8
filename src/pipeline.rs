//! End-to-end FIDB build for one SDK.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::info;

use crate::analyze::{write_properties, Analyzer};
use crate::config::{Config, Toolset};
use crate::error::{Error, Result, Stage};
use crate::tree::{BuildSummary, TreeBuilder};

/// One SDK to turn into a Function ID database.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Database name; the output file is `<fidb_name>.fidb`.
    pub fidb_name: String,
    pub sdk_root: PathBuf,
    /// Defaults to `fid_work_<fidb_name>` in the current directory.
    pub work_dir: Option<PathBuf>,
    /// Classify and print the analyzer commands without touching anything.
    pub dry_run: bool,
}

impl BuildRequest {
    pub fn new(fidb_name: impl Into<String>, sdk_root: impl Into<PathBuf>) -> Self {
        Self {
            fidb_name: fidb_name.into(),
            sdk_root: sdk_root.into(),
            work_dir: None,
            dry_run: false,
        }
    }

    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("fid_work_{}", self.fidb_name)))
    }
}

/// Result of [`build_fidb`].
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub summary: BuildSummary,
    pub work_dir: PathBuf,
    /// File name of the generated database; `None` for a dry run.
    pub fidb: Option<String>,
    /// Both analyzer command lines, in run order.
    pub commands: [String; 2],
}

/// Build the database for one SDK.
///
/// Fails before touching the filesystem if Ghidra cannot be found or the work
/// directory already exists. Either analyzer run failing aborts the build.
pub fn build_fidb(request: &BuildRequest, config: &Config) -> Result<BuildReport> {
    let ghidra_home = config.resolve_ghidra_home()?;
    let analyzer = Analyzer::locate(&ghidra_home, &config.processor)?;
    run_build(request, config, &analyzer)
}

/// [`build_fidb`] with an already located analyzer.
pub fn run_build(
    request: &BuildRequest,
    config: &Config,
    analyzer: &Analyzer,
) -> Result<BuildReport> {
    let sdk_root = fs::canonicalize(&request.sdk_root)
        .with_context(|| format!("SDK root not found: {}", request.sdk_root.display()))?;
    let work_dir = request.work_dir();
    let tools = Toolset::resolve(&config.tools, &sdk_root);

    info!(
        sdk_root = %sdk_root.display(),
        work_dir = %work_dir.display(),
        "building {}",
        request.fidb_name
    );
    for tool in tools.iter() {
        info!("{tool}");
    }

    let summary = TreeBuilder::new(&sdk_root, &work_dir, &tools, &config.filters)
        .dry_run(request.dry_run)
        .build()?;

    let import_args = analyzer.import_args(&request.fidb_name, &summary.toolchains);
    let generate_args = analyzer.generate_args(&request.fidb_name);
    let commands = [
        analyzer.command_line(&import_args),
        analyzer.command_line(&generate_args),
    ];

    if request.dry_run {
        info!("dry run: no folders created, no files copied, analyzeHeadless not invoked");
        return Ok(BuildReport {
            summary,
            work_dir,
            fidb: None,
            commands,
        });
    }

    let Some(&library_root) = summary.toolchains.first() else {
        return Err(Error::NoFilesCopied(sdk_root));
    };

    analyzer.run(Stage::Import, &import_args, &work_dir)?;
    write_properties(&work_dir, &request.fidb_name, library_root, &config.processor)?;
    analyzer.run(Stage::Generate, &generate_args, &work_dir)?;

    let fidb = format!("{}.fidb", request.fidb_name);
    info!("FIDB generated: {fidb}");
    Ok(BuildReport {
        summary,
        work_dir,
        fidb: Some(fidb),
        commands,
    })
}

/// Default database name for an SDK directory: its final path component.
pub fn default_fidb_name(sdk_root: &Path) -> String {
    sdk_root
        .canonicalize()
        .ok()
        .as_deref()
        .unwrap_or(sdk_root)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sdk".to_string())
}
