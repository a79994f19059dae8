//! SDK tree walk and destination layout.
//!
//! Every allow-listed file under the SDK root lands in
//! `<work_dir>/<toolchain>/<file name>/<variant>/<sdk name>/`, the layout
//! Ghidra's `CreateMultipleLibraries` script expects at a depth of three.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::classify::{
    detect_toolchain, detect_variant, Candidate, HandlingMode, Toolchain, Variant,
};
use crate::config::{Filters, Toolset};
use crate::error::{Error, Result};
use crate::extract::extract_or_copy;

/// Name of the Ghidra project directory inside the work directory.
pub const PROJECT_DIR: &str = "ghidraproj";

/// Totals for one tree walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    /// Files placed into the destination tree (in dry-run: files that would be processed).
    pub files: usize,
    /// Toolchains seen among processed files.
    pub toolchains: BTreeSet<Toolchain>,
    /// Files skipped by the ignore rules.
    pub ignored: usize,
    /// Files skipped because no toolchain rule matched.
    pub unrecognized: usize,
    /// Files whose copy or extraction reported a failure.
    pub failed: usize,
}

/// Populates the destination tree from one SDK.
#[derive(Debug)]
pub struct TreeBuilder<'a> {
    sdk_root: &'a Path,
    work_dir: &'a Path,
    sdk_name: String,
    tools: &'a Toolset,
    filters: &'a Filters,
    dry_run: bool,
}

impl<'a> TreeBuilder<'a> {
    /// The SDK name defaults to the last component of `sdk_root`.
    pub fn new(
        sdk_root: &'a Path,
        work_dir: &'a Path,
        tools: &'a Toolset,
        filters: &'a Filters,
    ) -> Self {
        let sdk_name = sdk_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sdk".to_string());
        Self {
            sdk_root,
            work_dir,
            sdk_name,
            tools,
            filters,
            dry_run: false,
        }
    }

    pub fn sdk_name(mut self, name: impl Into<String>) -> Self {
        self.sdk_name = name.into();
        self
    }

    /// Classify and report only; create nothing.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Create the work directory and the Ghidra project directory.
    ///
    /// Fails if the work directory already exists, so two runs never merge.
    pub fn prepare(&self) -> Result<()> {
        if self.work_dir.exists() {
            return Err(Error::WorkDirExists(self.work_dir.to_path_buf()));
        }
        fs::create_dir_all(self.work_dir.join(PROJECT_DIR))?;
        Ok(())
    }

    /// Walk the SDK and populate the destination tree.
    ///
    /// Returns [`Error::NoFilesCopied`] if nothing was produced.
    pub fn build(&self) -> Result<BuildSummary> {
        if !self.dry_run {
            self.prepare()?;
        }

        let mut summary = BuildSummary::default();

        for path in collect_files(self.sdk_root)? {
            let candidate = Candidate::within(&path, self.sdk_root);
            if !self.filters.has_allowed_extension(&candidate) {
                continue;
            }
            if should_ignore(&candidate, self.filters) {
                summary.ignored += 1;
                continue;
            }

            let Some(toolchain) = detect_toolchain(&candidate) else {
                warn!(file = %path.display(), "unknown compiler");
                summary.unrecognized += 1;
                continue;
            };
            summary.toolchains.insert(toolchain);

            let variant = detect_variant(&candidate);
            let Some(library) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let dst_dir =
                destination_dir(self.work_dir, toolchain, &library, variant, &self.sdk_name);
            let mode = HandlingMode::for_file(&candidate);

            if self.dry_run {
                info!(%mode, file = %path.display(), dst = %dst_dir.display(), "would process");
                summary.files += 1;
                continue;
            }

            if !dst_dir.exists() {
                debug!(dir = %dst_dir.display(), "mkdir");
                fs::create_dir_all(&dst_dir)?;
            }

            let outcome = extract_or_copy(mode, &path, &dst_dir, self.tools)?;
            if !outcome.success {
                summary.failed += 1;
            }
            summary.files += outcome.files;
        }

        if summary.files == 0 {
            return Err(Error::NoFilesCopied(self.sdk_root.to_path_buf()));
        }
        info!(
            files = summary.files,
            ignored = summary.ignored,
            unrecognized = summary.unrecognized,
            failed = summary.failed,
            "copied {} files",
            summary.files
        );
        Ok(summary)
    }
}

impl Filters {
    fn has_allowed_extension(&self, candidate: &Candidate<'_>) -> bool {
        !candidate.extension.is_empty()
            && self
                .extensions
                .iter()
                .any(|e| e.eq_ignore_ascii_case(&candidate.extension))
    }
}

/// Whether a file is excluded by name or by one of its directories.
///
/// Directory names match whole path components, so `demo` skips
/// `demo/x.o` but not `demos/x.o`.
pub fn should_ignore(candidate: &Candidate<'_>, filters: &Filters) -> bool {
    let name = candidate.file_name();
    if filters.ignore_files.iter().any(|f| f.eq_ignore_ascii_case(name)) {
        return true;
    }
    candidate
        .dirs()
        .iter()
        .any(|d| filters.ignore_dirs.iter().any(|i| i.eq_ignore_ascii_case(d)))
}

/// `<work_dir>/<toolchain>/<library>/<variant>/<sdk_name>`.
pub fn destination_dir(
    work_dir: &Path,
    toolchain: Toolchain,
    library: &str,
    variant: Variant,
    sdk_name: &str,
) -> PathBuf {
    work_dir
        .join(toolchain.as_str())
        .join(library)
        .join(variant.as_str())
        .join(sdk_name)
}

/// All regular files under `root`, in sorted order. Symlinks are not followed.
pub fn collect_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }

    files.sort();
    Ok(files)
}
