//! Copying and unpacking SDK files into the destination tree.
//!
//! Archives are never unpacked in place: each one is staged into a private
//! temporary directory, the external helper runs there, and the results are
//! moved into the destination. The temporary directory is removed when it
//! goes out of scope, on success or failure.

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{error, info, warn};

use crate::classify::{is_elf, HandlingMode};
use crate::config::{ToolDescriptor, Toolset};

/// What happened to one source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractOutcome {
    /// False if a helper was missing or failed.
    pub success: bool,
    /// Files placed into the destination directory.
    pub files: usize,
    /// Diagnostic for skips and failures.
    pub message: Option<String>,
}

impl ExtractOutcome {
    fn produced(files: usize) -> Self {
        Self {
            success: true,
            files,
            message: None,
        }
    }

    fn skipped(message: String) -> Self {
        Self {
            success: true,
            files: 0,
            message: Some(message),
        }
    }

    fn failed(files: usize, message: String) -> Self {
        Self {
            success: false,
            files,
            message: Some(message),
        }
    }
}

/// Copy or unpack `src` into `dst_dir` according to `mode`.
///
/// Per-file problems (missing helper, existing destination, helper failure)
/// are reported through the returned [`ExtractOutcome`]. Only I/O errors on
/// the destination side are returned as `Err`.
pub fn extract_or_copy(
    mode: HandlingMode,
    src: &Path,
    dst_dir: &Path,
    tools: &Toolset,
) -> Result<ExtractOutcome> {
    match mode {
        HandlingMode::Copy => copy_file(src, dst_dir),
        HandlingMode::Archiver => unpack(&tools.ar, mode, src, dst_dir, tools),
        HandlingMode::Splitter => unpack(&tools.libsplit, mode, src, dst_dir, tools),
    }
}

/// Copy a single file, preserving permissions and modification time.
///
/// An existing destination is never replaced; the copy is skipped instead.
pub fn copy_file(src: &Path, dst_dir: &Path) -> Result<ExtractOutcome> {
    let name = src
        .file_name()
        .with_context(|| format!("Source has no file name: {}", src.display()))?;
    let dst = dst_dir.join(name);

    if dst.exists() {
        warn!(dst = %dst.display(), "destination already exists - skipping copy");
        return Ok(ExtractOutcome::skipped(format!(
            "destination already exists: {}",
            dst.display()
        )));
    }

    info!(src = %src.display(), dst = %dst.display(), "copy");
    fs::copy(src, &dst)
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
    preserve_mtime(src, &dst)?;
    Ok(ExtractOutcome::produced(1))
}

fn preserve_mtime(src: &Path, dst: &Path) -> Result<()> {
    let modified = fs::metadata(src)
        .and_then(|m| m.modified())
        .with_context(|| format!("Failed to read metadata: {}", src.display()))?;
    open_for_times(dst)
        .and_then(|file| file.set_modified(modified))
        .with_context(|| format!("Failed to set mtime: {}", dst.display()))?;
    Ok(())
}

/// Open a file so its timestamps can be set without write access to its
/// contents; read-only sources stay read-only after `fs::copy`.
#[cfg(not(windows))]
fn open_for_times(path: &Path) -> io::Result<fs::File> {
    fs::File::open(path)
}

#[cfg(windows)]
fn open_for_times(path: &Path) -> io::Result<fs::File> {
    use std::os::windows::fs::OpenOptionsExt;
    const FILE_WRITE_ATTRIBUTES: u32 = 0x0100;
    fs::File::options()
        .access_mode(FILE_WRITE_ATTRIBUTES)
        .open(path)
}

fn unpack(
    tool: &ToolDescriptor,
    mode: HandlingMode,
    src: &Path,
    dst_dir: &Path,
    tools: &Toolset,
) -> Result<ExtractOutcome> {
    let name = src
        .file_name()
        .with_context(|| format!("Source has no file name: {}", src.display()))?;

    if !tool.exists {
        warn!(
            tool = tool.name,
            path = %tool.path.display(),
            file = %name.to_string_lossy(),
            "tool not found - cannot process file"
        );
        return Ok(ExtractOutcome::failed(
            0,
            format!("{} not found: {}", tool.name, tool.path.display()),
        ));
    }

    info!(tool = tool.name, file = %name.to_string_lossy(), dst = %dst_dir.display(), "extract");

    let tmp = tempfile::Builder::new()
        .prefix("sdk-fidb-")
        .tempdir()
        .context("Failed to create temporary directory")?;
    let staged = tmp.path().join(name);
    let staged_name = name.to_string_lossy().into_owned();
    let mut failures = Vec::new();

    match fs::copy(src, &staged) {
        Ok(_) => {
            let mut args = Vec::with_capacity(2);
            if mode == HandlingMode::Archiver {
                args.push("xo");
            }
            args.push(staged_name.as_str());
            if let Err(e) = run_tool(tool, &args, tmp.path()) {
                error!(tool = tool.name, file = %staged_name, "extraction failed: {e}");
                failures.push(e);
            }
            remove_if_present(&staged)?;
        }
        Err(e) => {
            let msg = format!("failed to stage {}: {e}", src.display());
            error!(tool = tool.name, "{msg}");
            failures.push(msg);
        }
    }

    match mode {
        HandlingMode::Archiver => fix_extracted_files(tmp.path())?,
        HandlingMode::Splitter => convert_objects(tmp.path(), &tools.elfcnv, &mut failures)?,
        HandlingMode::Copy => {}
    }

    let files = move_tmp_files(tmp.path(), dst_dir)?;

    if failures.is_empty() {
        Ok(ExtractOutcome::produced(files))
    } else {
        Ok(ExtractOutcome::failed(files, failures.join("; ")))
    }
}

/// Run an external helper synchronously in `cwd`.
///
/// A spawn failure or a non-zero exit status is returned as a diagnostic.
fn run_tool(tool: &ToolDescriptor, args: &[&str], cwd: &Path) -> std::result::Result<(), String> {
    let output = Command::new(&tool.path)
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|e| format!("{} failed to start: {e}", tool.name))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "{} {} exited with {}: {}",
            tool.name,
            args.join(" "),
            output.status,
            stderr.trim()
        ));
    }
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .map(|e| e.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

/// `ar` members can come out read-only, and some ELF members carry a wrong
/// or missing extension. Fix both before the move.
fn fix_extracted_files(dir: &Path) -> Result<()> {
    for path in sorted_entries(dir)? {
        if !path.is_file() {
            continue;
        }
        clear_readonly(&path)?;

        let is_elf_ext = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("elf"));
        if is_elf_ext || !is_elf(&path) {
            continue;
        }
        let renamed = path.with_extension("elf");
        if renamed.exists() {
            warn!(file = %path.display(), "cannot rename ELF member, target exists");
            continue;
        }
        fs::rename(&path, &renamed)
            .with_context(|| format!("Failed to rename {}", path.display()))?;
    }
    Ok(())
}

/// Clear the read-only attribute of a file.
///
/// Returns `Ok(true)` if the permissions were changed.
pub fn clear_readonly(path: &Path) -> Result<bool> {
    let mut perms = fs::metadata(path)
        .with_context(|| format!("Failed to read metadata: {}", path.display()))?
        .permissions();
    if !perms.readonly() {
        return Ok(false);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        perms.set_mode(0o644);
    }
    #[cfg(not(unix))]
    perms.set_readonly(false);
    fs::set_permissions(path, perms)
        .with_context(|| format!("Failed to set permissions: {}", path.display()))?;
    Ok(true)
}

/// Convert every `.obj` produced by `libsplit` to `.elf` with `elfcnv`.
///
/// A failed conversion leaves the `.obj` in place.
fn convert_objects(
    dir: &Path,
    elfcnv: &ToolDescriptor,
    failures: &mut Vec<String>,
) -> Result<()> {
    for path in sorted_entries(dir)? {
        let is_obj = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("obj"));
        if !is_obj || !path.is_file() {
            continue;
        }
        let Some(obj_name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        if !elfcnv.exists {
            warn!(path = %elfcnv.path.display(), file = %obj_name, "elfcnv not found - keeping .obj");
            failures.push(format!("elfcnv not found, {obj_name} not converted"));
            continue;
        }

        let elf = path.with_extension("elf");
        let elf_name = elf
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match run_tool(elfcnv, &[&obj_name, &elf_name], dir) {
            Ok(()) => remove_if_present(&path)?,
            Err(e) => {
                error!(file = %obj_name, "elfcnv failed: {e}");
                failures.push(e);
            }
        }
    }
    Ok(())
}

/// Move every file out of `tmp_dir` into `dst_dir`.
///
/// Files whose name already exists in `dst_dir` stay behind (and are removed
/// with the temporary directory). Returns the number of files moved.
pub fn move_tmp_files(tmp_dir: &Path, dst_dir: &Path) -> Result<usize> {
    let mut moved = 0;
    for path in sorted_entries(tmp_dir)? {
        let Some(name) = path.file_name() else {
            continue;
        };
        let dst = dst_dir.join(name);
        if dst.exists() {
            warn!(dst = %dst.display(), "extraction destination already exists");
            continue;
        }
        move_file(&path, &dst)?;
        moved += 1;
    }
    Ok(moved)
}

/// Rename, falling back to copy and delete when the temporary directory
/// lives on another filesystem.
fn move_file(src: &Path, dst: &Path) -> Result<()> {
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    fs::copy(src, dst)
        .with_context(|| format!("Failed to move {} to {}", src.display(), dst.display()))?;
    fs::remove_file(src).with_context(|| format!("Failed to remove {}", src.display()))?;
    Ok(())
}
