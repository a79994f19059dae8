//! Ghidra headless analyzer driver.
//!
//! The database is built in two synchronous `analyzeHeadless` runs inside the
//! work directory:
//!
//! 1. import and analyze every toolchain folder with the Function ID
//!    pre/post scripts;
//! 2. without re-analysis, create an empty FIDB and populate it from the
//!    per-library folders described by `CreateMultipleLibraries.properties`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::info;

use crate::classify::Toolchain;
use crate::error::{Error, Result, Stage};
use crate::tree::PROJECT_DIR;

/// Properties file read by `CreateMultipleLibraries.java`.
pub const PROPERTIES_FILE: &str = "CreateMultipleLibraries.properties";
pub const DUPLICATES_FILE: &str = "duplicates.txt";
pub const COMMON_SYMBOLS_FILE: &str = "common_symbols.txt";

#[cfg(windows)]
const ANALYZER_NAME: &str = "analyzeHeadless.bat";
#[cfg(not(windows))]
const ANALYZER_NAME: &str = "analyzeHeadless";

/// A located `analyzeHeadless` launcher.
#[derive(Debug, Clone)]
pub struct Analyzer {
    path: PathBuf,
    processor: String,
}

impl Analyzer {
    /// Find `support/analyzeHeadless` under a Ghidra installation.
    ///
    /// The path is made absolute here: the analyzer runs with the work
    /// directory as its current directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AnalyzerNotFound`] if the launcher does not exist.
    pub fn locate(ghidra_home: &Path, processor: &str) -> Result<Self> {
        let path = std::path::absolute(ghidra_home.join("support").join(ANALYZER_NAME))?;
        if !path.is_file() {
            return Err(Error::AnalyzerNotFound(path));
        }
        Ok(Self::new(path, processor))
    }

    pub fn new(path: impl Into<PathBuf>, processor: &str) -> Self {
        Self {
            path: path.into(),
            processor: processor.to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Arguments for the import/analyze run, one `-import` per toolchain.
    pub fn import_args<'t>(
        &self,
        fidb_name: &str,
        toolchains: impl IntoIterator<Item = &'t Toolchain>,
    ) -> Vec<String> {
        let mut args = vec![PROJECT_DIR.to_string(), fidb_name.to_string()];
        for toolchain in toolchains {
            args.push("-import".to_string());
            args.push(toolchain.as_str().to_string());
        }
        args.extend(
            [
                "-recursive",
                "-processor",
                self.processor.as_str(),
                "-preScript",
                "FunctionIDHeadlessPrescript.java",
                "-postScript",
                "FunctionIDHeadlessPostscript.java",
                "-scriptlog",
                "script.log",
                "-log",
                "analyze.log",
            ]
            .map(String::from),
        );
        args
    }

    /// Arguments for the database generation run.
    pub fn generate_args(&self, fidb_name: &str) -> Vec<String> {
        let fidb_file = format!("{fidb_name}.fidb");
        [
            PROJECT_DIR,
            fidb_name,
            "-noanalysis",
            "-propertiesPath",
            ".",
            "-preScript",
            "CreateEmptyFidDatabase.java",
            fidb_file.as_str(),
            "-preScript",
            "FunctionIDHeadlessPrescript.java",
            "-preScript",
            "CreateMultipleLibraries.java",
            "-log",
            "generation.log",
        ]
        .map(String::from)
        .to_vec()
    }

    /// The full command line, for display.
    pub fn command_line(&self, args: &[String]) -> String {
        let mut line = self.path.display().to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Run the analyzer in `work_dir` and wait for it.
    ///
    /// Output is inherited so Ghidra's progress reaches the terminal.
    /// Any failure is fatal; there is no retry.
    pub fn run(&self, stage: Stage, args: &[String], work_dir: &Path) -> Result<()> {
        info!(%stage, cmd = %self.command_line(args), "running analyzeHeadless");
        let status = Command::new(&self.path)
            .args(args)
            .current_dir(work_dir)
            .status()
            .map_err(|e| Error::AnalyzerFailed {
                stage,
                reason: format!("failed to start {}: {e}", self.path.display()),
            })?;
        if !status.success() {
            return Err(Error::analyzer_status(stage, status));
        }
        Ok(())
    }
}

/// Render `CreateMultipleLibraries.properties`.
///
/// `library_root` is the toolchain folder holding libraries at a depth of
/// three (`<library>/<variant>/<sdk>`).
pub fn render_properties(fidb_name: &str, library_root: Toolchain, processor: &str) -> String {
    format!(
        "Duplicate Results File OK = {DUPLICATES_FILE}\n\
         Do Duplication Detection Do you want to detect duplicates = true\n\
         Choose destination FidDB Please choose the destination FidDB for population = {fidb_name}.fidb\n\
         Select root folder containing all libraries (at a depth of 3): = /{library_root}\n\
         Common symbols file (optional): OK = {COMMON_SYMBOLS_FILE}\n\
         Enter LanguageID To Process Language ID: = {processor}\n"
    )
}

/// Write the properties file and the two empty marker files.
///
/// Returns the path of the properties file.
pub fn write_properties(
    work_dir: &Path,
    fidb_name: &str,
    library_root: Toolchain,
    processor: &str,
) -> Result<PathBuf> {
    let props = work_dir.join(PROPERTIES_FILE);
    fs::write(&props, render_properties(fidb_name, library_root, processor))?;
    fs::write(work_dir.join(DUPLICATES_FILE), b"")?;
    fs::write(work_dir.join(COMMON_SYMBOLS_FILE), b"")?;
    info!(
        props = %props.display(),
        "created properties, empty {DUPLICATES_FILE} and {COMMON_SYMBOLS_FILE}"
    );
    Ok(props)
}
