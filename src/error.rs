//! Error types for the FIDB build pipeline.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Fatal errors that abort a build.
///
/// Per-file problems (unknown toolchain, existing destination, missing
/// optional helper) are never errors; they are logged and the file is skipped.
#[derive(Debug, Error)]
pub enum Error {
    /// `analyzeHeadless` could not be found under the Ghidra installation.
    #[error("Ghidra not installed or GHIDRA_HOME not set correctly. Not found: {}", .0.display())]
    AnalyzerNotFound(PathBuf),

    /// Neither the config file nor the environment named a Ghidra installation.
    #[error("no Ghidra installation configured (set GHIDRA_HOME or ghidra_home in config)")]
    GhidraHomeUnset,

    /// The work directory left over from a previous run.
    #[error("{} already exists. Remove it before running the build.", .0.display())]
    WorkDirExists(PathBuf),

    /// The tree walk produced nothing to analyze.
    #[error("no SDK files were copied from {}. Check filters or paths.", .0.display())]
    NoFilesCopied(PathBuf),

    /// One of the two `analyzeHeadless` invocations failed.
    #[error("analyzeHeadless {stage} run failed: {reason}")]
    AnalyzerFailed { stage: Stage, reason: String },

    /// Invalid configuration file.
    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn analyzer_status(stage: Stage, status: ExitStatus) -> Self {
        Error::AnalyzerFailed {
            stage,
            reason: format!("exited with {status}"),
        }
    }
}

/// The two `analyzeHeadless` invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Import,
    Generate,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Import => f.write_str("first (import)"),
            Stage::Generate => f.write_str("second (generate)"),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
