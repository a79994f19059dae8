//! Function ID database builder for vendor SDK trees.
//!
//! Walks an SDK, sorts its object files and archives by toolchain and build
//! variant into `<toolchain>/<library>/<variant>/<sdk>/`, unpacking archives
//! with the SDK's own `ar`, `libsplit`, and `elfcnv`, then drives Ghidra's
//! `analyzeHeadless` to produce a `.fidb` from the result.

pub mod analyze;
pub mod classify;
pub mod config;
mod error;
pub mod extract;
pub mod pipeline;
pub mod tree;

pub use analyze::{render_properties, write_properties, Analyzer};
pub use classify::{
    detect_toolchain, detect_variant, is_ar_archive, is_elf, Candidate, HandlingMode, Toolchain,
    Variant,
};
pub use config::{Config, Filters, ToolDescriptor, Toolset};
pub use error::{Error, Result, Stage};
pub use extract::{copy_file, extract_or_copy, ExtractOutcome};
pub use pipeline::{build_fidb, run_build, BuildReport, BuildRequest};
pub use tree::{destination_dir, should_ignore, BuildSummary, TreeBuilder};
