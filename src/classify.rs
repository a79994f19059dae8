//! Toolchain, variant, and archive-type classification.
//!
//! Everything here is a pure function of a file's path and its first few
//! bytes. Toolchain and variant detection are ordered rule tables: the first
//! matching rule wins.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path};

/// Magic string at the start of a Unix `ar` archive.
pub const AR_MAGIC: &[u8; 7] = b"!<arch>";

/// Magic bytes at the start of an ELF file.
pub const ELF_MAGIC: &[u8; 4] = b"\x7fELF";

/// Compiler family that produced a binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Toolchain {
    /// GNU toolchain (`sh-elf-gcc`).
    Gcc,
    /// Hitachi / CodeWarrior SHC toolchain.
    Shc,
}

impl Toolchain {
    pub fn as_str(self) -> &'static str {
        match self {
            Toolchain::Gcc => "gcc",
            Toolchain::Shc => "shc",
        }
    }
}

impl fmt::Display for Toolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build variant, baked into the ABI by compiler flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Variant {
    M4SingleOnly,
    M4Single,
    NoMacSave,
    M4,
    Ml,
    #[default]
    Default,
}

impl Variant {
    pub fn as_str(self) -> &'static str {
        match self {
            Variant::M4SingleOnly => "m4-single-only",
            Variant::M4Single => "m4-single",
            Variant::NoMacSave => "mnomacsave",
            Variant::M4 => "m4",
            Variant::Ml => "ml",
            Variant::Default => "default",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a source file gets into the destination tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlingMode {
    /// Plain copy.
    Copy,
    /// Unix archive, unpacked with `ar xo`.
    Archiver,
    /// SHC library, split with `libsplit` and converted with `elfcnv`.
    Splitter,
}

impl HandlingMode {
    pub fn for_file(candidate: &Candidate<'_>) -> Self {
        if is_ar_archive(candidate.path) {
            HandlingMode::Archiver
        } else if candidate.extension == ".lib" {
            HandlingMode::Splitter
        } else {
            HandlingMode::Copy
        }
    }
}

impl fmt::Display for HandlingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HandlingMode::Copy => "copy",
            HandlingMode::Archiver => "ar",
            HandlingMode::Splitter => "libsplit",
        })
    }
}

/// A file under consideration, with its path segments pre-lowercased.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    /// Path used for reading content.
    pub path: &'a Path,
    /// Lowercase path components, file name last.
    pub segments: Vec<String>,
    /// Lowercase extension including the dot, or empty.
    pub extension: String,
}

impl<'a> Candidate<'a> {
    /// Segments are taken from every normal component of `path`.
    pub fn new(path: &'a Path) -> Self {
        Self::with_segments(path, path)
    }

    /// Segments are taken from `path` relative to `root`, so directory names
    /// above the SDK root never influence classification.
    pub fn within(path: &'a Path, root: &Path) -> Self {
        Self::with_segments(path, path.strip_prefix(root).unwrap_or(path))
    }

    fn with_segments(path: &'a Path, segment_source: &Path) -> Self {
        let segments = segment_source
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().to_lowercase()),
                _ => None,
            })
            .collect();
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        Self {
            path,
            segments,
            extension,
        }
    }

    /// Lowercase file name.
    pub fn file_name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// Lowercase directory components, excluding the file name.
    pub fn dirs(&self) -> &[String] {
        match self.segments.split_last() {
            Some((_, dirs)) => dirs,
            None => &[],
        }
    }

    fn has_segment(&self, names: &[&str]) -> bool {
        self.segments.iter().any(|s| names.contains(&s.as_str()))
    }
}

type Rule<L> = (fn(&Candidate<'_>) -> bool, L);

/// Folder hints come before content and extension: some `.obj` files are
/// really `.elf.obj`, while the SDK's directory layout is reliable.
const TOOLCHAIN_RULES: &[Rule<Toolchain>] = &[
    (in_gnu_dir, Toolchain::Gcc),
    (in_codewarrior_dir, Toolchain::Shc),
    (has_gcc_extension_or_magic, Toolchain::Gcc),
    (has_shc_extension, Toolchain::Shc),
];

fn in_gnu_dir(c: &Candidate<'_>) -> bool {
    c.has_segment(&["gnu", "sh-elf"])
}

fn in_codewarrior_dir(c: &Candidate<'_>) -> bool {
    c.has_segment(&["codewarrior", "mwerks", "mw"])
}

fn has_gcc_extension_or_magic(c: &Candidate<'_>) -> bool {
    matches!(c.extension.as_str(), ".a" | ".o" | ".elf") || is_ar_archive(c.path)
}

fn has_shc_extension(c: &Candidate<'_>) -> bool {
    matches!(c.extension.as_str(), ".lib" | ".obj")
}

/// Most specific first: `m4-single-only` must win over `m4-single` and `m4`.
const VARIANT_TOKENS: &[(&str, Variant)] = &[
    ("m4-single-only", Variant::M4SingleOnly),
    ("m4-single", Variant::M4Single),
    ("mnomacsave", Variant::NoMacSave),
    ("m4", Variant::M4),
    ("ml", Variant::Ml),
];

/// Detect which toolchain produced a file.
///
/// Returns `None` when no rule matches; the caller should skip the file.
#[must_use = "unrecognized files must be skipped"]
pub fn detect_toolchain(candidate: &Candidate<'_>) -> Option<Toolchain> {
    TOOLCHAIN_RULES
        .iter()
        .find(|(matches, _)| matches(candidate))
        .map(|&(_, toolchain)| toolchain)
}

/// Detect the build variant from directory names.
pub fn detect_variant(candidate: &Candidate<'_>) -> Variant {
    VARIANT_TOKENS
        .iter()
        .find(|&&(token, _)| candidate.has_segment(&[token]))
        .map(|&(_, variant)| variant)
        .unwrap_or_default()
}

/// Whether `path` is a Unix `ar` archive.
///
/// `.a` and `.elf.lib` are archives by name. A plain `.lib` is only an
/// archive when it starts with `!<arch>`; SHC libraries share the suffix.
pub fn is_ar_archive(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if name.ends_with(".a") || name.ends_with(".elf.lib") {
        return true;
    }
    if name.ends_with(".lib") {
        return starts_with_magic(path, AR_MAGIC);
    }
    false
}

/// Whether `path` starts with the ELF magic. Unreadable files are not ELF.
pub fn is_elf(path: &Path) -> bool {
    starts_with_magic(path, ELF_MAGIC)
}

fn starts_with_magic(path: &Path, magic: &[u8]) -> bool {
    let mut buf = vec![0u8; magic.len()];
    File::open(path)
        .and_then(|mut f| f.read_exact(&mut buf))
        .map(|()| buf == magic)
        .unwrap_or(false)
}
