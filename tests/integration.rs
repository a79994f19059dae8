//! End-to-end builds against fake SDK helpers and a fake `analyzeHeadless`.
//!
//! Every external tool is a small `/bin/sh` script that records its
//! arguments, so these tests only run on Unix.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;
use sdk_fidb::config::ToolConfig;
use sdk_fidb::{build_fidb, BuildRequest, Config, Error, Stage};
use tempfile::TempDir;

struct Fixture {
    temp: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            temp: TempDir::new().unwrap(),
        }
    }

    fn root(&self) -> &Path {
        self.temp.path()
    }

    fn sdk(&self) -> PathBuf {
        self.root().join("r11")
    }

    fn work(&self) -> PathBuf {
        self.root().join("work")
    }

    fn log(&self, name: &str) -> PathBuf {
        self.root().join(format!("{name}.log"))
    }

    fn file(&self, rel: &str, content: &[u8]) {
        let path = self.sdk().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// Write an executable script that appends its arguments to `<name>.log`.
    fn script(&self, path: &Path, name: &str, body: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let text = format!(
            "#!/bin/sh\necho \"$@\" >> '{}'\n{body}\n",
            self.log(name).display()
        );
        fs::write(path, text).unwrap();
        let mut perms = fs::metadata(path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).unwrap();
    }

    /// Fake `ar` at the SDK's default location.
    fn ar(&self, body: &str) {
        self.script(&self.sdk().join("Utl/Dev/Gnu/Bin/ar.exe"), "ar", body);
    }

    fn analyzer(&self, body: &str) {
        self.script(
            &self.root().join("ghidra/support/analyzeHeadless"),
            "analyzer",
            body,
        );
    }

    fn config(&self) -> Config {
        Config {
            ghidra_home: Some(self.root().join("ghidra")),
            ..Config::default()
        }
    }

    fn request(&self) -> BuildRequest {
        BuildRequest {
            work_dir: Some(self.work()),
            ..BuildRequest::new("dc_sdk_r11", self.sdk())
        }
    }

    fn log_lines(&self, name: &str) -> Vec<String> {
        fs::read_to_string(self.log(name))
            .unwrap_or_default()
            .lines()
            .map(String::from)
            .collect()
    }
}

fn tree(root: &Path) -> Vec<String> {
    let mut out = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            out.push(path.strip_prefix(root).unwrap().display().to_string());
            if path.is_dir() {
                pending.push(path);
            }
        }
    }
    out.sort();
    out
}

#[test]
fn test_end_to_end_archive_and_ignored_file() {
    let fx = Fixture::new();
    fx.file("Utl/Dev/Gnu/Bin/lib.a", b"!<arch>\n");
    fx.file("demo/ignored.o", b"\x7fELF");
    fx.ar("printf member > member.o");
    fx.analyzer("exit 0");

    let report = build_fidb(&fx.request(), &fx.config()).unwrap();

    assert_eq!(report.summary.files, 1);
    assert_eq!(report.summary.ignored, 1);
    assert_eq!(report.fidb.as_deref(), Some("dc_sdk_r11.fidb"));
    assert_eq!(
        fs::read(fx.work().join("gcc/lib.a/default/r11/member.o")).unwrap(),
        b"member"
    );
    assert!(tree(&fx.work()).iter().all(|p| !p.contains("ignored")));
    assert_eq!(fx.log_lines("ar"), vec!["xo lib.a"]);

    let calls = fx.log_lines("analyzer");
    assert_eq!(calls.len(), 2);
    assert!(calls[0].starts_with("ghidraproj dc_sdk_r11 -import gcc -recursive"));
    assert!(calls[1].contains("-noanalysis -propertiesPath ."));

    let props = fs::read_to_string(fx.work().join("CreateMultipleLibraries.properties")).unwrap();
    assert!(props.contains("= dc_sdk_r11.fidb\n"));
    assert!(props.contains("(at a depth of 3): = /gcc\n"));
    assert!(fx.work().join("duplicates.txt").is_file());
    assert!(fx.work().join("common_symbols.txt").is_file());
}

#[test]
fn test_second_build_aborts_without_changes() {
    let fx = Fixture::new();
    fx.file("lib/m4/crt0.o", b"\x7fELF");
    fx.analyzer("exit 0");

    build_fidb(&fx.request(), &fx.config()).unwrap();
    let before = tree(&fx.work());

    let err = build_fidb(&fx.request(), &fx.config()).unwrap_err();
    assert!(matches!(err, Error::WorkDirExists(_)), "{err}");
    assert_eq!(tree(&fx.work()), before);
    assert_eq!(fx.log_lines("analyzer").len(), 2);
}

#[test]
fn test_import_failure_is_fatal() {
    let fx = Fixture::new();
    fx.file("lib/crt0.o", b"\x7fELF");
    fx.analyzer("exit 3");

    let err = build_fidb(&fx.request(), &fx.config()).unwrap_err();
    assert!(matches!(
        err,
        Error::AnalyzerFailed {
            stage: Stage::Import,
            ..
        }
    ));
    assert_eq!(fx.log_lines("analyzer").len(), 1);
    assert!(!fx.work().join("CreateMultipleLibraries.properties").exists());
}

#[test]
fn test_generate_failure_is_fatal() {
    let fx = Fixture::new();
    fx.file("lib/crt0.o", b"\x7fELF");
    // Succeeds on the first call only.
    fx.analyzer(&format!(
        "[ \"$(wc -l < '{}')\" -lt 2 ]",
        fx.log("analyzer").display()
    ));

    let err = build_fidb(&fx.request(), &fx.config()).unwrap_err();
    assert!(matches!(
        err,
        Error::AnalyzerFailed {
            stage: Stage::Generate,
            ..
        }
    ));
    assert_eq!(fx.log_lines("analyzer").len(), 2);
    assert!(fx.work().join("CreateMultipleLibraries.properties").is_file());
    assert!(fx.work().join("duplicates.txt").is_file());
    assert!(fx.work().join("common_symbols.txt").is_file());
}

#[test]
fn test_relative_ghidra_home() {
    let fx = Fixture::new();
    fx.file("lib/crt0.o", b"\x7fELF");
    let ghidra = tempfile::Builder::new().tempdir_in(".").unwrap();
    fx.script(
        &ghidra.path().join("support/analyzeHeadless"),
        "analyzer",
        "exit 0",
    );

    let config = Config {
        ghidra_home: Some(PathBuf::from(ghidra.path().file_name().unwrap())),
        ..Config::default()
    };
    let report = build_fidb(&fx.request(), &config).unwrap();
    assert_eq!(report.fidb.as_deref(), Some("dc_sdk_r11.fidb"));
    assert_eq!(fx.log_lines("analyzer").len(), 2);
}

#[test]
fn test_nothing_to_copy_skips_analyzer() {
    let fx = Fixture::new();
    fx.file("sample/crt0.o", b"\x7fELF");
    fx.file("lib/COPYING.LIB", b"license");
    fx.analyzer("exit 0");

    let err = build_fidb(&fx.request(), &fx.config()).unwrap_err();
    assert!(matches!(err, Error::NoFilesCopied(_)));
    assert!(fx.log_lines("analyzer").is_empty());
}

#[test]
fn test_ignored_archives_never_reach_ar() {
    let fx = Fixture::new();
    fx.file("demo/libdemo.a", b"!<arch>\n");
    fx.file("VmuTool/libvmu.a", b"!<arch>\n");
    fx.file("lib/libc.a", b"!<arch>\n");
    fx.ar("printf x > libc_member.o");
    fx.analyzer("exit 0");

    let report = build_fidb(&fx.request(), &fx.config()).unwrap();
    assert_eq!(report.summary.files, 1);
    assert_eq!(report.summary.ignored, 2);
    assert_eq!(fx.log_lines("ar"), vec!["xo libc.a"]);
}

#[test]
fn test_ar_members_fixed_up() {
    let fx = Fixture::new();
    fx.file("lib/m4-single/libm.a", b"!<arch>\n");
    fx.ar("printf 'plain' > data.o\nprintf '\\177ELF' > startup\nchmod 444 data.o");
    fx.analyzer("exit 0");

    build_fidb(&fx.request(), &fx.config()).unwrap();

    let dst = fx.work().join("gcc/libm.a/m4-single/r11");
    assert!(dst.join("startup.elf").is_file());
    assert!(!dst.join("startup").exists());
    assert!(!dst.join("libm.a").exists());
    let perms = fs::metadata(dst.join("data.o")).unwrap().permissions();
    assert!(!perms.readonly());
}

#[test]
fn test_failing_ar_keeps_partial_output() {
    let fx = Fixture::new();
    fx.file("lib/libbad.a", b"!<arch>\n");
    fx.ar("printf x > first.o\nexit 1");
    fx.analyzer("exit 0");

    let report = build_fidb(&fx.request(), &fx.config()).unwrap();
    assert_eq!(report.summary.files, 1);
    assert_eq!(report.summary.failed, 1);
    assert!(fx.work().join("gcc/libbad.a/default/r11/first.o").is_file());
}

#[test]
fn test_shc_library_split_and_converted() {
    let fx = Fixture::new();
    fx.file("lib/shc/sh4nbmzz.lib", b"SHCLIB\0\0");
    fx.script(
        &fx.sdk().join("Utl/Dev/Hitachi/libsplit.exe"),
        "libsplit",
        "printf a > a.obj\nprintf b > b.obj",
    );
    fx.script(
        &fx.sdk().join("Utl/Dev/Hitachi/elfcnv.exe"),
        "elfcnv",
        "cp \"$1\" \"$2\"",
    );
    fx.analyzer("exit 0");

    let report = build_fidb(&fx.request(), &fx.config()).unwrap();

    assert_eq!(report.summary.files, 2);
    let dst = fx.work().join("shc/sh4nbmzz.lib/default/r11");
    assert_eq!(fs::read(dst.join("a.elf")).unwrap(), b"a");
    assert_eq!(fs::read(dst.join("b.elf")).unwrap(), b"b");
    assert!(!dst.join("a.obj").exists());
    assert_eq!(fx.log_lines("libsplit"), vec!["sh4nbmzz.lib"]);
    assert_eq!(fx.log_lines("elfcnv"), vec!["a.obj a.elf", "b.obj b.elf"]);

    let props = fs::read_to_string(fx.work().join("CreateMultipleLibraries.properties")).unwrap();
    assert!(props.contains("= /shc\n"));
}

#[test]
fn test_absolute_tool_path_from_config() {
    let fx = Fixture::new();
    fx.file("lib/libc.a", b"!<arch>\n");
    let ar = fx.root().join("bin/sh-elf-ar");
    fx.script(&ar, "ar", "printf x > c.o");
    fx.analyzer("exit 0");

    let mut config = fx.config();
    config.tools.ar = ToolConfig {
        path: ar,
        relative: false,
    };
    let report = build_fidb(&fx.request(), &config).unwrap();
    assert_eq!(report.summary.files, 1);
    assert_eq!(fx.log_lines("ar"), vec!["xo libc.a"]);
}

#[test]
fn test_dry_run_touches_nothing() {
    let fx = Fixture::new();
    fx.file("Utl/Dev/Gnu/Bin/lib.a", b"!<arch>\n");
    fx.file("mwerks/startup.obj", b"SHC");
    fx.ar("printf x > m.o");
    fx.analyzer("exit 0");

    let request = BuildRequest {
        dry_run: true,
        ..fx.request()
    };
    let report = build_fidb(&request, &fx.config()).unwrap();

    assert_eq!(report.summary.files, 2);
    assert_eq!(report.fidb, None);
    assert!(report.commands[0].contains("-import gcc -import shc"));
    assert!(!fx.work().exists());
    assert!(fx.log_lines("ar").is_empty());
    assert!(fx.log_lines("analyzer").is_empty());
}
