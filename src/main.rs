//! `sdk-fidb` command-line entry point.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use sdk_fidb::pipeline::default_fidb_name;
use sdk_fidb::{
    build_fidb, detect_toolchain, detect_variant, should_ignore, BuildRequest, Candidate, Config,
    HandlingMode,
};

/// Build Ghidra Function ID databases from vendor SDK trees.
#[derive(Parser)]
#[command(name = "sdk-fidb", version, about, long_about = None)]
struct Cli {
    /// Path to an optional TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reorganize an SDK and generate its .fidb.
    Build {
        /// SDK root directory (e.g. `r11`).
        sdk_root: PathBuf,

        /// Database name. Defaults to the SDK directory name.
        #[arg(short, long)]
        name: Option<String>,

        /// Work directory. Defaults to `fid_work_<name>`.
        #[arg(short, long)]
        work_dir: Option<PathBuf>,

        /// Ghidra installation directory. Overrides config and GHIDRA_HOME.
        #[arg(long)]
        ghidra_home: Option<PathBuf>,

        /// Classify files and print the analyzer commands without running anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print toolchain, variant, and handling mode for files.
    Classify {
        files: Vec<PathBuf>,

        /// Classify relative to this SDK root.
        #[arg(long)]
        sdk_root: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Build {
            sdk_root,
            name,
            work_dir,
            ghidra_home,
            dry_run,
        } => {
            let config = Config {
                ghidra_home: ghidra_home.or(config.ghidra_home),
                ..config
            };
            let name = name.unwrap_or_else(|| default_fidb_name(&sdk_root));
            let request = BuildRequest {
                work_dir,
                dry_run,
                ..BuildRequest::new(name, sdk_root)
            };
            cmd_build(&request, &config)?;
        }
        Commands::Classify { files, sdk_root } => {
            cmd_classify(&files, sdk_root.as_deref(), &config)
        }
    }

    Ok(())
}

fn cmd_build(request: &BuildRequest, config: &Config) -> Result<()> {
    let report = build_fidb(request, config)?;
    println!("[+] Copied {} files", report.summary.files);
    match &report.fidb {
        Some(fidb) => println!("[+] FIDB generated: {fidb}"),
        None => {
            println!();
            println!("AnalyzeHeadless commands:");
            for cmd in &report.commands {
                println!("{cmd}");
            }
            println!();
            println!("Dry run: no folders were created, no files were copied,");
            println!("and analyzeHeadless was NOT invoked.");
        }
    }
    Ok(())
}

fn cmd_classify(files: &[PathBuf], sdk_root: Option<&Path>, config: &Config) {
    for path in files {
        let candidate = match sdk_root {
            Some(root) => Candidate::within(path, root),
            None => Candidate::new(path),
        };
        if should_ignore(&candidate, &config.filters) {
            println!("ignored\t-\t-\t{}", path.display());
            continue;
        }
        let toolchain = detect_toolchain(&candidate)
            .map(|t| t.as_str())
            .unwrap_or("unrecognized");
        println!(
            "{toolchain}\t{}\t{}\t{}",
            detect_variant(&candidate),
            HandlingMode::for_file(&candidate),
            path.display()
        );
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::load(path)?),
        None => {
            debug!("No config file given, using defaults");
            Ok(Config::default())
        }
    }
}
