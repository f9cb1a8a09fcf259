//! # cuxe CLI Entry Point
//!
//! This is the main executable for the `cux` command-line tool.
//! It parses CLI arguments using clap, loads `cux.toml`, applies flag
//! overrides and routes to the build engine.
//!
//! ## Commands
//!
//! - `build` - compile every stale kernel
//! - `clean` - remove compiled kernels
//! - `init` - write a default `cux.toml`
//! - `completion` - print shell completions

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use colored::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use cuxe::build::{self, BuildOptions};
use cuxe::config::{self, BuildSettings, CONFIG_FILE, Overrides};

#[derive(Parser)]
#[command(name = "cux")]
#[command(about = "Incremental, parallel CUDA kernel builds", version = env!("CARGO_PKG_VERSION"))]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the project configuration [default: cux.toml]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show debug output (spawned commands, planning decisions)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile every kernel whose output is missing or out of date
    Build {
        #[command(flatten)]
        overrides: OverrideArgs,
        /// Show what would be compiled without running the compiler
        #[arg(long)]
        dry_run: bool,
        /// Write a JSON build report to this file
        #[arg(long)]
        report: Option<PathBuf>,
        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,
    },
    /// Remove the compiled kernels for the current sources
    Clean {
        #[command(flatten)]
        overrides: OverrideArgs,
    },
    /// Create a cux.toml with the default settings
    Init,
    /// Generate shell completion scripts
    Completion { shell: Shell },
}

#[derive(Args, Debug, Default)]
struct OverrideArgs {
    /// Source directory to scan
    #[arg(long)]
    source_dir: Option<PathBuf>,
    /// Source extensions, pipe-delimited (e.g. "cu|ptx")
    #[arg(long)]
    extensions: Option<String>,
    /// Output directory
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Compiler options; must include exactly one of -ptx, -cubin, -fatbin
    #[arg(long, allow_hyphen_values = true)]
    options: Option<String>,
    /// Compiler executable
    #[arg(long)]
    compiler: Option<String>,
    /// Per-kernel timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
    /// Overall build deadline in seconds
    #[arg(long)]
    build_timeout: Option<u64>,
    /// Number of parallel compiler processes [default: CPU count]
    #[arg(short, long)]
    jobs: Option<usize>,
}

impl From<OverrideArgs> for Overrides {
    fn from(args: OverrideArgs) -> Self {
        Overrides {
            source_dir: args.source_dir,
            extensions: args.extensions,
            output_dir: args.output_dir,
            options: args.options,
            compiler: args.compiler,
            task_timeout_secs: args.timeout,
            build_timeout_secs: args.build_timeout,
            jobs: args.jobs,
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

// --- Helper: Load config, apply flags, validate ---
fn load_settings(config: Option<&Path>, overrides: OverrideArgs) -> Result<BuildSettings> {
    let config_path = config.unwrap_or(Path::new(CONFIG_FILE));
    let mut cfg = config::load_config(config_path, config.is_some())?;
    cfg.compile.apply(overrides.into());

    let project_dir = match config_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::env::current_dir().context("Failed to determine current directory")?,
    };
    Ok(cfg.compile.resolve(&project_dir)?)
}

fn init_project(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        bail!("{} already exists", config_path.display());
    }
    fs::write(config_path, config::DEFAULT_CONFIG_TOML)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    println!("{} Created {}", "✓".green(), config_path.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Build {
            overrides,
            dry_run,
            report,
            no_progress,
        } => {
            let settings = load_settings(cli.config.as_deref(), overrides)?;
            let options = BuildOptions {
                dry_run,
                progress: !no_progress && !cli.verbose,
                report_path: report,
            };
            build::build_project(&settings, &options)?;
            Ok(())
        }
        Commands::Clean { overrides } => {
            let settings = load_settings(cli.config.as_deref(), overrides)?;
            build::clean(&settings)?;
            Ok(())
        }
        Commands::Init => {
            init_project(cli.config.as_deref().unwrap_or(Path::new(CONFIG_FILE)))
        }
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
            Ok(())
        }
    }
}
