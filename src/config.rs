use crate::build::{ExtensionFilter, OutputMode};
use crate::error::ConfigError;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "cux.toml";

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct CuxConfig {
    #[serde(default)]
    pub compile: CompileConfig,
}

/// The `[compile]` table. Every key is optional.
#[derive(Deserialize, Debug, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct CompileConfig {
    pub source_dir: PathBuf,
    /// Pipe-delimited, e.g. `cu|ptx`.
    pub extensions: String,
    pub output_dir: PathBuf,
    /// Space-delimited compiler options; must select exactly one output mode.
    pub options: String,
    pub compiler: String,
    pub task_timeout_secs: u64,
    pub build_timeout_secs: u64,
    /// Worker count. `None` means one per available CPU.
    pub jobs: Option<usize>,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("src/main/cuda"),
            extensions: "cu|ptx".to_string(),
            output_dir: PathBuf::from("build/kernels"),
            options: "-ptx".to_string(),
            compiler: "nvcc".to_string(),
            task_timeout_secs: 300,
            build_timeout_secs: 600,
            jobs: None,
        }
    }
}

/// Command line values that take precedence over `cux.toml`.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub source_dir: Option<PathBuf>,
    pub extensions: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub options: Option<String>,
    pub compiler: Option<String>,
    pub task_timeout_secs: Option<u64>,
    pub build_timeout_secs: Option<u64>,
    pub jobs: Option<usize>,
}

/// Fully validated settings for one build. Paths are absolute.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub source_root: PathBuf,
    pub output_root: PathBuf,
    pub extensions: ExtensionFilter,
    pub options: Vec<String>,
    pub mode: OutputMode,
    pub compiler: String,
    pub task_timeout: Duration,
    pub build_timeout: Duration,
    pub jobs: usize,
}

// --- Helper: Load Config ---
/// A missing file means defaults, unless the caller named it explicitly.
pub fn load_config(path: &Path, required: bool) -> Result<CuxConfig, ConfigError> {
    if !path.exists() {
        if required {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }
        return Ok(CuxConfig::default());
    }
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl CompileConfig {
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(v) = overrides.source_dir {
            self.source_dir = v;
        }
        if let Some(v) = overrides.extensions {
            self.extensions = v;
        }
        if let Some(v) = overrides.output_dir {
            self.output_dir = v;
        }
        if let Some(v) = overrides.options {
            self.options = v;
        }
        if let Some(v) = overrides.compiler {
            self.compiler = v;
        }
        if let Some(v) = overrides.task_timeout_secs {
            self.task_timeout_secs = v;
        }
        if let Some(v) = overrides.build_timeout_secs {
            self.build_timeout_secs = v;
        }
        if overrides.jobs.is_some() {
            self.jobs = overrides.jobs;
        }
    }

    /// Validates the configuration against `project_dir`.
    ///
    /// Fails if the source directory is missing, if the option string does
    /// not select exactly one output mode, or if the extension filter is
    /// empty. Nothing is created on disk.
    pub fn resolve(&self, project_dir: &Path) -> Result<BuildSettings, ConfigError> {
        let source_dir = project_dir.join(&self.source_dir);
        if !source_dir.is_dir() {
            return Err(ConfigError::SourceDirNotFound(source_dir));
        }
        let source_root = fs::canonicalize(&source_dir).map_err(|source| ConfigError::Read {
            path: source_dir.clone(),
            source,
        })?;

        let output_dir = project_dir.join(&self.output_dir);
        let output_root = std::path::absolute(&output_dir).map_err(|source| ConfigError::Read {
            path: output_dir.clone(),
            source,
        })?;

        let extensions = ExtensionFilter::parse(&self.extensions)?;
        let options = split_options(&self.options);
        let mode = OutputMode::resolve(&options)?;

        let jobs = match self.jobs {
            Some(0) => return Err(ConfigError::InvalidJobs),
            Some(n) => n,
            None => host_parallelism(),
        };

        Ok(BuildSettings {
            source_root,
            output_root,
            extensions,
            options,
            mode,
            compiler: self.compiler.clone(),
            task_timeout: Duration::from_secs(self.task_timeout_secs),
            build_timeout: Duration::from_secs(self.build_timeout_secs),
            jobs,
        })
    }
}

/// Contents written by `cux init`. Parses back to the defaults.
pub const DEFAULT_CONFIG_TOML: &str = r#"[compile]
# Where the .cu sources live, relative to this file
source_dir = "src/main/cuda"
# Pipe-delimited list of source extensions
extensions = "cu|ptx"
# Output tree; mirrors the source tree
output_dir = "build/kernels"
# Passed to the compiler verbatim; must contain exactly one of -ptx, -cubin, -fatbin
options = "-ptx"
compiler = "nvcc"
# Per-kernel watchdog and overall deadline, in seconds
task_timeout_secs = 300
build_timeout_secs = 600
# Worker count; defaults to one per CPU
# jobs = 8
"#;

/// One argv entry per whitespace-separated token. No shell interpretation.
pub fn split_options(options: &str) -> Vec<String> {
    options.split_whitespace().map(str::to_string).collect()
}

pub fn host_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
