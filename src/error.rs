//! Error types for configuration and build orchestration.
//!
//! Configuration problems are fatal and surface before any compiler is
//! launched. Per-task problems never show up here: they are captured in a
//! [`TaskOutcome`](crate::build::TaskOutcome) instead, so one broken kernel
//! cannot abort its siblings.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Invalid or unreadable configuration. Always raised before any task runs.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Input directory {} does not exist", .0.display())]
    SourceDirNotFound(PathBuf),

    #[error("Compiler options must contain one of -ptx, -cubin, or -fatbin")]
    MissingOutputMode,

    #[error("Compiler options must contain only one of -ptx, -cubin, or -fatbin (found: {})", .0.join(", "))]
    ConflictingOutputModes(Vec<String>),

    #[error("Extension filter is empty; expected a list like \"cu|ptx\"")]
    EmptyExtensionFilter,

    #[error("Job count must be at least 1")]
    InvalidJobs,

    #[error("Config file {} does not exist", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Failed to read {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {} - check for syntax errors", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Fatal, build-level failures.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{}: {}", .context, .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start worker pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Build timed out after {}: {} task(s) still running", timeout_text(.timeout), .outstanding)]
    BuildTimeout {
        timeout: Duration,
        outstanding: usize,
    },

    #[error("Compilation of CUDA code failed")]
    CompilationFailed,
}

fn timeout_text(timeout: &Duration) -> String {
    crate::build::format_duration(*timeout)
}

impl BuildError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Io {
            context,
            path: path.into(),
            source,
        }
    }
}
