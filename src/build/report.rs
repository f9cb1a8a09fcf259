//! Per-task outcomes and the aggregated build report.
//!
//! Outcomes are recorded by source path, so the report iterates in a stable
//! order and serializes to the same JSON for the same results.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Success,
    Failure,
}

/// Why a single task failed. Captured per task, never propagated.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskFailure {
    #[error("compiler could not be launched")]
    Launch,
    #[error("timed out after {}", limit_text(.limit))]
    Timeout {
        #[serde(rename = "limit_secs", serialize_with = "serialize_secs")]
        limit: Duration,
    },
    #[error("compiler exited with {}", exit_text(.code))]
    NonZeroExit { code: Option<i32> },
    #[error("stream capture could not be stopped")]
    ResourceRelease,
    #[error("failed while waiting for the compiler: {message}")]
    Execution { message: String },
}

fn limit_text(limit: &Duration) -> String {
    super::format_duration(*limit)
}

fn exit_text(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "a signal".to_string(),
    }
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskOutcome {
    pub status: TaskStatus,
    pub log: String,
    pub failure: Option<TaskFailure>,
}

impl TaskOutcome {
    pub fn success(log: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Success,
            log: log.into(),
            failure: None,
        }
    }

    pub fn failure(kind: TaskFailure, log: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Failure,
            log: log.into(),
            failure: Some(kind),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status == TaskStatus::Failure
    }

    /// Prepends `header` as the first log line. The result is trimmed.
    pub fn with_header(mut self, header: &str) -> Self {
        let body = self.log.trim();
        self.log = if body.is_empty() {
            header.trim().to_string()
        } else {
            format!("{}\n{}", header.trim(), body)
        };
        self
    }
}

/// Every task's outcome, keyed by source path.
#[derive(Debug, Default, Clone, Serialize)]
pub struct BuildReport {
    outcomes: BTreeMap<PathBuf, TaskOutcome>,
    any_failed: bool,
}

impl BuildReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, source: PathBuf, outcome: TaskOutcome) {
        self.any_failed |= outcome.is_failure();
        self.outcomes.insert(source, outcome);
    }

    pub fn any_failed(&self) -> bool {
        self.any_failed
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_failure()).count()
    }

    pub fn get(&self, source: &Path) -> Option<&TaskOutcome> {
        self.outcomes.get(source)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &TaskOutcome)> {
        self.outcomes.iter()
    }
}

impl FromIterator<(PathBuf, TaskOutcome)> for BuildReport {
    fn from_iter<I: IntoIterator<Item = (PathBuf, TaskOutcome)>>(iter: I) -> Self {
        let mut report = BuildReport::new();
        for (source, outcome) in iter {
            report.record(source, outcome);
        }
        report
    }
}
