//! Recursive source discovery under the configured source root.

use crate::error::ConfigError;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Case-sensitive filename suffix filter built from a `cu|ptx` style list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionFilter {
    extensions: Vec<String>,
}

impl ExtensionFilter {
    pub fn parse(list: &str) -> Result<Self, ConfigError> {
        let extensions: Vec<String> = list
            .split('|')
            .map(|e| e.trim().trim_start_matches('.'))
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect();

        if extensions.is_empty() {
            return Err(ConfigError::EmptyExtensionFilter);
        }
        Ok(Self { extensions })
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Returns the longest configured extension that `file_name` ends with
    /// (as `.ext`), if any.
    pub fn matched<'a>(&'a self, file_name: &str) -> Option<&'a str> {
        self.extensions
            .iter()
            .filter(|ext| {
                file_name.len() > ext.len()
                    && file_name.ends_with(ext.as_str())
                    && file_name.as_bytes()[file_name.len() - ext.len() - 1] == b'.'
            })
            .max_by_key(|ext| ext.len())
            .map(String::as_str)
    }
}

// --- Discovery: Walk the source tree ---
pub fn discover_sources(root: &Path, filter: &ExtensionFilter) -> Result<Vec<PathBuf>, ConfigError> {
    if !root.is_dir() {
        return Err(ConfigError::SourceDirNotFound(root.to_path_buf()));
    }

    let mut sources = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if filter.matched(&name).is_some() {
            sources.push(entry.into_path());
        }
    }

    sources.sort();
    Ok(sources)
}
