//! Kernel output cleanup.
//!
//! This module provides the `cux clean` command. Only targets derived from
//! the current sources for the configured output mode are removed.

use super::discovery::discover_sources;
use super::unit::SourceUnit;
use crate::config::BuildSettings;
use crate::error::BuildError;
use colored::*;
use std::fs;
use std::io::ErrorKind;
use tracing::debug;

/// Removes the artifacts derived from the current sources for the configured
/// output mode. Anything else in the output tree is left untouched.
pub fn clean(settings: &BuildSettings) -> Result<usize, BuildError> {
    let sources = discover_sources(&settings.source_root, &settings.extensions)?;
    let mut removed = 0;

    for source in &sources {
        let Some(unit) = SourceUnit::new(
            source,
            &settings.source_root,
            &settings.output_root,
            &settings.extensions,
            settings.mode,
        ) else {
            continue;
        };

        match fs::remove_file(&unit.target) {
            Ok(()) => {
                debug!("Removed {}", unit.target.display());
                removed += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(BuildError::io("Failed to remove target", &unit.target, e)),
        }
    }

    if removed == 0 {
        println!("{} Nothing to clean", "!".yellow());
    } else {
        println!("{} Removed {} compiled kernel(s)", "✓".green(), removed);
    }
    Ok(removed)
}
