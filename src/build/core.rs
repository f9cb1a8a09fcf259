//! Build orchestration.
//!
//! This module provides `build_project`, the body of `cux build`: discover
//! sources, drop the up-to-date ones, compile the rest in parallel and print
//! one summary.
//!
//! ## Flow
//!
//! - `discovery` finds candidate sources
//! - `unit` derives targets and filters stale ones
//! - `scheduler` runs one compiler per stale unit
//! - the report decides the overall verdict

use super::discovery::discover_sources;
use super::process::{CompileTask, ProcessRunner};
use super::report::BuildReport;
use super::scheduler::Scheduler;
use super::unit::plan_units;
use crate::config::BuildSettings;
use crate::error::BuildError;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Default, Clone)]
pub struct BuildOptions {
    /// Print what would be compiled without spawning anything.
    pub dry_run: bool,
    /// Draw a progress bar while tasks run.
    pub progress: bool,
    /// Write the report as JSON here, even when the build fails.
    pub report_path: Option<PathBuf>,
}

#[derive(Debug)]
pub struct BuildSummary {
    pub discovered: usize,
    pub up_to_date: usize,
    pub report: BuildReport,
    pub elapsed: Duration,
}

impl BuildSummary {
    pub fn compiled(&self) -> usize {
        self.report.len() - self.report.failed_count()
    }
}

// --- CORE: Build Project ---
//
// Discovery -> staleness -> one compiler per stale unit -> one verdict.
// Returns `BuildError::CompilationFailed` after every task has been logged if
// any of them failed.
pub fn build_project(settings: &BuildSettings, options: &BuildOptions) -> Result<BuildSummary, BuildError> {
    let start_time = Instant::now();

    // 1. Discover sources
    let sources = discover_sources(&settings.source_root, &settings.extensions)?;
    debug!(
        "Found {} source file(s) under {}",
        sources.len(),
        settings.source_root.display()
    );

    // 2. Staleness (creates output directories unless dry-running)
    let plan = plan_units(
        &sources,
        &settings.source_root,
        &settings.output_root,
        &settings.extensions,
        settings.mode,
        !options.dry_run,
    )?;

    let tasks: Vec<CompileTask> = plan
        .stale
        .into_iter()
        .map(|unit| CompileTask::new(unit, &settings.compiler, &settings.options))
        .collect();

    if options.dry_run {
        println!("{} DRY RUN - nothing will be compiled", "!".yellow());
        for task in &tasks {
            println!("   Would execute: {}", task.command.display());
        }
        return Ok(BuildSummary {
            discovered: sources.len(),
            up_to_date: plan.up_to_date,
            report: BuildReport::new(),
            elapsed: start_time.elapsed(),
        });
    }

    if tasks.is_empty() {
        info!("All {} kernel(s) up to date", plan.up_to_date);
    } else {
        info!(
            "Compiling {} of {} kernel(s) to .{} with {} worker(s)",
            tasks.len(),
            sources.len(),
            settings.mode,
            settings.jobs
        );
    }

    // 3. Fan out
    let mut scheduler = Scheduler::new(settings.jobs, settings.build_timeout);
    let bar = if options.progress && !tasks.is_empty() {
        let bar = progress_bar(tasks.len() as u64);
        scheduler = scheduler.with_progress(bar.clone());
        Some(bar)
    } else {
        None
    };

    let runner = Arc::new(ProcessRunner::new(settings.task_timeout));
    let result = scheduler.run(tasks, runner);
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    let report = result?;

    // 4. Report
    if let Some(path) = &options.report_path {
        write_report(&report, path)?;
    }

    let summary = BuildSummary {
        discovered: sources.len(),
        up_to_date: plan.up_to_date,
        report,
        elapsed: start_time.elapsed(),
    };

    print_summary(&summary);

    if summary.report.any_failed() {
        return Err(BuildError::CompilationFailed);
    }
    Ok(summary)
}

fn print_summary(summary: &BuildSummary) {
    let failed = summary.report.failed_count();
    if summary.report.is_empty() {
        println!(
            "{} Up to date ({} kernel(s))",
            "⚡".green(),
            summary.up_to_date
        );
    } else if failed == 0 {
        println!(
            "{} Compiled {} kernel(s), {} up to date, in {:.2?}",
            "✓".green(),
            summary.compiled(),
            summary.up_to_date,
            summary.elapsed
        );
    } else {
        println!(
            "{} {} of {} kernel(s) failed ({} compiled, {} up to date) in {:.2?}",
            "x".red(),
            failed,
            summary.report.len(),
            summary.compiled(),
            summary.up_to_date,
            summary.elapsed
        );
    }
}

fn progress_bar(len: u64) -> ProgressBar {
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    let bar = ProgressBar::new(len);
    bar.set_style(style);
    bar.set_message("Compiling...");
    bar
}

fn write_report(report: &BuildReport, path: &Path) -> Result<(), BuildError> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| BuildError::io("Failed to serialize build report", path, e.into()))?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|e| BuildError::io("Failed to create report directory", parent, e))?;
    }
    fs::write(path, json).map_err(|e| BuildError::io("Failed to write build report", path, e))
}
