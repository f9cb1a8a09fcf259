//! Source-to-target mapping and the staleness pass.

use super::discovery::ExtensionFilter;
use super::mode::OutputMode;
use crate::error::BuildError;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

/// A discovered source file and the artifact it compiles to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    pub source: PathBuf,
    /// Source root to the file's parent directory.
    pub relative_dir: PathBuf,
    pub target: PathBuf,
}

impl SourceUnit {
    /// Derives the target path. Returns `None` if `source` is outside
    /// `source_root` or doesn't match the filter.
    pub fn new(
        source: &Path,
        source_root: &Path,
        output_root: &Path,
        filter: &ExtensionFilter,
        mode: OutputMode,
    ) -> Option<Self> {
        let parent = source.parent()?;
        let relative_dir = parent.strip_prefix(source_root).ok()?.to_path_buf();
        let file_name = source.file_name()?.to_string_lossy();
        let ext = filter.matched(&file_name)?;
        let stem = &file_name[..file_name.len() - ext.len() - 1];
        let target = output_root
            .join(&relative_dir)
            .join(format!("{}.{}", stem, mode.extension()));

        Some(Self {
            source: source.to_path_buf(),
            relative_dir,
            target,
        })
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.target.parent()
    }

    /// Stale iff the target is missing or strictly older than the source.
    pub fn is_stale(&self) -> Result<bool, BuildError> {
        let target_meta = match fs::metadata(&self.target) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(BuildError::io("Failed to stat target", &self.target, e)),
        };
        let target_mtime = target_meta
            .modified()
            .map_err(|e| BuildError::io("Failed to read target mtime", &self.target, e))?;
        let source_mtime = fs::metadata(&self.source)
            .and_then(|m| m.modified())
            .map_err(|e| BuildError::io("Failed to read source mtime", &self.source, e))?;

        Ok(target_mtime < source_mtime)
    }
}

/// Result of the staleness pass over every discovered source.
#[derive(Debug, Default)]
pub struct Plan {
    pub stale: Vec<SourceUnit>,
    pub up_to_date: usize,
}

/// Maps every source to a unit, creating its output directory, and keeps the
/// stale ones.
///
/// Directories are created for every unit, stale or not. Runs in parallel,
/// so several workers may race to create the same directory; that is fine
/// because `create_dir_all` treats an existing directory as success.
pub fn plan_units(
    sources: &[PathBuf],
    source_root: &Path,
    output_root: &Path,
    filter: &ExtensionFilter,
    mode: OutputMode,
    create_dirs: bool,
) -> Result<Plan, BuildError> {
    let checked: Vec<(SourceUnit, bool)> = sources
        .par_iter()
        .filter_map(|src| SourceUnit::new(src, source_root, output_root, filter, mode))
        .map(|unit| -> Result<(SourceUnit, bool), BuildError> {
            if create_dirs && let Some(dir) = unit.output_dir() {
                fs::create_dir_all(dir)
                    .map_err(|e| BuildError::io("Failed to create output directory", dir, e))?;
            }
            let stale = unit.is_stale()?;
            Ok((unit, stale))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut plan = Plan::default();
    for (unit, stale) in checked {
        if stale {
            plan.stale.push(unit);
        } else {
            plan.up_to_date += 1;
        }
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn filter() -> ExtensionFilter {
        ExtensionFilter::parse("cu|ptx").unwrap()
    }

    fn write(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "// kernel").unwrap();
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    #[test]
    fn test_target_path_mirrors_tree() {
        let unit = SourceUnit::new(
            Path::new("/proj/src/ops/reduce.cu"),
            Path::new("/proj/src"),
            Path::new("/proj/out"),
            &filter(),
            OutputMode::Cubin,
        )
        .unwrap();
        assert_eq!(unit.relative_dir, PathBuf::from("ops"));
        assert_eq!(unit.target, PathBuf::from("/proj/out/ops/reduce.cubin"));
    }

    #[test]
    fn test_target_path_keeps_inner_dots() {
        let unit = SourceUnit::new(
            Path::new("/proj/src/a.b.ptx"),
            Path::new("/proj/src"),
            Path::new("/proj/out"),
            &filter(),
            OutputMode::Fatbin,
        )
        .unwrap();
        assert_eq!(unit.relative_dir, PathBuf::new());
        assert_eq!(unit.target, PathBuf::from("/proj/out/a.b.fatbin"));
    }

    #[test]
    fn test_bare_extension_file_gets_bare_target() {
        let unit = SourceUnit::new(
            Path::new("/proj/src/.cu"),
            Path::new("/proj/src"),
            Path::new("/proj/out"),
            &filter(),
            OutputMode::Ptx,
        )
        .unwrap();
        assert_eq!(unit.target, PathBuf::from("/proj/out/.ptx"));
    }

    #[test]
    fn test_unit_outside_root_is_skipped() {
        assert!(
            SourceUnit::new(
                Path::new("/elsewhere/x.cu"),
                Path::new("/proj/src"),
                Path::new("/proj/out"),
                &filter(),
                OutputMode::Ptx,
            )
            .is_none()
        );
    }

    #[test]
    fn test_staleness_rules() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src/k.cu");
        write(&src);
        let unit = SourceUnit::new(
            &src,
            &dir.path().join("src"),
            &dir.path().join("out"),
            &filter(),
            OutputMode::Ptx,
        )
        .unwrap();

        // Missing target
        assert!(unit.is_stale().unwrap());

        let now = SystemTime::now();
        write(&unit.target);

        // Target newer
        set_mtime(&src, now - Duration::from_secs(60));
        set_mtime(&unit.target, now);
        assert!(!unit.is_stale().unwrap());

        // Equal timestamps are up to date
        set_mtime(&src, now);
        assert!(!unit.is_stale().unwrap());

        // Source strictly newer
        set_mtime(&src, now + Duration::from_secs(5));
        assert!(unit.is_stale().unwrap());
    }

    #[test]
    fn test_plan_splits_stale_and_fresh() {
        let dir = TempDir::new().unwrap();
        let src_root = dir.path().join("src");
        let out_root = dir.path().join("out");
        let fresh = src_root.join("fresh/a.cu");
        let stale = src_root.join("stale/b.cu");
        write(&fresh);
        write(&stale);

        let now = SystemTime::now();
        let fresh_target = out_root.join("fresh/a.ptx");
        write(&fresh_target);
        set_mtime(&fresh, now - Duration::from_secs(60));
        set_mtime(&fresh_target, now);

        let plan = plan_units(
            &[fresh, stale.clone()],
            &src_root,
            &out_root,
            &filter(),
            OutputMode::Ptx,
            true,
        )
        .unwrap();

        assert_eq!(plan.up_to_date, 1);
        assert_eq!(plan.stale.len(), 1);
        assert_eq!(plan.stale[0].source, stale);
        assert!(out_root.join("stale").is_dir());
    }

    #[test]
    fn test_plan_without_dir_creation() {
        let dir = TempDir::new().unwrap();
        let src_root = dir.path().join("src");
        let src = src_root.join("x/k.cu");
        write(&src);
        let out_root = dir.path().join("out");

        let plan = plan_units(&[src], &src_root, &out_root, &filter(), OutputMode::Ptx, false)
            .unwrap();
        assert_eq!(plan.stale.len(), 1);
        assert!(!out_root.exists());
    }

    #[test]
    fn test_concurrent_creation_of_shared_dir() {
        let dir = TempDir::new().unwrap();
        let src_root = dir.path().join("src");
        let out_root = dir.path().join("out");
        let sources: Vec<PathBuf> = (0..64)
            .map(|i| src_root.join("shared/deeper").join(format!("k{i}.cu")))
            .collect();
        for s in &sources {
            write(s);
        }

        let plan = plan_units(&sources, &src_root, &out_root, &filter(), OutputMode::Ptx, true)
            .unwrap();

        assert_eq!(plan.stale.len(), 64);
        let shared = out_root.join("shared/deeper");
        assert!(shared.is_dir());
        let dirs: Vec<_> = fs::read_dir(out_root.join("shared"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(dirs, vec![shared]);
    }
}
