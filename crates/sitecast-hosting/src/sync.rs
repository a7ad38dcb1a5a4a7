//! File-synchronisation primitives and step-outcome bookkeeping.
//!
//! Each step of the procedure yields a [`StepOutcome`]. Warnings are folded
//! into the [`SyncReport`]; a fatal outcome ends the procedure.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::warn;
use walkdir::WalkDir;

use crate::error::{HostingError, HostingResult};

/// The ordered steps of file synchronisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStep {
    Validate,
    StopSite,
    Backup,
    Clear,
    Copy,
    Permissions,
    StartSite,
}

impl SyncStep {
    pub const ALL: [SyncStep; 7] = [
        Self::Validate,
        Self::StopSite,
        Self::Backup,
        Self::Clear,
        Self::Copy,
        Self::Permissions,
        Self::StartSite,
    ];

    /// Percent complete once this step has finished.
    pub const fn percent(&self) -> u8 {
        match self {
            Self::Validate => 10,
            Self::StopSite => 20,
            Self::Backup => 30,
            Self::Clear => 50,
            Self::Copy => 80,
            Self::Permissions => 90,
            Self::StartSite => 100,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::StopSite => "stop_site",
            Self::Backup => "backup",
            Self::Clear => "clear",
            Self::Copy => "copy",
            Self::Permissions => "permissions",
            Self::StartSite => "start_site",
        }
    }
}

/// Outcome of a single step.
#[derive(Debug)]
pub enum StepOutcome {
    Ok,
    Skipped,
    Warning(String),
    Fatal(HostingError),
}

impl StepOutcome {
    /// Downgrade an error from a best-effort operation to a warning.
    pub fn best_effort<T>(result: HostingResult<T>, context: &str) -> Self {
        match result {
            Ok(_) => Self::Ok,
            Err(e) => Self::Warning(format!("{context}: {e}")),
        }
    }

    /// Treat an error as fatal.
    pub fn required<T>(result: HostingResult<T>) -> Self {
        match result {
            Ok(_) => Self::Ok,
            Err(e) => Self::Fatal(e),
        }
    }
}

/// Recorded status of a completed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Skipped,
    Warning,
}

/// Summary of a file-synchronisation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub steps: Vec<(SyncStep, StepStatus)>,
    pub backup_path: Option<PathBuf>,
    pub files_copied: usize,
    pub entries_excluded: usize,
    pub warnings: Vec<String>,
}

impl SyncReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a step outcome into the report. Fatal outcomes are returned
    /// as errors.
    pub fn record(&mut self, step: SyncStep, outcome: StepOutcome) -> HostingResult<StepStatus> {
        let status = match outcome {
            StepOutcome::Ok => StepStatus::Ok,
            StepOutcome::Skipped => StepStatus::Skipped,
            StepOutcome::Warning(message) => {
                warn!(step = step.as_str(), "{message}");
                self.warnings.push(message);
                StepStatus::Warning
            }
            StepOutcome::Fatal(e) => return Err(e),
        };
        self.steps.push((step, status));
        Ok(status)
    }

    pub fn status_of(&self, step: SyncStep) -> Option<StepStatus> {
        self.steps
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, status)| *status)
    }
}

/// Whether `name` contains any pattern, ignoring case.
pub fn is_excluded(name: &OsStr, patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return false;
    }
    let name = name.to_string_lossy().to_lowercase();
    patterns
        .iter()
        .filter(|p| !p.is_empty())
        .any(|p| name.contains(&p.to_lowercase()))
}

/// Counts from a tree copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files: usize,
    pub directories: usize,
    pub excluded: usize,
}

/// Recursively copy `source` into `destination`, pruning any entry whose
/// name matches an exclusion pattern.
pub fn copy_tree(
    source: &Path,
    destination: &Path,
    exclude_patterns: &[String],
) -> HostingResult<CopyStats> {
    let mut stats = CopyStats::default();
    std::fs::create_dir_all(destination)?;

    let walker = WalkDir::new(source).min_depth(1).into_iter();
    let walker = walker.filter_entry(|entry| {
        let excluded = is_excluded(entry.file_name(), exclude_patterns);
        if excluded {
            stats.excluded += 1;
        }
        !excluded
    });

    for entry in walker {
        let entry = entry.map_err(|e| HostingError::Io(e.into()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| HostingError::engine(format!("path outside source tree: {e}")))?;
        let target = destination.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
            stats.directories += 1;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
            stats.files += 1;
        }
    }

    Ok(stats)
}

/// Remove every immediate child of `dir`. Entries that cannot be removed
/// (typically locked files) are reported back, not treated as errors.
pub fn clear_directory(dir: &Path) -> HostingResult<Vec<String>> {
    let mut failures = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let result = if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        if let Err(e) = result {
            failures.push(format!("could not remove {}: {e}", path.display()));
        }
    }

    Ok(failures)
}

/// Copy `destination` wholesale to a timestamped directory under
/// `backup_root`.
pub fn backup_directory(
    destination: &Path,
    backup_root: &Path,
    site_name: &str,
) -> HostingResult<PathBuf> {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S_%3f");
    let backup_path = backup_root.join(format!("{site_name}_{stamp}"));
    copy_tree(destination, &backup_path, &[])?;
    Ok(backup_path)
}

/// Whether `a` and `b` name the same directory or one contains the other.
///
/// Both paths are resolved through their nearest existing ancestor, so
/// symlinks and relative segments do not hide an overlap.
pub fn paths_overlap(a: &Path, b: &Path) -> bool {
    let a = resolve(a);
    let b = resolve(b);
    a.starts_with(&b) || b.starts_with(&a)
}

fn resolve(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut existing = absolute.as_path();
    let mut tail = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return tail
                .iter()
                .rev()
                .fold(canonical, |acc: PathBuf, name| acc.join(name));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src/sub")).unwrap();
        std::fs::create_dir_all(root.join("site")).unwrap();

        assert!(paths_overlap(&root.join("src"), &root.join("src")));
        assert!(paths_overlap(&root.join("src"), &root.join("src/sub")));
        assert!(paths_overlap(&root.join("site/not-yet"), &root.join("site")));
        assert!(paths_overlap(&root.join("src/sub/.."), &root.join("src")));
        assert!(!paths_overlap(&root.join("src"), &root.join("site")));
        assert!(!paths_overlap(&root.join("src"), &root.join("src2")));
    }

    #[cfg(unix)]
    #[test]
    fn overlap_seen_through_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::os::unix::fs::symlink(root.join("src"), root.join("link")).unwrap();

        assert!(paths_overlap(&root.join("link"), &root.join("src")));
    }

    fn patterns(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn exclusion_is_case_insensitive_substring() {
        let p = patterns(&[".git", "Web.Debug"]);
        assert!(is_excluded(OsStr::new(".GIT"), &p));
        assert!(is_excluded(OsStr::new("web.debug.config"), &p));
        assert!(!is_excluded(OsStr::new("web.config"), &p));
        assert!(!is_excluded(OsStr::new("anything"), &[]));
    }

    #[test]
    fn copy_tree_prunes_excluded_entries() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("bin")).unwrap();
        std::fs::create_dir_all(src.path().join(".git/objects")).unwrap();
        std::fs::write(src.path().join("index.html"), "hi").unwrap();
        std::fs::write(src.path().join("bin/app.dll"), "dll").unwrap();
        std::fs::write(src.path().join(".git/objects/a"), "obj").unwrap();
        std::fs::write(src.path().join("secrets.LOCAL.json"), "{}").unwrap();

        let stats = copy_tree(
            src.path(),
            dst.path(),
            &patterns(&[".git", "local.json"]),
        )
        .unwrap();

        assert!(dst.path().join("index.html").exists());
        assert!(dst.path().join("bin/app.dll").exists());
        assert!(!dst.path().join(".git").exists());
        assert!(!dst.path().join("secrets.LOCAL.json").exists());
        assert_eq!(stats.files, 2);
        assert_eq!(stats.excluded, 2);
    }

    #[test]
    fn clear_directory_removes_children_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/f"), "x").unwrap();
        std::fs::write(dir.path().join("g"), "y").unwrap();

        let failures = clear_directory(dir.path()).unwrap();

        assert!(failures.is_empty());
        assert!(dir.path().exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn backup_copies_everything() {
        let dest = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        std::fs::write(dest.path().join(".git"), "kept in backups").unwrap();

        let backup = backup_directory(dest.path(), root.path(), "shop_local").unwrap();

        assert!(backup.starts_with(root.path()));
        assert!(backup
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("shop_local_"));
        assert!(backup.join(".git").exists());
    }

    #[test]
    fn report_folds_outcomes() {
        let mut report = SyncReport::new();
        report.record(SyncStep::Validate, StepOutcome::Ok).unwrap();
        report
            .record(SyncStep::StopSite, StepOutcome::Warning("busy".into()))
            .unwrap();
        let err = report
            .record(
                SyncStep::Copy,
                StepOutcome::Fatal(HostingError::engine("disk full")),
            )
            .unwrap_err();

        assert!(matches!(err, HostingError::Engine(_)));
        assert_eq!(report.warnings, vec!["busy".to_string()]);
        assert_eq!(report.status_of(SyncStep::StopSite), Some(StepStatus::Warning));
        assert_eq!(report.status_of(SyncStep::Copy), None);
    }

    #[test]
    fn percents_increase() {
        let percents: Vec<u8> = SyncStep::ALL.iter().map(SyncStep::percent).collect();
        assert_eq!(percents, vec![10, 20, 30, 50, 80, 90, 100]);
    }
}
