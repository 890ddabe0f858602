// Local age-based pruning driven by filesystem modification times

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::Result;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Age in whole elapsed days; a timestamp in the future is zero days old
pub fn age_in_days(modified: SystemTime, now: SystemTime) -> u64 {
    now.duration_since(modified)
        .map(|age| age.as_secs() / SECONDS_PER_DAY)
        .unwrap_or(0)
}

/// True when more than `window_days` whole days have elapsed (`find -mtime +N`)
pub fn exceeds_window(modified: SystemTime, now: SystemTime, window_days: u32) -> bool {
    age_in_days(modified, now) > u64::from(window_days)
}

/// Result of one local pruning pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct LocalPruneReport {
    /// Directory that was scanned
    pub path: PathBuf,
    /// The directory did not exist; nothing was scanned
    pub missing: bool,
    /// Candidates looked at
    pub scanned: usize,
    /// Candidates deleted
    pub removed: usize,
    /// Expired candidates that could not be deleted
    pub failed: usize,
}

impl LocalPruneReport {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            ..Default::default()
        }
    }
}

/// Remove immediate subdirectories of `dir` older than `window_days`
pub fn prune_directories(dir: &Path, window_days: u32, now: SystemTime) -> Result<LocalPruneReport> {
    let mut report = LocalPruneReport::new(dir);
    if !dir.is_dir() {
        warn!(path = %dir.display(), "Backup directory not found");
        report.missing = true;
        return Ok(report);
    }

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let metadata = match entry.metadata() {
            Ok(metadata) if metadata.is_dir() => metadata,
            _ => continue,
        };
        report.scanned += 1;

        let Ok(modified) = metadata.modified() else {
            continue;
        };
        if !exceeds_window(modified, now, window_days) {
            continue;
        }

        let path = entry.path();
        match fs::remove_dir_all(&path) {
            Ok(()) => {
                info!(path = %path.display(), "Deleted local full backup");
                report.removed += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to delete local full backup");
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

/// Remove regular files anywhere below `dir` older than `window_days`
pub fn prune_files(dir: &Path, window_days: u32, now: SystemTime) -> Result<LocalPruneReport> {
    let mut report = LocalPruneReport::new(dir);
    if !dir.is_dir() {
        warn!(path = %dir.display(), "Binlog directory not found");
        report.missing = true;
        return Ok(report);
    }

    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        report.scanned += 1;

        let Some(modified) = entry.metadata().ok().and_then(|m| m.modified().ok()) else {
            continue;
        };
        if !exceeds_window(modified, now, window_days) {
            continue;
        }

        match fs::remove_file(entry.path()) {
            Ok(()) => {
                info!(path = %entry.path().display(), "Deleted local binlog");
                report.removed += 1;
            }
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Failed to delete local binlog");
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn days(n: u64) -> Duration {
        Duration::from_secs(n * SECONDS_PER_DAY)
    }

    fn touch(path: &Path, modified: SystemTime) {
        let file = fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(modified).unwrap();
    }

    #[test]
    fn test_whole_day_rule() {
        let now = SystemTime::now();

        assert!(!exceeds_window(now - days(3), now, 3));
        assert!(!exceeds_window(now - days(4) + Duration::from_secs(1), now, 3));
        assert!(exceeds_window(now - days(4), now, 3));
        assert!(!exceeds_window(now + days(10), now, 0));
    }

    #[test]
    fn test_prune_files_recurses() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("host-a");
        fs::create_dir_all(&nested).unwrap();
        let old = nested.join("binlog.000001");
        let fresh = dir.path().join("binlog.000002");
        fs::write(&old, "x").unwrap();
        fs::write(&fresh, "y").unwrap();

        let now = SystemTime::now() + days(10);
        touch(&fresh, now - days(1));

        let report = prune_files(dir.path(), 3, now).unwrap();

        assert_eq!(report.scanned, 2);
        assert_eq!(report.removed, 1);
        assert!(!old.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn test_missing_directory_is_reported_not_failed() {
        let dir = tempfile::tempdir().unwrap();
        let report = prune_directories(&dir.path().join("nope"), 3, SystemTime::now()).unwrap();

        assert!(report.missing);
        assert_eq!(report.scanned, 0);
    }
}
