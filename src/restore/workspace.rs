// Restore workspace and the run lock guarding it

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::Serialize;
use tracing::{debug, info};

use crate::{Result, VaultError};

/// Exclusive advisory lock held for the duration of a restore.
///
/// Released when dropped.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Take the lock without waiting; a held lock is an environment error
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                VaultError::Environment(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| VaultError::Environment(format!("Failed to open lock {}: {}", path.display(), e)))?;

        file.try_lock_exclusive().map_err(|_| {
            VaultError::Environment(format!(
                "Another restore is running (lock held on {})",
                path.display()
            ))
        })?;

        debug!(path = %path.display(), "Acquired restore lock");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// The lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Directory tree a restore is staged in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreWorkspace {
    root: PathBuf,
}

impl RestoreWorkspace {
    /// Layout rooted at `root`; nothing is created yet
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Workspace root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Downloaded and prepared full backup
    pub fn full_dir(&self) -> PathBuf {
        self.root.join("full")
    }

    /// Downloaded binlog segments
    pub fn binlogs_dir(&self) -> PathBuf {
        self.root.join("binlogs")
    }

    /// Materialized data directory
    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    /// Destroy any previous workspace and create the empty layout
    pub fn recreate(&self) -> Result<()> {
        if self.root.exists() {
            info!(path = %self.root.display(), "Removing previous restore workspace");
            fs::remove_dir_all(&self.root).map_err(|e| {
                VaultError::Environment(format!("Failed to remove {}: {}", self.root.display(), e))
            })?;
        }
        for dir in [self.binlogs_dir(), self.full_dir(), self.data_dir()] {
            fs::create_dir_all(&dir).map_err(|e| {
                VaultError::Environment(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }
}

/// True when `dir` is missing or has no entries
pub fn is_empty_dir(dir: &Path) -> bool {
    match fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recreate_wipes_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = RestoreWorkspace::new(dir.path().join("restored-databases"));
        fs::create_dir_all(workspace.full_dir()).unwrap();
        fs::write(workspace.full_dir().join("stale"), "old").unwrap();

        workspace.recreate().unwrap();

        assert!(is_empty_dir(&workspace.full_dir()));
        assert!(workspace.binlogs_dir().is_dir());
        assert!(workspace.data_dir().is_dir());
    }

    #[test]
    fn test_lock_is_exclusive_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("restore.lock");

        let first = RunLock::acquire(&path).unwrap();
        let err = RunLock::acquire(&path).unwrap_err();
        assert!(matches!(err, VaultError::Environment(_)));

        drop(first);
        assert!(RunLock::acquire(&path).is_ok());
    }

    #[test]
    fn test_missing_dir_counts_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(is_empty_dir(&dir.path().join("absent")));
        assert!(is_empty_dir(dir.path()));
        fs::write(dir.path().join("ibdata1"), "x").unwrap();
        assert!(!is_empty_dir(dir.path()));
    }
}
