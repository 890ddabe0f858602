// Cleanup Engine - retention enforcement across local and remote namespaces

/// Local mtime-based pruning
pub mod local;
/// Log compression and expiry
pub mod rotate;

pub use local::{age_in_days, exceeds_window, prune_directories, prune_files, LocalPruneReport};
pub use rotate::{rotate_logs, RotationReport};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::retention::{expired_entries, parse_listing, EntryKind, RetentionCutoff};
use crate::storage::ObjectStore;
use crate::{Result, VaultError};

/// A remote namespace managed by retention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteNamespace {
    /// Label used in logs and reports
    pub name: &'static str,
    /// Bucket prefix to list
    pub prefix: &'static str,
    /// Only entries of this kind are considered for deletion
    pub kind: EntryKind,
}

/// Day directories of full backups: `full/YYYY-MM-DD/`
pub const REMOTE_FULL_BACKUPS: RemoteNamespace = RemoteNamespace {
    name: "remote full backups",
    prefix: "full/",
    kind: EntryKind::PrefixGroup,
};

/// Individual binlog objects: `binlogs/binlog.NNNNNN`
pub const REMOTE_BINLOGS: RemoteNamespace = RemoteNamespace {
    name: "remote binlogs",
    prefix: "binlogs/",
    kind: EntryKind::Object,
};

/// Result of one remote namespace pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct NamespaceReport {
    /// Namespace label
    pub namespace: String,
    /// Entries parsed from the listing
    pub listed: usize,
    /// Entries older than the cutoff
    pub expired: usize,
    /// Keys removed from the bucket
    pub deleted: Vec<String>,
    /// Expired keys whose deletion failed
    pub failed_deletions: Vec<String>,
    /// Listing failure that aborted this pass
    pub error: Option<String>,
}

impl NamespaceReport {
    /// The listing failed, so nothing in this namespace was examined
    pub fn is_aborted(&self) -> bool {
        self.error.is_some()
    }
}

/// Outcome of a whole cleanup run
#[derive(Debug, Clone, Serialize)]
pub struct CleanupReport {
    /// Local window in whole days
    pub local_cutoff_days: u32,
    /// First day kept in the bucket
    pub remote_cutoff: NaiveDate,
    /// Snapshot directories under `backups/full`
    pub local_full_backups: LocalPruneReport,
    /// Binlog files under `backups/binlogs`
    pub local_binlogs: LocalPruneReport,
    /// Day groups under `full/`
    pub remote_full_backups: NamespaceReport,
    /// Objects under `binlogs/`
    pub remote_binlogs: NamespaceReport,
    /// `None` when the logs directory could not be read
    pub log_rotation: Option<RotationReport>,
}

impl CleanupReport {
    /// Namespace passes that were aborted or only partly completed
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for ns in [&self.remote_full_backups, &self.remote_binlogs] {
            if let Some(error) = &ns.error {
                problems.push(format!("{}: {}", ns.namespace, error));
            }
            for key in &ns.failed_deletions {
                problems.push(format!("{}: could not delete {}", ns.namespace, key));
            }
        }
        for local in [&self.local_full_backups, &self.local_binlogs] {
            if local.failed > 0 {
                problems.push(format!("{}: {} deletions failed", local.path.display(), local.failed));
            }
        }
        problems
    }
}

/// Drives the four retention passes and log rotation
pub struct CleanupEngine {
    config: Arc<Config>,
    store: Arc<dyn ObjectStore>,
}

impl CleanupEngine {
    /// Create an engine over the given bucket
    pub fn new(config: Arc<Config>, store: Arc<dyn ObjectStore>) -> Self {
        Self { config, store }
    }

    /// Run with the current wall clock
    pub async fn run(&self) -> CleanupReport {
        self.run_at(Local::now()).await
    }

    /// Run with a fixed clock reading shared by every pass
    #[instrument(skip(self), fields(local_days = self.config.retention.local_days, cloud_days = self.config.retention.cloud_days))]
    pub async fn run_at(&self, now: DateTime<Local>) -> CleanupReport {
        let retention = self.config.retention;
        let system_now = SystemTime::from(now);
        let cutoff = RetentionCutoff::from_now(now.naive_local(), retention.cloud_days);

        info!(
            local_days = retention.local_days,
            cloud_days = retention.cloud_days,
            remote_cutoff = %cutoff.day(),
            "Starting cleanup"
        );

        info!("➡ Deleting local full backups older than {} days", retention.local_days);
        let local_full_backups = self
            .local_pass(self.config.full_backups_dir(), move |dir| {
                prune_directories(&dir, retention.local_days, system_now)
            })
            .await;

        info!("➡ Deleting local binlogs older than {} days", retention.local_days);
        let local_binlogs = self
            .local_pass(self.config.binlog_backups_dir(), move |dir| {
                prune_files(&dir, retention.local_days, system_now)
            })
            .await;

        info!("➡ Checking S3 full backups older than {} days", retention.cloud_days);
        let remote_full_backups = self.prune_remote(REMOTE_FULL_BACKUPS, &cutoff).await;

        info!("➡ Checking S3 binlogs older than {} days", retention.cloud_days);
        let remote_binlogs = self.prune_remote(REMOTE_BINLOGS, &cutoff).await;

        info!("➡ Rotating logs");
        let log_dir = self.config.logs_dir();
        let active = crate::logging::log_file_path(&self.config, "cleanup");
        let log_rotation = match tokio::task::spawn_blocking(move || {
            rotate_logs(&log_dir, retention.local_days, system_now, Some(&active))
        })
        .await
        {
            Ok(Ok(report)) => Some(report),
            Ok(Err(e)) => {
                warn!(error = %e, "Log rotation failed");
                None
            }
            Err(e) => {
                warn!(error = %e, "Log rotation task failed");
                None
            }
        };

        info!("Cleanup completed");
        CleanupReport {
            local_cutoff_days: retention.local_days,
            remote_cutoff: cutoff.day(),
            local_full_backups,
            local_binlogs,
            remote_full_backups,
            remote_binlogs,
            log_rotation,
        }
    }

    async fn local_pass<F>(&self, dir: PathBuf, prune: F) -> LocalPruneReport
    where
        F: FnOnce(PathBuf) -> Result<LocalPruneReport> + Send + 'static,
    {
        let fallback = LocalPruneReport {
            path: dir.clone(),
            ..Default::default()
        };
        match tokio::task::spawn_blocking(move || prune(dir)).await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                error!(path = %fallback.path.display(), error = %e, "Local pruning failed");
                LocalPruneReport { failed: 1, ..fallback }
            }
            Err(e) => {
                error!(path = %fallback.path.display(), error = %e, "Local pruning task failed");
                LocalPruneReport { failed: 1, ..fallback }
            }
        }
    }

    /// List, parse, filter and delete one remote namespace.
    ///
    /// A listing failure aborts only this namespace; deletion failures are
    /// recorded and left for the next scheduled run.
    pub async fn prune_remote(&self, namespace: RemoteNamespace, cutoff: &RetentionCutoff) -> NamespaceReport {
        let mut report = NamespaceReport {
            namespace: namespace.name.to_string(),
            ..Default::default()
        };

        let listing = match self.store.list(namespace.prefix).await {
            Ok(text) => text,
            Err(e) => {
                error!(namespace = namespace.name, error = %e, "Failed to list remote namespace");
                report.error = Some(e.to_string());
                return report;
            }
        };

        let entries = parse_listing(namespace.prefix, &listing);
        report.listed = entries.len();
        let expired = expired_entries(entries, namespace.kind, cutoff);
        report.expired = expired.len();

        for entry in expired {
            info!(namespace = namespace.name, key = %entry.key, "Deleting expired remote entry");
            let result = match namespace.kind {
                EntryKind::PrefixGroup => self.store.delete_recursive(&entry.key).await,
                EntryKind::Object => self.store.delete_object(&entry.key).await,
            };
            match result {
                Ok(()) => report.deleted.push(entry.key),
                Err(e) => {
                    warn!(namespace = namespace.name, key = %entry.key, error = %e, "Failed to delete remote entry");
                    report.failed_deletions.push(entry.key);
                }
            }
        }

        report
    }
}

/// Compress and expire logs; used after binlog archival as well
pub async fn rotate_log_dir(config: &Config, active: &Path) -> Result<RotationReport> {
    let log_dir = config.logs_dir();
    let retention_days = config.retention.local_days;
    let active = active.to_path_buf();
    tokio::task::spawn_blocking(move || rotate_logs(&log_dir, retention_days, SystemTime::now(), Some(&active)))
        .await
        .map_err(|e| VaultError::Environment(format!("Log rotation task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;
    use chrono::{NaiveDateTime, TimeZone};

    fn config(root: &Path) -> Arc<Config> {
        Arc::new(
            Config::from_lookup(|_| None)
                .unwrap()
                .with_storage_root(root)
                .with_bucket("vault")
                .with_retention(3, 90),
        )
    }

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[tokio::test]
    async fn test_prune_remote_only_considers_namespace_kind() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryObjectStore::new();
        store.put("full/2024-01-01/ibdata1", ts("2024-01-01 02:00:00"), "x");
        store.put("full/stray.txt", ts("2020-01-01 00:00:00"), "x");
        let engine = CleanupEngine::new(config(dir.path()), Arc::new(store.clone()));

        let cutoff = RetentionCutoff::from_now(ts("2025-01-01 10:00:00"), 90);
        let report = engine.prune_remote(REMOTE_FULL_BACKUPS, &cutoff).await;

        assert_eq!(report.listed, 2);
        assert_eq!(report.deleted, vec!["full/2024-01-01/".to_string()]);
        assert!(store.contains("full/stray.txt"));
    }

    #[tokio::test]
    async fn test_run_at_uses_one_cutoff_for_both_namespaces() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryObjectStore::new();
        store.put("full/2024-10-03/ibdata1", ts("2024-10-03 02:00:00"), "x");
        store.put("binlogs/binlog.000001", ts("2024-10-02 23:59:59"), "x");
        store.put("binlogs/binlog.000002", ts("2024-10-03 00:00:00"), "x");
        let engine = CleanupEngine::new(config(dir.path()), Arc::new(store.clone()));

        let now = Local.from_local_datetime(&ts("2025-01-01 23:59:59")).unwrap();
        let report = engine.run_at(now).await;

        assert_eq!(report.remote_cutoff, ts("2024-10-03 00:00:00").date());
        assert!(store.contains("full/2024-10-03/ibdata1"));
        assert!(!store.contains("binlogs/binlog.000001"));
        assert!(store.contains("binlogs/binlog.000002"));
        assert!(report.local_full_backups.missing);
        assert!(report.problems().is_empty());
    }
}
