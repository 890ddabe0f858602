// Full Backup Pipeline - hot backup, flush logs, upload

use std::fs;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Local, NaiveDate};
use tracing::{info, instrument};

use super::types::{BackupKind, BackupReport};
use super::ensure_writable_dir;
use crate::config::Config;
use crate::exec::{timeouts, CommandRunner};
use crate::storage::ObjectStore;
use crate::tools::{CredentialsFile, HotBackup, MysqlClient};
use crate::{Result, VaultError};

/// Daily hot-backup snapshot, uploaded to `full/<day>`
pub struct FullBackupPipeline {
    config: Arc<Config>,
    store: Arc<dyn ObjectStore>,
    runner: Arc<dyn CommandRunner>,
}

impl FullBackupPipeline {
    /// Create a pipeline over the given bucket and tool runner
    pub fn new(config: Arc<Config>, store: Arc<dyn ObjectStore>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, store, runner }
    }

    /// Back up today's snapshot
    pub async fn run(&self) -> Result<BackupReport> {
        self.run_for(Local::now().date_naive()).await
    }

    /// Snapshot into `backups/full/<day>` and upload to `full/<day>`.
    ///
    /// Any step failing aborts the run; a previous snapshot for the same day
    /// is replaced.
    #[instrument(skip(self), fields(day = %day))]
    pub async fn run_for(&self, day: NaiveDate) -> Result<BackupReport> {
        let started = Instant::now();
        let bucket = self.config.require_bucket()?.to_string();
        let stamp = day.format("%Y-%m-%d").to_string();
        let target_dir = self.config.full_backups_dir().join(&stamp);
        let remote_prefix = format!("full/{}", stamp);

        if let Some(db) = &self.config.target_database {
            info!(target_database = %db, "Target database is set; the whole instance is backed up and pruned at restore time");
        }

        info!(path = %target_dir.display(), "➡ Preparing backup directory");
        if target_dir.exists() {
            fs::remove_dir_all(&target_dir).map_err(|e| {
                VaultError::Environment(format!("Failed to clear {}: {}", target_dir.display(), e))
            })?;
        }
        ensure_writable_dir(&target_dir)?;

        let credentials = CredentialsFile::create(&self.config.mysql)?;

        info!("➡ Running XtraBackup");
        HotBackup::new(self.runner.clone())
            .backup(&credentials, &self.config.mysql.data_dir, &target_dir)
            .await?;
        info!("✔ XtraBackup completed");

        info!("➡ Flushing binary logs");
        MysqlClient::new(self.runner.clone()).flush_logs(&credentials).await?;
        info!("✔ Binary logs flushed");

        info!(bucket = %bucket, prefix = %remote_prefix, "➡ Uploading to S3");
        self.store
            .sync_up(&target_dir, &remote_prefix, timeouts::UPLOAD_FULL)
            .await?;
        info!("✔ Upload completed");

        let mut report = BackupReport::new(BackupKind::Full, target_dir, remote_prefix, started.elapsed());
        report.day = Some(day);
        info!(elapsed_secs = report.elapsed_secs, "Full backup finished");
        Ok(report)
    }
}
