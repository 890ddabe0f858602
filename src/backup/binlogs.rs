// Binlog Archival Pipeline - mirror binlogs locally, upload, rotate logs

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument, warn};

use super::ensure_writable_dir;
use super::types::{BackupKind, BackupReport};
use crate::cleanup::rotate_log_dir;
use crate::config::Config;
use crate::exec::{timeouts, CommandRunner};
use crate::logging;
use crate::storage::ObjectStore;
use crate::tools::rsync_binlogs;
use crate::Result;

/// Remote namespace holding archived segments
pub const BINLOGS_PREFIX: &str = "binlogs/";

/// Mirrors the server binlog directory and uploads it to `binlogs/`
pub struct BinlogArchiver {
    config: Arc<Config>,
    store: Arc<dyn ObjectStore>,
    runner: Arc<dyn CommandRunner>,
}

impl BinlogArchiver {
    /// Create an archiver over the given bucket and tool runner
    pub fn new(config: Arc<Config>, store: Arc<dyn ObjectStore>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, store, runner }
    }

    /// Run one archival pass
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<BackupReport> {
        let started = Instant::now();
        self.config.require_bucket()?;
        let binlog_dir = self.config.binlog_backups_dir();
        ensure_writable_dir(&binlog_dir)?;

        info!(source = %self.config.mysql.data_dir.display(), "➡ Syncing binlogs locally");
        rsync_binlogs(self.runner.as_ref(), &self.config.mysql.data_dir, &binlog_dir).await?;
        info!("✔ Local binlog sync completed");

        info!(prefix = BINLOGS_PREFIX, "➡ Uploading binlogs to S3");
        self.store
            .sync_up(&binlog_dir, BINLOGS_PREFIX, timeouts::UPLOAD_BINLOGS)
            .await?;
        info!("✔ Binlogs uploaded");

        let active = logging::log_file_path(&self.config, "binlogs");
        let log_rotation = match rotate_log_dir(&self.config, &active).await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(error = %e, "Log rotation failed");
                None
            }
        };

        let mut report = BackupReport::new(
            BackupKind::Binlogs,
            binlog_dir,
            BINLOGS_PREFIX.to_string(),
            started.elapsed(),
        );
        report.log_rotation = log_rotation;
        info!(elapsed_secs = report.elapsed_secs, "Binlog archival finished");
        Ok(report)
    }
}
