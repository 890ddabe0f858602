// Backup pipeline types

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;

use crate::cleanup::RotationReport;

/// Which artifact a pipeline produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    /// Daily hot-backup snapshot under `full/<day>`
    Full,
    /// Incremental binlog archive under `binlogs/`
    Binlogs,
}

/// Result of a completed backup pipeline
#[derive(Debug, Clone, Serialize)]
pub struct BackupReport {
    /// Which pipeline ran
    pub kind: BackupKind,
    /// Day stamp of a full snapshot
    pub day: Option<NaiveDate>,
    /// Local directory that was uploaded
    pub local_dir: PathBuf,
    /// Bucket prefix the upload landed under
    pub remote_prefix: String,
    /// Wall time of the whole run
    pub elapsed_secs: f64,
    /// Present after binlog archival when rotation ran
    pub log_rotation: Option<RotationReport>,
}

impl BackupReport {
    pub(crate) fn new(kind: BackupKind, local_dir: PathBuf, remote_prefix: String, elapsed: Duration) -> Self {
        Self {
            kind,
            day: None,
            local_dir,
            remote_prefix,
            elapsed_secs: elapsed.as_secs_f64(),
            log_rotation: None,
        }
    }
}
