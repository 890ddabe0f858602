// Backup pipelines - daily snapshots and binlog archival

/// Binlog archival
pub mod binlogs;
/// Daily full snapshot
pub mod full;
/// Reports shared by both pipelines
pub mod types;

pub use binlogs::BinlogArchiver;
pub use full::FullBackupPipeline;
pub use types::{BackupKind, BackupReport};

use std::fs;
use std::path::Path;

use crate::{Result, VaultError};

/// Create `dir` (and parents) and make sure it accepts writes
pub(crate) fn ensure_writable_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .map_err(|e| VaultError::Environment(format!("Failed to create {}: {}", dir.display(), e)))?;
    let metadata = fs::metadata(dir)
        .map_err(|e| VaultError::Environment(format!("Failed to inspect {}: {}", dir.display(), e)))?;
    if metadata.permissions().readonly() {
        return Err(VaultError::Environment(format!("{} is not writable", dir.display())));
    }
    Ok(())
}
