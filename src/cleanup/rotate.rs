// Log rotation - gzip logs after a day, delete archives after the local window

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use tracing::{debug, warn};

use super::local::exceeds_window;
use crate::Result;

/// Plain logs are compressed once older than this many whole days
pub const COMPRESS_AFTER_DAYS: u32 = 1;

/// Counts from one pass over the logs directory
#[derive(Debug, Clone, Default, Serialize)]
pub struct RotationReport {
    /// Logs gzipped in place
    pub compressed: usize,
    /// Archives removed after the local window
    pub deleted: usize,
    /// Files that could not be compressed or removed
    pub failed: usize,
}

/// Rotate the files in `log_dir`.
///
/// `*.log` files older than [`COMPRESS_AFTER_DAYS`] become `*.log.gz` (keeping
/// their modification time), and `*.log.gz` files older than `retention_days`
/// are removed. `active` is never touched.
pub fn rotate_logs(log_dir: &Path, retention_days: u32, now: SystemTime, active: Option<&Path>) -> Result<RotationReport> {
    let mut report = RotationReport::default();
    if !log_dir.is_dir() {
        return Ok(report);
    }

    let mut plain = Vec::new();
    let mut archives = Vec::new();
    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        if active.map_or(false, |active| active == path.as_path()) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".log.gz") {
            archives.push(path);
        } else if name.ends_with(".log") {
            plain.push(path);
        }
    }

    for path in plain {
        let Some(modified) = modified(&path) else { continue };
        if !exceeds_window(modified, now, COMPRESS_AFTER_DAYS) {
            continue;
        }
        match compress(&path, modified) {
            Ok(archive) => {
                debug!(path = %archive.display(), "Compressed log");
                report.compressed += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to compress log");
                report.failed += 1;
            }
        }
    }

    // Archives produced above keep the source mtime and may expire right away
    for entry in fs::read_dir(log_dir)? {
        let path = entry?.path();
        if path.to_string_lossy().ends_with(".log.gz") && !archives.contains(&path) {
            archives.push(path);
        }
    }

    for path in archives {
        let Some(modified) = modified(&path) else { continue };
        if !exceeds_window(modified, now, retention_days) {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "Deleted archived log");
                report.deleted += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to delete archived log");
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// `gzip -f`: replace `path` with `path.gz`, preserving the modification time
fn compress(path: &Path, modified: SystemTime) -> io::Result<PathBuf> {
    let mut archive_name = path.as_os_str().to_owned();
    archive_name.push(".gz");
    let archive = PathBuf::from(archive_name);

    let mut reader = BufReader::new(File::open(path)?);
    let mut encoder = GzEncoder::new(BufWriter::new(File::create(&archive)?), Compression::default());
    io::copy(&mut reader, &mut encoder)?;
    let file = encoder
        .finish()?
        .into_inner()
        .map_err(|e| e.into_error())?;
    file.set_modified(modified)?;

    fs::remove_file(path)?;
    Ok(archive)
}
