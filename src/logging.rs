//! Console and per-command file logging.
//!
//! Every command logs to stderr and appends the same events, without ANSI
//! colours, to `<storage>/logs/<command file>.log`. The filter comes from
//! `RUST_LOG` when set, otherwise from the configured default.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::{Result, VaultError};

/// Keeps the background log writer alive; flushes on drop
pub struct LogGuard {
    _guard: WorkerGuard,
    path: PathBuf,
}

impl LogGuard {
    /// File this process is appending to
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

/// Log file name used by each command
pub fn log_file_name(command: &str) -> String {
    let stem = match command {
        "full" => "full_backup",
        "binlogs" => "archive_binlogs",
        "restore" => "restore_from_s3",
        other => other,
    };
    format!("{}.log", stem)
}

/// Absolute location of a command's log file
pub fn log_file_path(config: &Config, command: &str) -> PathBuf {
    config.logs_dir().join(log_file_name(command))
}

fn filter(config: &Config, verbose: bool) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directive = if verbose { "debug" } else { config.log_filter.as_str() };
    EnvFilter::try_new(directive)
        .map_err(|e| VaultError::Config(format!("Invalid log filter '{}': {}", directive, e)))
}

/// Install the global subscriber for `command`
pub fn init(config: &Config, command: &str, verbose: bool) -> Result<LogGuard> {
    let logs_dir = config.logs_dir();
    fs::create_dir_all(&logs_dir).map_err(|e| {
        VaultError::Environment(format!("Failed to create log directory {}: {}", logs_dir.display(), e))
    })?;

    let path = log_file_path(config, command);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| VaultError::Environment(format!("Failed to open log file {}: {}", path.display(), e)))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter(config, verbose)?)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| VaultError::Config(format!("Failed to install log subscriber: {}", e)))?;

    Ok(LogGuard { _guard: guard, path })
}
