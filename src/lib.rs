//! # dbvault
//!
//! Backup, binlog archival, retention cleanup and point-in-time recovery for MySQL,
//! orchestrated on top of `xtrabackup`, `mysqlbinlog`, `rsync` and the `aws` CLI.
//!
//! ## Overview
//!
//! Every workflow is a deterministic, sequential pipeline of external tool
//! invocations. Each invocation goes through a [`exec::CommandRunner`] with an
//! explicit timeout and is never retried; durability comes from re-running the
//! whole pipeline on the next schedule.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dbvault::config::Config;
//! use dbvault::exec::ProcessRunner;
//! use dbvault::restore::{RestoreArgs, RestoreSequencer};
//! use dbvault::storage::AwsCliStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(Config::from_env()?);
//! let runner = Arc::new(ProcessRunner::new());
//! let store = Arc::new(AwsCliStore::from_config(&config, runner.clone())?);
//!
//! let report = RestoreSequencer::new(config, store, runner)
//!     .run(RestoreArgs::new("2025-01-10", "12:00:00"))
//!     .await?;
//! println!("restored into {}", report.data_dir.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`retention`]: remote listing parser and retention comparisons
//! - [`cleanup`]: local, remote and log retention enforcement
//! - [`restore`]: the point-in-time recovery sequencer
//! - [`backup`]: full snapshot and binlog archival pipelines
//! - [`exec`], [`storage`], [`tools`]: process, object store and tool adapters
//! - [`config`], [`logging`], [`cli`]: the ambient surface

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use thiserror::Error;

/// Result type for dbvault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Main error type for dbvault operations
#[derive(Error, Debug)]
pub enum VaultError {
    /// Missing or malformed arguments, or missing bucket identity
    #[error("Validation error: {0}")]
    Validation(String),

    /// Directory creation, permission or lock failures
    #[error("Environment error: {0}")]
    Environment(String),

    /// Listing, sync, upload, download or delete against the object store
    #[error("Transfer error: {0}")]
    Transfer(String),

    /// Non-zero exit or timeout of xtrabackup, mysql, rsync and friends
    #[error("Tool error: {0}")]
    Tool(String),

    /// Failure applying a single binlog segment
    #[error("Replay error: {0}")]
    Replay(String),

    /// Malformed configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Plain IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Environment-sourced configuration
pub mod config;

/// Subprocess execution with timeouts
pub mod exec;

/// Remote object store adapters
pub mod storage;

/// Command builders for the external database tools
pub mod tools;

/// Listing parser and retention comparisons
pub mod retention;

/// Retention enforcement across local and remote namespaces
pub mod cleanup;

/// Point-in-time restore pipeline
pub mod restore;

/// Full backup and binlog archival pipelines
pub mod backup;

/// Tracing subscriber setup
pub mod logging;

/// Command-line surface
pub mod cli;
