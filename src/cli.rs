//! Command-line interface.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::backup::{BinlogArchiver, FullBackupPipeline};
use crate::cleanup::CleanupEngine;
use crate::config::Config;
use crate::exec::{CommandRunner, ProcessRunner};
use crate::logging;
use crate::restore::{validate_request, RestoreArgs, RestoreSequencer};
use crate::storage::{AwsCliStore, ObjectStore};

/// Cron lines matching the intended cadence of each job
pub const SCHEDULE: [(&str, &str); 3] = [
    ("0 2 * * *", "full"),
    ("*/30 * * * *", "binlogs"),
    ("0 3 * * *", "cleanup"),
];

/// Top-level arguments
#[derive(Debug, Parser)]
#[command(name = "dbvault", version, about = "MySQL backup, archival, retention and point-in-time restore")]
pub struct Cli {
    /// Read environment overrides from this file instead of ./.env
    #[arg(long, global = true, value_name = "PATH")]
    pub env_file: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print the run report as JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Job to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Jobs the binary can run
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Take a full hot backup and upload it to full/<today>
    Full,
    /// Mirror binlogs locally and upload them to binlogs/
    Binlogs,
    /// Enforce local and remote retention and rotate logs
    Cleanup(CleanupCommand),
    /// Restore the full backup of a day and replay binlogs up to a time
    Restore(RestoreCommand),
    /// Print crontab lines for the recurring jobs
    Schedule,
}

/// Retention overrides for `cleanup`
#[derive(Debug, Args)]
pub struct CleanupCommand {
    /// Override RETENTION_DAYS_FOR_LOCAL
    #[arg(long)]
    pub local_days: Option<u32>,
    /// Override RETENTION_DAYS_FOR_CLOUD
    #[arg(long)]
    pub cloud_days: Option<u32>,
}

/// Recovery point for `restore`
#[derive(Debug, Args)]
pub struct RestoreCommand {
    /// Day of the full backup to restore (YYYY-MM-DD)
    #[arg(long)]
    pub date: Option<String>,
    /// Replay binlogs up to this time on that day (HH:MM:SS)
    #[arg(long)]
    pub time: Option<String>,
    /// Keep only this schema; defaults to TARGET_DATABASE
    #[arg(long)]
    pub database: Option<String>,
}

impl Commands {
    /// Name used for the log file and the root span
    pub fn key(&self) -> &'static str {
        match self {
            Commands::Full => "full",
            Commands::Binlogs => "binlogs",
            Commands::Cleanup(_) => "cleanup",
            Commands::Restore(_) => "restore",
            Commands::Schedule => "schedule",
        }
    }
}

fn restore_args(args: &RestoreCommand) -> RestoreArgs {
    RestoreArgs {
        date: args.date.clone(),
        time: args.time.clone(),
        target_database: args.database.clone(),
    }
}

fn emit<T: Serialize>(json: bool, report: &T) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    }
    Ok(())
}

/// Run the selected command and map its outcome to a process exit code
pub async fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    if let Commands::Schedule = cli.command {
        let program = std::env::args().next().unwrap_or_else(|| "dbvault".to_string());
        for (cron, command) in SCHEDULE {
            println!("{} {} {}", cron, program, command);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = Config::load(cli.env_file.as_deref()).context("Failed to load configuration")?;
    if let Commands::Cleanup(args) = &cli.command {
        let local = args.local_days.unwrap_or(config.retention.local_days);
        let cloud = args.cloud_days.unwrap_or(config.retention.cloud_days);
        config = config.with_retention(local, cloud);
    }
    execute(cli, Arc::new(config)).await
}

/// Run a command against an already-loaded configuration
pub async fn execute(cli: Cli, config: Arc<Config>) -> anyhow::Result<ExitCode> {
    // Restore input is checked before logging creates the log directory
    if let Commands::Restore(args) = &cli.command {
        if let Err(failure) = validate_request(&config, &restore_args(args)) {
            eprintln!("✖ {}", failure);
            return Ok(ExitCode::FAILURE);
        }
    }

    let key = cli.command.key();
    let _log_guard = logging::init(&config, key, cli.verbose).context("Failed to initialise logging")?;
    let span = info_span!("dbvault", command = key, run_id = %Uuid::new_v4());

    run_command(cli, config).instrument(span).await
}

async fn run_command(cli: Cli, config: Arc<Config>) -> anyhow::Result<ExitCode> {
    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner::new());
    let store: Arc<dyn ObjectStore> = match AwsCliStore::from_config(&config, runner.clone()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, "✖ Remote storage is not configured");
            return Ok(ExitCode::FAILURE);
        }
    };

    match cli.command {
        Commands::Full => {
            match FullBackupPipeline::new(config, store, runner).run().await {
                Ok(report) => {
                    emit(cli.json, &report)?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    error!(error = %e, "✖ Backup failed");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Binlogs => {
            match BinlogArchiver::new(config, store, runner).run().await {
                Ok(report) => {
                    emit(cli.json, &report)?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    error!(error = %e, "✖ Binlog archival failed");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Cleanup(_) => {
            let report = CleanupEngine::new(config, store).run().await;
            for problem in report.problems() {
                warn!(problem = %problem, "Cleanup incomplete");
            }
            emit(cli.json, &report)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Restore(args) => {
            match RestoreSequencer::new(config, store, runner).run(restore_args(&args)).await {
                Ok(report) => {
                    for segment in report.failed_segments() {
                        warn!(segment = %segment.segment.display(), "Segment was not fully applied");
                    }
                    info!(data_dir = %report.data_dir.display(), "Restored data directory is ready");
                    emit(cli.json, &report)?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(failure) => {
                    error!(stage = %failure.stage, error = %failure.error, "✖ Restore failed");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Schedule => Ok(ExitCode::SUCCESS),
    }
}
