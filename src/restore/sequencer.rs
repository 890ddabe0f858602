// Restore Sequencer - seven-stage point-in-time recovery pipeline

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, instrument, warn};

use super::request::{RecoveryPoint, RestoreArgs, RestoreRequest};
use super::stage::{FailurePolicy, StageFailure, StageResult, Step};
use super::workspace::{is_empty_dir, RestoreWorkspace, RunLock};
use crate::config::Config;
use crate::exec::CommandRunner;
use crate::storage::ObjectStore;
use crate::tools::{chown_recursive, CredentialsFile, HotBackup, MysqlClient};
use crate::{Result, VaultError};

/// Schemas that survive single-database pruning regardless of the target
pub const SYSTEM_SCHEMAS: [&str; 3] = ["mysql", "performance_schema", "sys"];

const SEGMENT_PREFIX: &str = "binlog.";
const INDEX_SUFFIX: &str = ".index";

/// What happened to one binlog segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Every event up to the cutoff was applied
    Applied,
    /// The pipe failed
    Failed {
        /// Tool output explaining the failure
        error: String,
    },
}

/// Replay result for one segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentOutcome {
    /// Local path of the segment file
    pub segment: PathBuf,
    /// What happened to it
    pub outcome: Outcome,
}

impl SegmentOutcome {
    /// Whether the replay succeeded
    pub fn applied(&self) -> bool {
        self.outcome == Outcome::Applied
    }
}

/// Outcome of a successful restore
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    /// Workspace root holding `full/`, `binlogs/` and `data/`
    pub workspace: PathBuf,
    /// Materialized data directory, ready for the server
    pub data_dir: PathBuf,
    /// Instant replay stopped at
    pub cutoff: RecoveryPoint,
    /// `None` restores every schema
    pub target_database: Option<String>,
    /// Schemas removed in single-database mode
    pub pruned_schemas: Vec<String>,
    /// In replay order
    pub segments: Vec<SegmentOutcome>,
}

impl RestoreReport {
    /// Segments whose replay failed
    pub fn failed_segments(&self) -> impl Iterator<Item = &SegmentOutcome> {
        self.segments.iter().filter(|s| !s.applied())
    }
}

/// State handed from one stage to the next
struct RestoreContext {
    request: RestoreRequest,
    workspace: RestoreWorkspace,
    pruned_schemas: Vec<String>,
    segments: Vec<SegmentOutcome>,
    _lock: RunLock,
}

/// Apply a step's failure policy: fatal errors end the run, best-effort
/// errors are logged and swallowed.
fn settle<T>(step: Step, result: Result<T>) -> StageResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(error) => match step.policy() {
            FailurePolicy::Fatal => Err(StageFailure::at(step, error)),
            FailurePolicy::BestEffort => {
                warn!(stage = %step.stage(), step = ?step, error = %error, "Continuing after non-fatal failure");
                Ok(None)
            }
        },
    }
}

/// Fatal steps: any error ends the run
fn require<T>(step: Step, result: Result<T>) -> StageResult<T> {
    debug_assert_eq!(step.policy(), FailurePolicy::Fatal);
    result.map_err(|e| StageFailure::at(step, e))
}

/// Stage 1 without side effects: parse the arguments, resolve the target
/// database against the configuration and require a bucket.
pub fn validate_request(config: &Config, args: &RestoreArgs) -> StageResult<RestoreRequest> {
    let mut request = require(Step::CheckArguments, RestoreRequest::from_args(args))?;
    if request.target_database.is_none() {
        request.target_database = config.target_database.clone();
    }
    require(Step::CheckBucket, config.require_bucket().map(|_| ()))?;
    Ok(request)
}

/// Drives a restore from a validated request to a materialized data directory
pub struct RestoreSequencer {
    config: Arc<Config>,
    store: Arc<dyn ObjectStore>,
    runner: Arc<dyn CommandRunner>,
}

impl RestoreSequencer {
    /// Create a sequencer over the given bucket and tool runner
    pub fn new(config: Arc<Config>, store: Arc<dyn ObjectStore>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, store, runner }
    }

    /// Run all seven stages.
    ///
    /// `Ok` means the datadir was materialized; individual segment failures
    /// are carried in the report. `Err` names the stage that stopped the run.
    #[instrument(skip(self, args), fields(date = ?args.date, time = ?args.time))]
    pub async fn run(&self, args: RestoreArgs) -> StageResult<RestoreReport> {
        let started = Instant::now();

        let request = self.validate(&args)?;
        let ctx = self.prepare_workspace(request)?;
        let ctx = self.fetch_full_backup(ctx).await?;
        let ctx = self.prepare_backup(ctx).await?;
        let ctx = self.materialize_datadir(ctx).await?;
        let ctx = self.prune_schemas(ctx).await?;
        let ctx = self.replay_binlogs(ctx).await?;

        let report = RestoreReport {
            workspace: ctx.workspace.root().to_path_buf(),
            data_dir: ctx.workspace.data_dir(),
            cutoff: ctx.request.recovery_point(),
            target_database: ctx.request.target_database.clone(),
            pruned_schemas: ctx.pruned_schemas,
            segments: ctx.segments,
        };

        let failed = report.failed_segments().count();
        info!(
            elapsed_secs = started.elapsed().as_secs(),
            segments = report.segments.len(),
            failed_segments = failed,
            data_dir = %report.data_dir.display(),
            "✔ Restore completed"
        );
        Ok(report)
    }

    fn validate(&self, args: &RestoreArgs) -> StageResult<RestoreRequest> {
        let request = validate_request(&self.config, args)?;

        info!(
            cutoff = %request.recovery_point(),
            target_database = request.target_database.as_deref().unwrap_or("*"),
            "Restore request validated"
        );
        Ok(request)
    }

    fn prepare_workspace(&self, request: RestoreRequest) -> StageResult<RestoreContext> {
        let lock = require(Step::AcquireLock, RunLock::acquire(&self.config.restore_lock_path()))?;

        let workspace = RestoreWorkspace::new(self.config.restore_dir());
        require(Step::RecreateWorkspace, workspace.recreate())?;
        info!(path = %workspace.root().display(), "Restore workspace ready");

        Ok(RestoreContext {
            request,
            workspace,
            pruned_schemas: Vec::new(),
            segments: Vec::new(),
            _lock: lock,
        })
    }

    async fn fetch_full_backup(&self, ctx: RestoreContext) -> StageResult<RestoreContext> {
        let prefix = ctx.request.full_backup_prefix();
        let full_dir = ctx.workspace.full_dir();
        info!(prefix = %prefix, "➡ Downloading full backup");

        require(Step::DownloadFullBackup, self.store.sync_down(&prefix, &full_dir).await)?;

        let check = if is_empty_dir(&full_dir) {
            Err(VaultError::Transfer(format!(
                "Full backup download failed or is empty ({} not found in remote storage?)",
                prefix
            )))
        } else {
            Ok(())
        };
        require(Step::CheckFullBackup, check)?;

        info!("✔ Full backup downloaded");
        Ok(ctx)
    }

    async fn prepare_backup(&self, ctx: RestoreContext) -> StageResult<RestoreContext> {
        info!("➡ Preparing backup");
        let tool = HotBackup::new(self.runner.clone());
        require(Step::PrepareBackup, tool.prepare(&ctx.workspace.full_dir()).await)?;
        info!("✔ Backup prepared");
        Ok(ctx)
    }

    async fn materialize_datadir(&self, ctx: RestoreContext) -> StageResult<RestoreContext> {
        info!("➡ Copying backup into data directory");
        let data_dir = ctx.workspace.data_dir();
        let tool = HotBackup::new(self.runner.clone());
        require(Step::CopyBack, tool.copy_back(&ctx.workspace.full_dir(), &data_dir).await)?;

        let owner = &self.config.mysql.service_user;
        settle(Step::ChangeOwner, chown_recursive(self.runner.as_ref(), owner, &data_dir).await)?;
        info!("✔ Data directory materialized");
        Ok(ctx)
    }

    async fn prune_schemas(&self, mut ctx: RestoreContext) -> StageResult<RestoreContext> {
        let Some(target) = ctx.request.target_database.clone() else {
            return Ok(ctx);
        };
        info!(target = %target, "➡ Single database mode: keeping only '{}'", target);

        let data_dir = ctx.workspace.data_dir();
        let schemas = match schema_dirs(&data_dir) {
            Ok(schemas) => schemas,
            Err(e) => {
                settle::<()>(Step::RemoveSchema, Err(e))?;
                return Ok(ctx);
            }
        };

        for (name, path) in schemas {
            if name == target || SYSTEM_SCHEMAS.contains(&name.as_str()) {
                info!(schema = %name, "Keeping schema");
                continue;
            }
            info!(schema = %name, "Removing schema");
            let removed = fs::remove_dir_all(&path).map_err(|e| {
                VaultError::Environment(format!("Failed to remove {}: {}", path.display(), e))
            });
            if settle(Step::RemoveSchema, removed)?.is_some() {
                ctx.pruned_schemas.push(name);
            }
        }

        info!(removed = ctx.pruned_schemas.len(), "✔ Unwanted databases removed");
        Ok(ctx)
    }

    async fn replay_binlogs(&self, mut ctx: RestoreContext) -> StageResult<RestoreContext> {
        let binlogs_dir = ctx.workspace.binlogs_dir();
        info!("➡ Downloading binlogs");
        require(Step::DownloadBinlogs, self.store.sync_down("binlogs/", &binlogs_dir).await)?;

        let segments = require(Step::DiscoverSegments, discover_segments(&binlogs_dir))?;
        let credentials = require(Step::WriteCredentials, CredentialsFile::create(&self.config.mysql))?;

        let cutoff = ctx.request.recovery_point();
        let database = ctx.request.target_database.as_deref();
        info!(segments = segments.len(), cutoff = %cutoff, "➡ Applying binlogs");

        let client = MysqlClient::new(self.runner.clone());
        for segment in segments {
            info!(segment = %segment.display(), "Applying segment");
            let result = client
                .replay_segment(&credentials, &segment, cutoff.instant(), database)
                .await;
            let outcome = match result {
                Ok(()) => Outcome::Applied,
                Err(e) => {
                    let error = e.to_string();
                    settle::<()>(Step::ReplaySegment, Err(e))?;
                    Outcome::Failed { error }
                }
            };
            ctx.segments.push(SegmentOutcome { segment, outcome });
        }

        info!("✔ Binlogs applied");
        Ok(ctx)
    }
}

/// Immediate subdirectories of `data_dir`, by name
fn schema_dirs(data_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut schemas = Vec::new();
    for entry in fs::read_dir(data_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            schemas.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
        }
    }
    schemas.sort();
    Ok(schemas)
}

/// Numeric part of `binlog.NNNNNN`, if the suffix is all digits
pub fn segment_number(name: &str) -> Option<u64> {
    name.strip_prefix(SEGMENT_PREFIX)?.parse().ok()
}

/// Replay order: numeric suffixes ascending, then anything else by name
pub fn compare_segments(a: &str, b: &str) -> Ordering {
    let key = |name: &str| {
        let number = segment_number(name);
        (number.is_none(), number)
    };
    key(a).cmp(&key(b)).then_with(|| a.cmp(b))
}

/// Binlog segment files in `dir`, excluding the index, in replay order
pub fn discover_segments(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(SEGMENT_PREFIX) && !name.ends_with(INDEX_SUFFIX) {
            names.push(name);
        }
    }
    names.sort_by(|a, b| compare_segments(a, b));
    Ok(names.into_iter().map(|name| dir.join(name)).collect())
}
