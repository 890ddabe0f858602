// Restore stages and their failure policy

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::VaultError;

/// The seven restore stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RestoreStage {
    /// Arguments and bucket
    Validate = 1,
    /// Lock and fresh directories
    PrepareWorkspace = 2,
    /// Download `full/<day>`
    FetchFullBackup = 3,
    /// `xtrabackup --prepare`
    PrepareBackup = 4,
    /// Copy-back and ownership
    MaterializeDatadir = 5,
    /// Single-database mode only
    PruneSchemas = 6,
    /// Download and replay every segment
    ReplayBinlogs = 7,
}

/// What happens to the run when a step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailurePolicy {
    /// Stop the run and report the stage as failed
    Fatal,
    /// Log, record and continue
    BestEffort,
}

/// Individual actions inside the stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Step {
    /// Date and time parse
    CheckArguments,
    /// A bucket is configured
    CheckBucket,
    /// Taking the run lock
    AcquireLock,
    /// Wiping and recreating the workspace directories
    RecreateWorkspace,
    /// Fetching `full/<day>` into the workspace
    DownloadFullBackup,
    /// Download produced an empty directory
    CheckFullBackup,
    /// `xtrabackup --prepare`
    PrepareBackup,
    /// `xtrabackup --copy-back`
    CopyBack,
    /// `chown -R` on the data directory
    ChangeOwner,
    /// Deleting one non-target schema directory
    RemoveSchema,
    /// Fetching `binlogs/` into the workspace
    DownloadBinlogs,
    /// Listing the downloaded segments
    DiscoverSegments,
    /// Option file for the replay client
    WriteCredentials,
    /// One segment; failures are recorded and replay moves on
    ReplaySegment,
}

impl Step {
    /// Stage this step belongs to
    pub fn stage(self) -> RestoreStage {
        match self {
            Step::CheckArguments | Step::CheckBucket => RestoreStage::Validate,
            Step::AcquireLock | Step::RecreateWorkspace => RestoreStage::PrepareWorkspace,
            Step::DownloadFullBackup | Step::CheckFullBackup => RestoreStage::FetchFullBackup,
            Step::PrepareBackup => RestoreStage::PrepareBackup,
            Step::CopyBack | Step::ChangeOwner => RestoreStage::MaterializeDatadir,
            Step::RemoveSchema => RestoreStage::PruneSchemas,
            Step::DownloadBinlogs | Step::DiscoverSegments | Step::WriteCredentials | Step::ReplaySegment => {
                RestoreStage::ReplayBinlogs
            }
        }
    }

    /// Whether a failure of this step ends the run
    pub fn policy(self) -> FailurePolicy {
        match self {
            Step::ChangeOwner | Step::RemoveSchema | Step::ReplaySegment => FailurePolicy::BestEffort,
            _ => FailurePolicy::Fatal,
        }
    }
}

impl RestoreStage {
    /// Every stage in run order
    pub const ALL: [RestoreStage; 7] = [
        RestoreStage::Validate,
        RestoreStage::PrepareWorkspace,
        RestoreStage::FetchFullBackup,
        RestoreStage::PrepareBackup,
        RestoreStage::MaterializeDatadir,
        RestoreStage::PruneSchemas,
        RestoreStage::ReplayBinlogs,
    ];

    /// 1-based position
    pub fn number(self) -> u8 {
        self as u8
    }

    /// Short name used in logs
    pub fn name(self) -> &'static str {
        match self {
            RestoreStage::Validate => "validate",
            RestoreStage::PrepareWorkspace => "prepare workspace",
            RestoreStage::FetchFullBackup => "fetch full backup",
            RestoreStage::PrepareBackup => "prepare backup",
            RestoreStage::MaterializeDatadir => "materialize datadir",
            RestoreStage::PruneSchemas => "prune schemas",
            RestoreStage::ReplayBinlogs => "replay binlogs",
        }
    }

    /// Stage-level policy: fatal unless every step in it is best effort
    pub fn policy(self) -> FailurePolicy {
        match self {
            RestoreStage::PruneSchemas => FailurePolicy::BestEffort,
            _ => FailurePolicy::Fatal,
        }
    }
}

impl fmt::Display for RestoreStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {} ({})", self.number(), self.name())
    }
}

/// Result of a stage or of a whole restore
pub type StageResult<T> = std::result::Result<T, StageFailure>;

/// A fatal failure, tagged with the stage it happened in
#[derive(Debug, Error)]
#[error("Restore failed at {stage}: {error}")]
pub struct StageFailure {
    /// Stage that stopped the run
    pub stage: RestoreStage,
    /// What went wrong
    #[source]
    pub error: VaultError,
}

impl StageFailure {
    /// Failure attributed to `stage`
    pub fn new(stage: RestoreStage, error: VaultError) -> Self {
        Self { stage, error }
    }

    /// Failure attributed to the stage owning `step`
    pub fn at(step: Step, error: VaultError) -> Self {
        Self::new(step.stage(), error)
    }
}
