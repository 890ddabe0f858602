//! Point-in-time restore.
//!
//! A restore downloads the full backup taken on the requested day, prepares
//! it, materializes it into a fresh data directory, optionally prunes it down
//! to one schema, and finally replays every archived binlog segment up to the
//! requested instant. Stage order and the failure policy of each step are
//! fixed; see [`stage`].

/// Arguments and the validated request
pub mod request;
/// The seven-stage pipeline
pub mod sequencer;
/// Stages, steps and failure policy
pub mod stage;
/// Workspace layout and run lock
pub mod workspace;

pub use request::{RecoveryPoint, RestoreArgs, RestoreRequest};
pub use sequencer::{
    compare_segments, discover_segments, segment_number, Outcome, RestoreReport, RestoreSequencer, SegmentOutcome,
    validate_request, SYSTEM_SCHEMAS,
};
pub use stage::{FailurePolicy, RestoreStage, StageFailure, StageResult, Step};
pub use workspace::{is_empty_dir, RestoreWorkspace, RunLock};
