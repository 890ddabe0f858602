// Restore request - validated input for a point-in-time recovery

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::{Result, VaultError};

/// Raw restore input as received from the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreArgs {
    /// `YYYY-MM-DD`
    pub date: Option<String>,
    /// `HH:MM:SS`
    pub time: Option<String>,
    /// Single schema to keep
    pub target_database: Option<String>,
}

impl RestoreArgs {
    /// Arguments for a whole-server restore
    pub fn new(date: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            date: Some(date.into()),
            time: Some(time.into()),
            target_database: None,
        }
    }

    /// Restore a single schema
    pub fn with_target_database(mut self, database: impl Into<String>) -> Self {
        self.target_database = Some(database.into());
        self
    }
}

/// The instant binlog replay stops at, in server wall-clock time.
///
/// Deliberately a different type from [`crate::retention::RetentionCutoff`]:
/// this one has second precision, that one is a whole day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct RecoveryPoint(NaiveDateTime);

impl RecoveryPoint {
    /// The point as a naive local datetime
    pub fn instant(&self) -> NaiveDateTime {
        self.0
    }
}

impl std::fmt::Display for RecoveryPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Immutable, validated restore input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreRequest {
    /// Day of the full backup
    pub date: NaiveDate,
    /// Replay stops here, on `date`
    pub cutoff_time: NaiveTime,
    /// Single schema to keep
    pub target_database: Option<String>,
}

impl RestoreRequest {
    /// Validate the raw date (`YYYY-MM-DD`) and time (`HH:MM:SS`)
    pub fn parse(date: Option<&str>, time: Option<&str>, target_database: Option<&str>) -> Result<Self> {
        let (Some(date), Some(time)) = (non_blank(date), non_blank(time)) else {
            return Err(VaultError::Validation(
                "Both --date and --time are required".to_string(),
            ));
        };

        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| {
            VaultError::Validation(format!("Invalid date '{}', expected YYYY-MM-DD", date))
        })?;
        let cutoff_time = NaiveTime::parse_from_str(time, "%H:%M:%S").map_err(|_| {
            VaultError::Validation(format!("Invalid time '{}', expected HH:MM:SS", time))
        })?;

        Ok(Self {
            date,
            cutoff_time,
            target_database: non_blank(target_database).map(str::to_string),
        })
    }

    /// Validate raw arguments
    pub fn from_args(args: &RestoreArgs) -> Result<Self> {
        Self::parse(
            args.date.as_deref(),
            args.time.as_deref(),
            args.target_database.as_deref(),
        )
    }

    /// `date` at `cutoff_time`
    pub fn recovery_point(&self) -> RecoveryPoint {
        RecoveryPoint(self.date.and_time(self.cutoff_time))
    }

    /// Remote prefix of the full backup taken on the requested day
    pub fn full_backup_prefix(&self) -> String {
        format!("full/{}", self.date.format("%Y-%m-%d"))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
