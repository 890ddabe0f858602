//! Structured subprocess invocation.
//!
//! Pipelines never build shell strings. A [`CommandSpec`] is a program plus an
//! argument vector, handed to a [`CommandRunner`] together with an explicit
//! timeout. Runners never retry; a timeout is reported as a failed
//! [`CommandOutput`].

/// Process-spawning runner
pub mod runner;
/// Scripted runner for tests
pub mod scripted;

pub use runner::ProcessRunner;
pub use scripted::{RecordedCommand, ScriptedRunner};

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Timeouts applied to each kind of external operation
pub mod timeouts {
    use std::time::Duration;

    /// One `aws s3 ls` call
    pub const LIST: Duration = Duration::from_secs(300);
    /// One `aws s3 rm` call
    pub const DELETE: Duration = Duration::from_secs(300);
    /// Downloading a snapshot or the binlog set
    pub const SYNC_DOWN: Duration = Duration::from_secs(3600);
    /// Uploading a whole snapshot
    pub const UPLOAD_FULL: Duration = Duration::from_secs(7200);
    /// Uploading the binlog mirror
    pub const UPLOAD_BINLOGS: Duration = Duration::from_secs(3600);
    /// Mirroring the server binlog directory
    pub const RSYNC: Duration = Duration::from_secs(600);
    /// Each of backup, prepare and copy-back
    pub const XTRABACKUP: Duration = Duration::from_secs(3600);
    /// `FLUSH LOGS` after a snapshot
    pub const FLUSH_LOGS: Duration = Duration::from_secs(60);
    /// Recursive ownership change of a data directory
    pub const CHOWN: Duration = Duration::from_secs(600);
    /// One `mysqlbinlog | mysql` pipe
    pub const REPLAY_SEGMENT: Duration = Duration::from_secs(3600);
}

/// A program invocation: no shell, no interpolation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
}

impl CommandSpec {
    /// Start a command with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append `--flag=<path>`
    pub fn path_flag(self, flag: &str, path: &Path) -> Self {
        self.arg(format!("{}={}", flag, path.display()))
    }

    /// Program name or path
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments in order
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Value of a `--flag=value` argument, if present
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        let prefix = format!("{}=", flag);
        self.args.iter().find_map(|arg| arg.strip_prefix(prefix.as_str()))
    }

    /// Exact match against one argument
    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.chars().any(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Captured result of a finished (or timed out) invocation
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal or timed out
    pub exit_code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Wall time until exit or kill
    pub duration: Duration,
    /// The process was killed at its deadline
    pub timed_out: bool,
}

impl CommandOutput {
    /// A successful output carrying `stdout`
    pub fn succeeded(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    /// A failed output carrying `stderr`
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    /// Exit code zero and no timeout
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Human-readable failure detail, with stderr verbatim when there is any
    pub fn failure_detail(&self) -> String {
        if self.timed_out {
            return format!("timed out after {}s", self.duration.as_secs());
        }
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        match self.exit_code {
            Some(code) => format!("exited with status {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Executes external programs
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a single program to completion or until `timeout` elapses.
    ///
    /// `Err` is reserved for failures to start the process; a non-zero exit
    /// or a timeout is an `Ok` output whose [`CommandOutput::success`] is false.
    async fn run(&self, spec: &CommandSpec, timeout: Duration) -> Result<CommandOutput>;

    /// Run `producer | consumer`. Succeeds only if both processes succeed.
    async fn run_piped(
        &self,
        producer: &CommandSpec,
        consumer: &CommandSpec,
        timeout: Duration,
    ) -> Result<CommandOutput>;
}
