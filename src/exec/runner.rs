//! Command execution on top of `tokio::process`.

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::{CommandOutput, CommandRunner, CommandSpec};
use crate::{Result, VaultError};

/// Output beyond this many bytes per stream is dropped
const MAX_OUTPUT_SIZE: usize = 4 * 1024 * 1024;

/// Runs programs as child processes of the current process.
///
/// Children inherit the environment (the `aws` CLI reads its credentials from
/// it), get a null stdin, and are killed if the timeout elapses.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// A runner that spawns real processes
    pub fn new() -> Self {
        Self
    }

    fn command(spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(spec.program());
        cmd.args(spec.get_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawn(mut cmd: Command, spec: &CommandSpec) -> Result<Child> {
        cmd.spawn().map_err(|e| {
            VaultError::Tool(format!("Failed to spawn {}: {}", spec.program(), e))
        })
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec, timeout: Duration) -> Result<CommandOutput> {
        debug!(command = %spec, timeout_secs = timeout.as_secs(), "Executing command");
        let start = Instant::now();
        let mut child = Self::spawn(Self::command(spec), spec)?;

        let result = tokio::time::timeout(timeout, collect(&mut child)).await;
        let duration = start.elapsed();

        match result {
            Ok((stdout, stderr, status)) => Ok(CommandOutput {
                exit_code: exit_code(status),
                stdout: truncate_output(&stdout),
                stderr: truncate_output(&stderr),
                duration,
                timed_out: false,
            }),
            Err(_) => {
                warn!(command = %spec, timeout_secs = timeout.as_secs(), "Command timed out");
                let _ = child.kill().await;
                Ok(timed_out(duration))
            }
        }
    }

    async fn run_piped(
        &self,
        producer: &CommandSpec,
        consumer: &CommandSpec,
        timeout: Duration,
    ) -> Result<CommandOutput> {
        debug!(producer = %producer, consumer = %consumer, "Executing pipeline");
        let start = Instant::now();

        let mut upstream = Self::spawn(Self::command(producer), producer)?;
        let mut downstream_cmd = Self::command(consumer);
        downstream_cmd.stdin(Stdio::piped());
        let mut downstream = Self::spawn(downstream_cmd, consumer)?;

        let mut pipe_out = upstream
            .stdout
            .take()
            .ok_or_else(|| VaultError::Tool(format!("{} has no stdout", producer.program())))?;
        let mut pipe_in = downstream
            .stdin
            .take()
            .ok_or_else(|| VaultError::Tool(format!("{} has no stdin", consumer.program())))?;

        let pump = async move {
            // A consumer that exits early closes the pipe; its exit status decides.
            let _ = tokio::io::copy(&mut pipe_out, &mut pipe_in).await;
            let _ = pipe_in.shutdown().await;
        };

        let result = tokio::time::timeout(timeout, async {
            let ((), up, down) = tokio::join!(pump, collect(&mut upstream), collect(&mut downstream));
            (up, down)
        })
        .await;
        let duration = start.elapsed();

        match result {
            Ok(((_, up_err, up_status), (down_out, down_err, down_status))) => {
                let up_code = exit_code(up_status);
                let down_code = exit_code(down_status);
                let exit_code = match (up_code, down_code) {
                    (Some(0), code) => code,
                    (code, _) => code,
                };

                let mut stderr = truncate_output(&up_err);
                let down_err = truncate_output(&down_err);
                if !down_err.is_empty() {
                    if !stderr.is_empty() {
                        stderr.push('\n');
                    }
                    stderr.push_str(&down_err);
                }

                Ok(CommandOutput {
                    exit_code,
                    stdout: truncate_output(&down_out),
                    stderr,
                    duration,
                    timed_out: false,
                })
            }
            Err(_) => {
                warn!(producer = %producer, consumer = %consumer, "Pipeline timed out");
                let _ = upstream.kill().await;
                let _ = downstream.kill().await;
                Ok(timed_out(duration))
            }
        }
    }
}

/// Drain whatever output pipes the child still owns, then wait for it
async fn collect(child: &mut Child) -> (Vec<u8>, Vec<u8>, std::io::Result<ExitStatus>) {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let out = child.stdout.take();
    let err = child.stderr.take();

    let read_out = async {
        if let Some(mut out) = out {
            let _ = out.read_to_end(&mut stdout).await;
        }
    };
    let read_err = async {
        if let Some(mut err) = err {
            let _ = err.read_to_end(&mut stderr).await;
        }
    };
    tokio::join!(read_out, read_err);

    let status = child.wait().await;
    (stdout, stderr, status)
}

fn exit_code(status: std::io::Result<ExitStatus>) -> Option<i32> {
    status.ok().and_then(|s| s.code())
}

fn timed_out(duration: Duration) -> CommandOutput {
    CommandOutput {
        exit_code: None,
        stdout: String::new(),
        stderr: String::new(),
        duration,
        timed_out: true,
    }
}

fn truncate_output(bytes: &[u8]) -> String {
    let slice = if bytes.len() > MAX_OUTPUT_SIZE {
        &bytes[..MAX_OUTPUT_SIZE]
    } else {
        bytes
    };
    String::from_utf8_lossy(slice).into_owned()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn test_run_captures_streams_and_exit_code() {
        let runner = ProcessRunner::new();
        let output = runner
            .run(&sh("echo out; echo err 1>&2; exit 3"), Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert!(!output.success());
        assert_eq!(output.failure_detail(), "err");
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let runner = ProcessRunner::new();
        let output = runner
            .run(&sh("sleep 5"), Duration::from_millis(100))
            .await
            .unwrap();

        assert!(output.timed_out);
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_error() {
        let runner = ProcessRunner::new();
        let result = runner
            .run(&CommandSpec::new("/nonexistent/dbvault-tool"), Duration::from_secs(1))
            .await;

        assert!(matches!(result, Err(VaultError::Tool(_))));
    }

    #[tokio::test]
    async fn test_run_piped_feeds_consumer() {
        let runner = ProcessRunner::new();
        let output = runner
            .run_piped(&sh("printf 'a\\nb\\nc\\n'"), &CommandSpec::new("wc").arg("-l"), Duration::from_secs(10))
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout.trim(), "3");
    }

    #[tokio::test]
    async fn test_run_piped_fails_when_either_side_fails() {
        let runner = ProcessRunner::new();

        let output = runner
            .run_piped(&sh("echo bad 1>&2; exit 1"), &CommandSpec::new("cat"), Duration::from_secs(10))
            .await
            .unwrap();
        assert!(!output.success());
        assert!(output.stderr.contains("bad"));

        let output = runner
            .run_piped(&sh("echo data"), &sh("cat >/dev/null; echo sink 1>&2; exit 2"), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(output.exit_code, Some(2));
        assert!(output.stderr.contains("sink"));
    }
}
