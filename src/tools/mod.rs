//! Adapters for the external database tools.
//!
//! Each adapter only knows how to build the right [`CommandSpec`] and how to
//! turn a failed [`CommandOutput`] into a [`VaultError`]. The algorithms
//! themselves live in the tools.

mod credentials;

pub use credentials::CredentialsFile;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::exec::{timeouts, CommandOutput, CommandRunner, CommandSpec};
use crate::{Result, VaultError};

async fn run_tool(
    runner: &dyn CommandRunner,
    spec: &CommandSpec,
    timeout: Duration,
    what: &str,
) -> Result<CommandOutput> {
    debug!(command = %spec, "Running {}", what);
    let output = runner.run(spec, timeout).await?;
    if !output.success() {
        return Err(VaultError::Tool(format!("{} failed: {}", what, output.failure_detail())));
    }
    Ok(output)
}

/// `xtrabackup` hot-backup utility
pub struct HotBackup {
    runner: Arc<dyn CommandRunner>,
}

impl HotBackup {
    /// Wrap a tool runner
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Copy a running server's data files into `target_dir`
    pub async fn backup(&self, credentials: &CredentialsFile, datadir: &Path, target_dir: &Path) -> Result<CommandOutput> {
        let spec = credentials
            .command("xtrabackup")
            .arg("--backup")
            .path_flag("--datadir", datadir)
            .path_flag("--target-dir", target_dir);
        run_tool(self.runner.as_ref(), &spec, timeouts::XTRABACKUP, "XtraBackup").await
    }

    /// Replay redo logs so the copy in `target_dir` is consistent
    pub async fn prepare(&self, target_dir: &Path) -> Result<CommandOutput> {
        let spec = CommandSpec::new("xtrabackup")
            .arg("--prepare")
            .path_flag("--target-dir", target_dir);
        run_tool(self.runner.as_ref(), &spec, timeouts::XTRABACKUP, "XtraBackup prepare").await
    }

    /// Copy a prepared backup into an empty data directory
    pub async fn copy_back(&self, target_dir: &Path, datadir: &Path) -> Result<CommandOutput> {
        let spec = CommandSpec::new("xtrabackup")
            .arg("--copy-back")
            .path_flag("--target-dir", target_dir)
            .path_flag("--datadir", datadir);
        run_tool(self.runner.as_ref(), &spec, timeouts::XTRABACKUP, "XtraBackup copy-back").await
    }
}

/// `mysql` client and `mysqlbinlog` replay
pub struct MysqlClient {
    runner: Arc<dyn CommandRunner>,
}

impl MysqlClient {
    /// Wrap a tool runner
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Close the current binlog so the next archive run picks it up
    pub async fn flush_logs(&self, credentials: &CredentialsFile) -> Result<CommandOutput> {
        let spec = credentials.command("mysql").arg("-e").arg("FLUSH LOGS;");
        run_tool(self.runner.as_ref(), &spec, timeouts::FLUSH_LOGS, "FLUSH LOGS").await
    }

    /// `mysqlbinlog --stop-datetime=<stop> [--database=<db>] <segment> | mysql`
    pub fn replay_commands(
        credentials: &CredentialsFile,
        segment: &Path,
        stop: NaiveDateTime,
        database: Option<&str>,
    ) -> (CommandSpec, CommandSpec) {
        let mut producer = CommandSpec::new("mysqlbinlog")
            .arg(format!("--stop-datetime={}", stop.format("%Y-%m-%d %H:%M:%S")));
        if let Some(db) = database {
            producer = producer.arg(format!("--database={}", db));
        }
        let producer = producer.arg(segment.display().to_string());
        (producer, credentials.command("mysql"))
    }

    /// Apply one binlog segment to the live server, stopping at `stop`
    pub async fn replay_segment(
        &self,
        credentials: &CredentialsFile,
        segment: &Path,
        stop: NaiveDateTime,
        database: Option<&str>,
    ) -> Result<()> {
        let (producer, consumer) = Self::replay_commands(credentials, segment, stop, database);
        debug!(producer = %producer, consumer = %consumer, "Replaying segment");
        let output = self
            .runner
            .run_piped(&producer, &consumer, timeouts::REPLAY_SEGMENT)
            .await
            .map_err(|e| VaultError::Replay(e.to_string()))?;
        if !output.success() {
            return Err(VaultError::Replay(output.failure_detail()));
        }
        Ok(())
    }
}

/// Mirror the server's binlog files into `dest`
pub async fn rsync_binlogs(runner: &dyn CommandRunner, mysql_dir: &Path, dest: &Path) -> Result<CommandOutput> {
    let spec = CommandSpec::new("rsync")
        .args(["-a", "--include=binlog.*", "--exclude=*"])
        .arg(format!("{}/", mysql_dir.display()))
        .arg(format!("{}/", dest.display()));
    let output = runner.run(&spec, timeouts::RSYNC).await?;
    if !output.success() {
        return Err(VaultError::Transfer(format!("Failed to sync binlogs: {}", output.failure_detail())));
    }
    Ok(output)
}

/// `chown -R <owner>:<owner> <dir>`
pub async fn chown_recursive(runner: &dyn CommandRunner, owner: &str, dir: &Path) -> Result<CommandOutput> {
    let spec = CommandSpec::new("chown")
        .arg("-R")
        .arg(format!("{}:{}", owner, owner))
        .arg(dir.display().to_string());
    run_tool(runner, &spec, timeouts::CHOWN, "chown").await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::exec::ScriptedRunner;
    use chrono::NaiveDate;

    fn credentials() -> CredentialsFile {
        let config = Config::from_lookup(|key| (key == "MYSQL_PASS").then(|| "s3cr3t".to_string())).unwrap();
        CredentialsFile::create(&config.mysql).unwrap()
    }

    #[test]
    fn test_replay_commands() {
        let creds = credentials();
        let stop = NaiveDate::from_ymd_opt(2025, 1, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();

        let (producer, consumer) =
            MysqlClient::replay_commands(&creds, Path::new("/w/binlogs/binlog.000002"), stop, Some("app"));

        assert_eq!(
            producer.get_args(),
            &[
                "--stop-datetime=2025-01-10 12:00:00".to_string(),
                "--database=app".to_string(),
                "/w/binlogs/binlog.000002".to_string(),
            ]
        );
        assert_eq!(consumer.program(), "mysql");
        assert!(!consumer.to_string().contains("s3cr3t"));

        let (producer, _) = MysqlClient::replay_commands(&creds, Path::new("b.1"), stop, None);
        assert!(producer.flag_value("--database").is_none());
    }

    #[tokio::test]
    async fn test_tool_failure_carries_stderr() {
        let runner = ScriptedRunner::new();
        runner.fail("xtrabackup", Some("--prepare"), "InnoDB: corrupted page");
        let tool = HotBackup::new(Arc::new(runner.clone()));

        let err = tool.prepare(Path::new("/w/full")).await.unwrap_err();

        assert!(matches!(err, VaultError::Tool(_)));
        assert!(err.to_string().contains("InnoDB: corrupted page"));
    }

    #[tokio::test]
    async fn test_backup_passes_credentials_file_first() {
        let runner = ScriptedRunner::new();
        let tool = HotBackup::new(Arc::new(runner.clone()));
        let creds = credentials();

        tool.backup(&creds, Path::new("/var/lib/mysql"), Path::new("/b/full/2025-01-10"))
            .await
            .unwrap();

        let call = &runner.invocations_of("xtrabackup")[0];
        assert!(call.get_args()[0].starts_with("--defaults-extra-file="));
        assert!(call.has_arg("--backup"));
        assert_eq!(call.flag_value("--target-dir"), Some("/b/full/2025-01-10"));
        assert!(!call.to_string().contains("s3cr3t"));
    }

    #[tokio::test]
    async fn test_replay_failure_is_replay_error() {
        let runner = ScriptedRunner::new();
        runner.fail("mysql", None, "ERROR 1062 (23000): Duplicate entry");
        let client = MysqlClient::new(Arc::new(runner));
        let stop = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap().and_hms_opt(0, 0, 0).unwrap();

        let err = client
            .replay_segment(&credentials(), Path::new("binlog.000001"), stop, None)
            .await
            .unwrap_err();

        assert!(matches!(err, VaultError::Replay(ref msg) if msg.contains("Duplicate entry")));
    }
}
