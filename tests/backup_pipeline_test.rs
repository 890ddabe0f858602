// Integration tests for the full backup and binlog archival pipelines

use chrono::NaiveDate;
use dbvault::backup::{BackupKind, BinlogArchiver, FullBackupPipeline};
use dbvault::config::Config;
use dbvault::exec::ScriptedRunner;
use dbvault::storage::MemoryObjectStore;
use dbvault::VaultError;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn config(root: &Path) -> Arc<Config> {
    let lookup = |key: &str| match key {
        "MYSQL_USER" => Some("backup".to_string()),
        "MYSQL_PASS" => Some("hunter2".to_string()),
        "MYSQL_DIR" => Some("/var/lib/mysql".to_string()),
        _ => None,
    };
    Arc::new(
        Config::from_lookup(lookup)
            .expect("configuration")
            .with_storage_root(root)
            .with_bucket("vault"),
    )
}

/// Runner whose `xtrabackup --backup` writes a couple of files into the target dir
fn snapshotting_runner() -> ScriptedRunner {
    let runner = ScriptedRunner::new();
    runner.on_run("xtrabackup", |spec| {
        if let Some(target) = spec.flag_value("--target-dir") {
            let target = PathBuf::from(target);
            fs::write(target.join("xtrabackup_checkpoints"), "backup_type = full-backuped").unwrap();
            fs::create_dir_all(target.join("app")).unwrap();
            fs::write(target.join("app").join("orders.ibd"), "pages").unwrap();
        }
    });
    runner
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 10).unwrap()
}

#[tokio::test]
async fn test_full_backup_snapshots_flushes_and_uploads() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let runner = snapshotting_runner();
    let store = MemoryObjectStore::new();
    let pipeline = FullBackupPipeline::new(config.clone(), Arc::new(store.clone()), Arc::new(runner.clone()));

    let report = pipeline.run_for(day()).await.expect("backup should succeed");

    assert_eq!(report.kind, BackupKind::Full);
    assert_eq!(report.remote_prefix, "full/2025-01-10");
    assert_eq!(report.local_dir, config.full_backups_dir().join("2025-01-10"));
    assert_eq!(
        store.keys(),
        vec![
            "full/2025-01-10/app/orders.ibd".to_string(),
            "full/2025-01-10/xtrabackup_checkpoints".to_string(),
        ]
    );

    let programs: Vec<String> = runner
        .invocations()
        .iter()
        .map(|r| r.spec.program().to_string())
        .collect();
    assert_eq!(programs, vec!["xtrabackup", "mysql"]);

    let backup = &runner.invocations_of("xtrabackup")[0];
    assert!(backup.get_args()[0].starts_with("--defaults-extra-file="));
    assert!(backup.has_arg("--backup"));
    assert_eq!(backup.flag_value("--datadir"), Some("/var/lib/mysql"));

    let flush = &runner.invocations_of("mysql")[0];
    assert!(flush.has_arg("FLUSH LOGS;"));
}

#[tokio::test]
async fn test_passwords_never_reach_the_command_line() {
    let dir = tempfile::tempdir().unwrap();
    let runner = snapshotting_runner();
    let pipeline = FullBackupPipeline::new(
        config(dir.path()),
        Arc::new(MemoryObjectStore::new()),
        Arc::new(runner.clone()),
    );

    pipeline.run_for(day()).await.expect("backup should succeed");

    for record in runner.invocations() {
        let line = record.spec.to_string();
        assert!(!line.contains("hunter2"), "secret leaked into {}", line);
        assert!(!line.contains("--password"), "password flag in {}", line);
    }
}

#[tokio::test]
async fn test_rerun_replaces_same_day_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let stale = config.full_backups_dir().join("2025-01-10").join("stale.ibd");
    fs::create_dir_all(stale.parent().unwrap()).unwrap();
    fs::write(&stale, "old").unwrap();

    let pipeline = FullBackupPipeline::new(
        config,
        Arc::new(MemoryObjectStore::new()),
        Arc::new(snapshotting_runner()),
    );
    pipeline.run_for(day()).await.expect("backup should succeed");

    assert!(!stale.exists());
}

#[tokio::test]
async fn test_flush_failure_aborts_before_upload() {
    let dir = tempfile::tempdir().unwrap();
    let runner = snapshotting_runner();
    runner.fail("mysql", Some("FLUSH LOGS"), "ERROR 2002 (HY000): Can't connect to local MySQL server");
    let store = MemoryObjectStore::new();
    let pipeline = FullBackupPipeline::new(config(dir.path()), Arc::new(store.clone()), Arc::new(runner));

    let err = pipeline.run_for(day()).await.expect_err("flush failure aborts");

    assert!(matches!(err, VaultError::Tool(ref m) if m.contains("Can't connect")));
    assert!(store.keys().is_empty());
}

#[tokio::test]
async fn test_binlog_archive_uploads_segments() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let binlog_dir = config.binlog_backups_dir();
    let runner = ScriptedRunner::new();
    runner.on_run("rsync", move |_| {
        fs::write(binlog_dir.join("binlog.000041"), "events").unwrap();
        fs::write(binlog_dir.join("binlog.000042"), "events").unwrap();
        fs::write(binlog_dir.join("binlog.index"), "./binlog.000041\n./binlog.000042\n").unwrap();
    });
    let store = MemoryObjectStore::new();
    let archiver = BinlogArchiver::new(config.clone(), Arc::new(store.clone()), Arc::new(runner.clone()));

    let report = archiver.run().await.expect("archival should succeed");

    assert_eq!(report.remote_prefix, "binlogs/");
    assert!(store.contains("binlogs/binlog.000041"));
    assert!(store.contains("binlogs/binlog.000042"));

    let rsync = &runner.invocations_of("rsync")[0];
    assert_eq!(rsync.get_args().last().unwrap(), &format!("{}/", config.binlog_backups_dir().display()));
    assert_eq!(rsync.get_args()[rsync.get_args().len() - 2], "/var/lib/mysql/");
}
