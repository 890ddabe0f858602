//! Configuration loaded from the process environment (and an optional `.env` file).
//!
//! All values are resolved once at startup into a [`Config`]. Empty variables
//! are treated as unset so that a blank line in `.env` falls back to the default.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use tracing::debug;

use crate::{Result, VaultError};

/// Default number of days local artifacts are kept
pub const DEFAULT_RETENTION_DAYS_LOCAL: u32 = 3;

/// Default number of days remote artifacts are kept
pub const DEFAULT_RETENTION_DAYS_CLOUD: u32 = 90;

/// Connection and filesystem settings for the MySQL server
#[derive(Debug)]
pub struct MysqlConfig {
    /// Account used for backups, flushes and replay
    pub user: String,
    /// Never logged; only written to the owner-only option file
    pub password: SecretString,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Server data directory, used by `xtrabackup --backup` and binlog rsync
    pub data_dir: PathBuf,
    /// Account that must own a materialized data directory
    pub service_user: String,
}

/// Bucket identity for the remote object store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    /// `AWS_S3_BUCKET`; every command refuses to run without it
    pub bucket: Option<String>,
    /// Region passed to every `aws` call
    pub region: String,
}

/// Retention windows, in whole days
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionConfig {
    /// Days local snapshots, binlogs and log archives are kept
    pub local_days: u32,
    /// Days remote snapshots and binlogs are kept
    pub cloud_days: u32,
}

/// Fully resolved runtime configuration
#[derive(Debug)]
pub struct Config {
    /// Server connection and data directory
    pub mysql: MysqlConfig,
    /// Bucket and region
    pub s3: S3Config,
    /// Retention windows
    pub retention: RetentionConfig,
    /// Restrict restores to a single schema
    pub target_database: Option<String>,
    /// Root for local backups, logs, the restore workspace and the run lock
    pub storage_root: PathBuf,
    /// Default tracing filter when `RUST_LOG` is not set
    pub log_filter: String,
}

impl Config {
    /// Load `.env` (if present) and then read the process environment
    pub fn load(env_file: Option<&Path>) -> Result<Self> {
        match env_file {
            Some(path) => {
                dotenvy::from_path(path).map_err(|e| {
                    VaultError::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
            }
            None => {
                if let Ok(path) = dotenvy::dotenv() {
                    debug!(path = %path.display(), "Loaded environment file");
                }
            }
        }
        Self::from_env()
    }

    /// Read the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let port = match get("MYSQL_PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                VaultError::Config(format!("MYSQL_PORT must be a port number, got '{}'", raw))
            })?,
            None => 3306,
        };

        let mysql = MysqlConfig {
            user: get("MYSQL_USER").unwrap_or_else(|| "root".to_string()),
            password: SecretString::from(get("MYSQL_PASS").unwrap_or_default()),
            host: get("MYSQL_HOST").unwrap_or_else(|| "localhost".to_string()),
            port,
            data_dir: PathBuf::from(get("MYSQL_DIR").unwrap_or_else(|| "/var/lib/mysql".to_string())),
            service_user: get("MYSQL_SERVICE_USER").unwrap_or_else(|| "mysql".to_string()),
        };

        let s3 = S3Config {
            bucket: get("AWS_S3_BUCKET")
                .map(|raw| trim_quotes(&raw).to_string())
                .filter(|bucket| !bucket.is_empty()),
            region: get("AWS_S3_REGION")
                .or_else(|| get("AWS_REGION"))
                .unwrap_or_else(|| "us-east-1".to_string()),
        };

        let retention = RetentionConfig {
            local_days: parse_days(get("RETENTION_DAYS_FOR_LOCAL"), "RETENTION_DAYS_FOR_LOCAL", DEFAULT_RETENTION_DAYS_LOCAL)?,
            cloud_days: parse_days(get("RETENTION_DAYS_FOR_CLOUD"), "RETENTION_DAYS_FOR_CLOUD", DEFAULT_RETENTION_DAYS_CLOUD)?,
        };

        Ok(Self {
            mysql,
            s3,
            retention,
            target_database: get("TARGET_DATABASE").map(|db| db.trim().to_string()),
            storage_root: PathBuf::from(get("DBVAULT_STORAGE").unwrap_or_else(|| "./storage".to_string())),
            log_filter: get("DBVAULT_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Override the storage root
    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = root.into();
        self
    }

    /// Override the bucket name
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.s3.bucket = Some(bucket.into());
        self
    }

    /// Override the single-schema restore target
    pub fn with_target_database(mut self, database: Option<String>) -> Self {
        self.target_database = database;
        self
    }

    /// Override the retention windows
    pub fn with_retention(mut self, local_days: u32, cloud_days: u32) -> Self {
        self.retention = RetentionConfig { local_days, cloud_days };
        self
    }

    /// The configured bucket, or a validation error when it is missing
    pub fn require_bucket(&self) -> Result<&str> {
        self.s3
            .bucket
            .as_deref()
            .ok_or_else(|| VaultError::Validation("AWS_S3_BUCKET is not set".to_string()))
    }

    /// `<storage>/backups/full`
    pub fn full_backups_dir(&self) -> PathBuf {
        self.storage_root.join("backups").join("full")
    }

    /// `<storage>/backups/binlogs`
    pub fn binlog_backups_dir(&self) -> PathBuf {
        self.storage_root.join("backups").join("binlogs")
    }

    /// `<storage>/logs`
    pub fn logs_dir(&self) -> PathBuf {
        self.storage_root.join("logs")
    }

    /// Fixed location of the restore workspace
    pub fn restore_dir(&self) -> PathBuf {
        self.storage_root.join("restored-databases")
    }

    /// Lock file guarding the restore workspace
    pub fn restore_lock_path(&self) -> PathBuf {
        self.storage_root.join("restore.lock")
    }
}

fn trim_quotes(raw: &str) -> &str {
    raw.trim().trim_matches(|c| c == '\'' || c == '"')
}

fn parse_days(raw: Option<String>, key: &str, default: u32) -> Result<u32> {
    match raw {
        Some(value) => value.trim().parse::<u32>().map_err(|_| {
            VaultError::Config(format!("{} must be a whole number of days, got '{}'", key, value))
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.mysql.user, "root");
        assert_eq!(config.mysql.host, "localhost");
        assert_eq!(config.mysql.port, 3306);
        assert_eq!(config.mysql.service_user, "mysql");
        assert_eq!(config.s3.bucket, None);
        assert_eq!(config.s3.region, "us-east-1");
        assert_eq!(config.retention.local_days, 3);
        assert_eq!(config.retention.cloud_days, 90);
        assert!(config.target_database.is_none());
        assert!(config.require_bucket().is_err());
    }

    #[test]
    fn test_bucket_quotes_trimmed_and_region_fallback() {
        let config = Config::from_lookup(lookup(&[
            ("AWS_S3_BUCKET", "'my-backups'"),
            ("AWS_REGION", "eu-west-1"),
        ]))
        .unwrap();

        assert_eq!(config.require_bucket().unwrap(), "my-backups");
        assert_eq!(config.s3.region, "eu-west-1");

        let config = Config::from_lookup(lookup(&[
            ("AWS_S3_BUCKET", "\"\""),
            ("AWS_S3_REGION", "ap-south-1"),
            ("AWS_REGION", "eu-west-1"),
        ]))
        .unwrap();
        assert_eq!(config.s3.bucket, None);
        assert_eq!(config.s3.region, "ap-south-1");
    }

    #[test]
    fn test_empty_values_fall_back() {
        let config = Config::from_lookup(lookup(&[
            ("TARGET_DATABASE", ""),
            ("RETENTION_DAYS_FOR_LOCAL", "  "),
        ]))
        .unwrap();

        assert!(config.target_database.is_none());
        assert_eq!(config.retention.local_days, 3);
    }

    #[test]
    fn test_malformed_numbers_rejected() {
        let err = Config::from_lookup(lookup(&[("RETENTION_DAYS_FOR_CLOUD", "ninety")])).unwrap_err();
        assert!(matches!(err, VaultError::Config(_)));

        let err = Config::from_lookup(lookup(&[("MYSQL_PORT", "70000")])).unwrap_err();
        assert!(matches!(err, VaultError::Config(_)));
    }

    #[test]
    fn test_password_is_redacted_in_debug() {
        let config = Config::from_lookup(lookup(&[("MYSQL_PASS", "hunter2")])).unwrap();

        assert_eq!(config.mysql.password.expose_secret(), "hunter2");
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn test_storage_layout() {
        let config = Config::from_lookup(lookup(&[("DBVAULT_STORAGE", "/srv/vault")])).unwrap();

        assert_eq!(config.full_backups_dir(), PathBuf::from("/srv/vault/backups/full"));
        assert_eq!(config.binlog_backups_dir(), PathBuf::from("/srv/vault/backups/binlogs"));
        assert_eq!(config.logs_dir(), PathBuf::from("/srv/vault/logs"));
        assert_eq!(config.restore_dir(), PathBuf::from("/srv/vault/restored-databases"));
    }
}
