// Remote object storage - S3 through the aws CLI, plus an in-memory store

mod memory;

pub use memory::MemoryObjectStore;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::Config;
use crate::exec::{timeouts, CommandRunner, CommandSpec};
use crate::{Result, VaultError};

/// Operations the pipelines need from the remote store.
///
/// Keys and prefixes are relative to the bucket root (`full/2025-01-10/`).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Directory-style listing of `prefix`, in `aws s3 ls` text format
    async fn list(&self, prefix: &str) -> Result<String>;

    /// Mirror everything below `remote_prefix` into `local_dir`
    async fn sync_down(&self, remote_prefix: &str, local_dir: &Path) -> Result<()>;

    /// Mirror `local_dir` to `remote_prefix`
    async fn sync_up(&self, local_dir: &Path, remote_prefix: &str, timeout: Duration) -> Result<()>;

    /// Delete one object
    async fn delete_object(&self, key: &str) -> Result<()>;

    /// Delete every object below `prefix`
    async fn delete_recursive(&self, prefix: &str) -> Result<()>;
}

/// S3 access through the `aws s3` command line
pub struct AwsCliStore {
    runner: Arc<dyn CommandRunner>,
    bucket: String,
    region: String,
}

impl AwsCliStore {
    /// Store over `s3://<bucket>` in `region`
    pub fn new(runner: Arc<dyn CommandRunner>, bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            runner,
            bucket: bucket.into(),
            region: region.into(),
        }
    }

    /// Build from configuration; fails when no bucket is configured
    pub fn from_config(config: &Config, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        let bucket = config.require_bucket()?;
        Ok(Self::new(runner, bucket, config.s3.region.clone()))
    }

    fn url(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }

    fn s3(&self, subcommand: &str) -> CommandSpec {
        CommandSpec::new("aws").arg("s3").arg(subcommand)
    }

    async fn execute(&self, spec: CommandSpec, timeout: Duration, action: &str) -> Result<String> {
        let spec = spec.arg("--region").arg(self.region.as_str());
        debug!(command = %spec, "Object store request");
        let output = self.runner.run(&spec, timeout).await.map_err(|e| {
            VaultError::Transfer(format!("Failed to {}: {}", action, e))
        })?;
        if !output.success() {
            return Err(VaultError::Transfer(format!(
                "Failed to {}: {}",
                action,
                output.failure_detail()
            )));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl ObjectStore for AwsCliStore {
    async fn list(&self, prefix: &str) -> Result<String> {
        let spec = self.s3("ls").arg(self.url(prefix));
        self.execute(spec, timeouts::LIST, &format!("list {}", self.url(prefix)))
            .await
    }

    async fn sync_down(&self, remote_prefix: &str, local_dir: &Path) -> Result<()> {
        let spec = self
            .s3("sync")
            .arg(self.url(remote_prefix))
            .arg(local_dir.display().to_string());
        self.execute(spec, timeouts::SYNC_DOWN, &format!("download {}", self.url(remote_prefix)))
            .await?;
        info!(remote = %self.url(remote_prefix), local = %local_dir.display(), "Downloaded");
        Ok(())
    }

    async fn sync_up(&self, local_dir: &Path, remote_prefix: &str, timeout: Duration) -> Result<()> {
        let spec = self
            .s3("sync")
            .arg(local_dir.display().to_string())
            .arg(self.url(remote_prefix));
        self.execute(spec, timeout, &format!("upload to {}", self.url(remote_prefix)))
            .await?;
        info!(local = %local_dir.display(), remote = %self.url(remote_prefix), "Uploaded");
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let spec = self.s3("rm").arg(self.url(key));
        self.execute(spec, timeouts::DELETE, &format!("delete {}", self.url(key)))
            .await
            .map(|_| ())
    }

    async fn delete_recursive(&self, prefix: &str) -> Result<()> {
        let spec = self.s3("rm").arg(self.url(prefix)).arg("--recursive");
        self.execute(spec, timeouts::DELETE, &format!("delete {}", self.url(prefix)))
            .await
            .map(|_| ())
    }
}
