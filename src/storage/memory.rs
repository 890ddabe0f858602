// In-memory object store - bucket double for pipeline tests

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use parking_lot::RwLock;
use tokio::fs;
use walkdir::WalkDir;

use super::ObjectStore;
use crate::{Result, VaultError};

#[derive(Debug, Clone)]
struct StoredObject {
    modified: NaiveDateTime,
    data: Vec<u8>,
}

/// In-memory object store that renders listings the way `aws s3 ls` does
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<BTreeMap<String, StoredObject>>>,
    failing_listings: Arc<RwLock<HashSet<String>>>,
    failing_deletes: Arc<RwLock<HashSet<String>>>,
    failing_downloads: Arc<RwLock<HashSet<String>>>,
}

impl MemoryObjectStore {
    /// An empty bucket
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object with an explicit modification time
    pub fn put(&self, key: &str, modified: NaiveDateTime, data: impl Into<Vec<u8>>) {
        self.objects.write().insert(
            key.to_string(),
            StoredObject {
                modified,
                data: data.into(),
            },
        );
    }

    /// Make `list(prefix)` fail
    pub fn fail_listing(&self, prefix: &str) {
        self.failing_listings.write().insert(prefix.to_string());
    }

    /// Make `sync_down(prefix)` fail
    pub fn fail_download(&self, prefix: &str) {
        self.failing_downloads.write().insert(prefix.to_string());
    }

    /// Make deletion of exactly `key` (or prefix) fail
    pub fn fail_delete(&self, key: &str) {
        self.failing_deletes.write().insert(key.to_string());
    }

    /// Every stored key, sorted
    pub fn keys(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }

    /// Whether `key` is stored
    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().contains_key(key)
    }

    fn check_delete(&self, key: &str) -> Result<()> {
        if self.failing_deletes.read().contains(key) {
            return Err(VaultError::Transfer(format!("Failed to delete s3://memory/{}: simulated failure", key)));
        }
        Ok(())
    }
}

fn as_directory(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{}/", prefix)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, prefix: &str) -> Result<String> {
        if self.failing_listings.read().contains(prefix) {
            return Err(VaultError::Transfer(format!("Failed to list s3://memory/{}: simulated failure", prefix)));
        }

        let objects = self.objects.read();
        let mut groups = BTreeSet::new();
        let mut lines = Vec::new();

        for (key, object) in objects.range(prefix.to_string()..) {
            let Some(rest) = key.strip_prefix(prefix) else {
                break;
            };
            match rest.split_once('/') {
                Some((group, _)) => {
                    groups.insert(group.to_string());
                }
                None => lines.push(format!(
                    "{} {:>10} {}",
                    object.modified.format("%Y-%m-%d %H:%M:%S"),
                    object.data.len(),
                    rest
                )),
            }
        }

        let mut text = String::new();
        for group in groups {
            text.push_str(&format!("{:>30} {}/\n", "PRE", group));
        }
        for line in lines {
            text.push_str(&line);
            text.push('\n');
        }
        Ok(text)
    }

    async fn sync_down(&self, remote_prefix: &str, local_dir: &Path) -> Result<()> {
        if self.failing_downloads.read().contains(remote_prefix) {
            return Err(VaultError::Transfer(format!(
                "Failed to download s3://memory/{}: simulated failure",
                remote_prefix
            )));
        }
        let prefix = as_directory(remote_prefix);
        let matching: Vec<(String, Vec<u8>)> = self
            .objects
            .read()
            .iter()
            .filter_map(|(key, object)| {
                key.strip_prefix(prefix.as_str())
                    .map(|rest| (rest.to_string(), object.data.clone()))
            })
            .collect();

        for (relative, data) in matching {
            let target = local_dir.join(&relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(&target, data).await?;
        }
        Ok(())
    }

    async fn sync_up(&self, local_dir: &Path, remote_prefix: &str, _timeout: Duration) -> Result<()> {
        let prefix = as_directory(remote_prefix);
        let mut uploads = Vec::new();
        for entry in WalkDir::new(local_dir).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(local_dir) else {
                continue;
            };
            let key = format!(
                "{}{}",
                prefix,
                relative.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/")
            );
            uploads.push((key, fs::read(entry.path()).await?));
        }

        let now = Local::now().naive_local();
        for (key, data) in uploads {
            self.put(&key, now, data);
        }
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.check_delete(key)?;
        self.objects.write().remove(key);
        Ok(())
    }

    async fn delete_recursive(&self, prefix: &str) -> Result<()> {
        self.check_delete(prefix)?;
        self.objects.write().retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_listing_matches_aws_shape() {
        let store = MemoryObjectStore::new();
        store.put("full/2025-01-01/ibdata1", at(1, 2), "x");
        store.put("full/2025-01-02/ibdata1", at(2, 2), "x");
        store.put("binlogs/binlog.000001", at(3, 12), vec![0u8; 42]);

        let full = store.list("full/").await.unwrap();
        let lines: Vec<&str> = full.lines().map(str::trim).collect();
        assert_eq!(lines, vec!["PRE 2025-01-01/", "PRE 2025-01-02/"]);

        let binlogs = store.list("binlogs/").await.unwrap();
        let fields: Vec<&str> = binlogs.split_whitespace().collect();
        assert_eq!(fields, vec!["2025-01-03", "12:00:00", "42", "binlog.000001"]);
    }

    #[tokio::test]
    async fn test_sync_round_trip_through_directory() {
        let store = MemoryObjectStore::new();
        store.put("full/2025-01-01/app/t1.ibd", at(1, 2), "data");
        let dir = tempfile::tempdir().unwrap();

        store.sync_down("full/2025-01-01", dir.path()).await.unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("app/t1.ibd")).unwrap(), "data");

        store.sync_up(dir.path(), "copy/", Duration::from_secs(1)).await.unwrap();
        assert!(store.contains("copy/app/t1.ibd"));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryObjectStore::new();
        store.put("full/2025-01-01/a", at(1, 2), "x");
        store.fail_listing("full/");
        store.fail_delete("full/2025-01-01/");
        store.fail_download("full/2025-01-01");
        let dir = tempfile::tempdir().unwrap();

        assert!(store.list("full/").await.is_err());
        assert!(store.delete_recursive("full/2025-01-01/").await.is_err());
        assert!(matches!(
            store.sync_down("full/2025-01-01", dir.path()).await,
            Err(VaultError::Transfer(_))
        ));
        assert!(store.sync_down("full/2025-01-01/", dir.path()).await.is_ok());
        assert!(store.contains("full/2025-01-01/a"));
    }
}
