//! Filesystem Durable Store
//!
//! One directory per cache name under a root, one file per entry. Cache
//! names and entry keys are percent-encoded and suffixed, so arbitrary
//! strings (separators, `..`, unicode) can never escape the store tree.
//! Snapshot replacement builds a fresh directory and renames it over the
//! old one; single-entry writes go through a temp file + rename. A
//! per-name async mutex serializes same-name operations without blocking
//! other names.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::warn;

use super::durable::{DurableStore, DurableStoreStats};
use crate::error::Result;

const CACHE_DIR_SUFFIX: &str = ".cache";
const ENTRY_SUFFIX: &str = ".bin";

/// Durable store persisting each cache as a directory of entry files
pub struct FsDurableStore {
    root: PathBuf,
    /// Per-cache-name serialization
    locks: DashMap<String, Arc<Mutex<()>>>,
    snapshot_loads: AtomicU64,
    snapshot_saves: AtomicU64,
    upserts: AtomicU64,
    deletes: AtomicU64,
}

impl FsDurableStore {
    /// Creates a store rooted at `root`. The directory is created on
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: DashMap::new(),
            snapshot_loads: AtomicU64::new(0),
            snapshot_saves: AtomicU64::new(0),
            upserts: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cache_dir(&self, name: &str) -> PathBuf {
        self.root
            .join(format!("{}{}", urlencoding::encode(name), CACHE_DIR_SUFFIX))
    }

    fn entry_file(key: &str) -> String {
        format!("{}{}", urlencoding::encode(key), ENTRY_SUFFIX)
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.get(name) {
            return lock.value().clone();
        }
        self.locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }
}

/// remove_dir_all that treats a missing directory as already done
async fn remove_dir_if_present(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl DurableStore for FsDurableStore {
    async fn load_snapshot(&self, name: &str) -> Result<Vec<(String, Bytes)>> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;
        self.snapshot_loads.fetch_add(1, Ordering::Relaxed);

        let dir = self.cache_dir(name);
        let mut reader = match fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(dirent) = reader.next_entry().await? {
            let file_name = dirent.file_name();
            let file_name = file_name.to_string_lossy();
            let stem = match file_name.strip_suffix(ENTRY_SUFFIX) {
                Some(stem) => stem,
                // Leftover temp files and foreign files are not entries.
                None => continue,
            };
            let key = match urlencoding::decode(stem) {
                Ok(key) => key.into_owned(),
                Err(_) => {
                    warn!(
                        cache = name,
                        file = %file_name,
                        "Skipping entry with undecodable file name"
                    );
                    continue;
                }
            };
            let data = fs::read(dirent.path()).await?;
            entries.push((key, Bytes::from(data)));
        }
        Ok(entries)
    }

    async fn save_snapshot(&self, name: &str, entries: Vec<(String, Bytes)>) -> Result<()> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;
        self.snapshot_saves.fetch_add(1, Ordering::Relaxed);

        let dir = self.cache_dir(name);
        let tmp = self
            .root
            .join(format!("{}{}.tmp", urlencoding::encode(name), CACHE_DIR_SUFFIX));

        remove_dir_if_present(&tmp).await?;
        fs::create_dir_all(&tmp).await?;
        for (key, value) in &entries {
            fs::write(tmp.join(Self::entry_file(key)), value).await?;
        }

        // The rename is the commit point for the replacement.
        remove_dir_if_present(&dir).await?;
        fs::rename(&tmp, &dir).await?;
        Ok(())
    }

    async fn upsert_entry(&self, name: &str, key: &str, value: Bytes) -> Result<()> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;
        self.upserts.fetch_add(1, Ordering::Relaxed);

        let dir = self.cache_dir(name);
        fs::create_dir_all(&dir).await?;

        let tmp = dir.join(format!("{}{}.tmp", urlencoding::encode(key), ENTRY_SUFFIX));
        fs::write(&tmp, &value).await?;
        fs::rename(&tmp, dir.join(Self::entry_file(key))).await?;
        Ok(())
    }

    async fn delete_entry(&self, name: &str, key: &str) -> Result<()> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;
        self.deletes.fetch_add(1, Ordering::Relaxed);

        match fs::remove_file(self.cache_dir(name).join(Self::entry_file(key))).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn stats(&self) -> DurableStoreStats {
        DurableStoreStats {
            snapshot_loads: self.snapshot_loads.load(Ordering::Relaxed),
            snapshot_saves: self.snapshot_saves.load(Ordering::Relaxed),
            upserts: self.upserts.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
