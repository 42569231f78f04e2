//! Durable Store
//!
//! Persistent key/value mirror of a named cache. The durability unit is
//! the cache name: a snapshot save atomically replaces everything
//! persisted under that name, while single-entry upsert/delete never
//! touch unrelated entries. Operations against one name must not block
//! operations against a different name.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use crate::error::Result;

/// Persistent backend for write-through and warm start
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Read all persisted pairs for `name`; empty when nothing persisted
    async fn load_snapshot(&self, name: &str) -> Result<Vec<(String, Bytes)>>;

    /// Atomically replace the persisted set for `name` with `entries`
    async fn save_snapshot(&self, name: &str, entries: Vec<(String, Bytes)>) -> Result<()>;

    /// Persist one entry immediately
    async fn upsert_entry(&self, name: &str, key: &str, value: Bytes) -> Result<()>;

    /// Remove one persisted entry; no-op when nothing is persisted under `key`
    async fn delete_entry(&self, name: &str, key: &str) -> Result<()>;

    /// Operation counters
    fn stats(&self) -> DurableStoreStats;
}

/// Durable store operation counters
#[derive(Debug, Clone, Default)]
pub struct DurableStoreStats {
    /// Whole-cache snapshot reads
    pub snapshot_loads: u64,
    /// Whole-cache snapshot replacements
    pub snapshot_saves: u64,
    /// Single-entry writes
    pub upserts: u64,
    /// Single-entry deletes
    pub deletes: u64,
}

/// In-memory durable store for testing and embedding
pub struct InMemoryDurableStore {
    /// cache name -> key -> value
    storage: DashMap<String, DashMap<String, Bytes>>,
    snapshot_loads: AtomicU64,
    snapshot_saves: AtomicU64,
    upserts: AtomicU64,
    deletes: AtomicU64,
}

impl Default for InMemoryDurableStore {
    fn default() -> Self {
        Self {
            storage: DashMap::new(),
            snapshot_loads: AtomicU64::new(0),
            snapshot_saves: AtomicU64::new(0),
            upserts: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries persisted for `name`.
    pub fn persisted_len(&self, name: &str) -> usize {
        self.storage.get(name).map(|m| m.len()).unwrap_or(0)
    }
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn load_snapshot(&self, name: &str) -> Result<Vec<(String, Bytes)>> {
        self.snapshot_loads.fetch_add(1, Ordering::Relaxed);

        match self.storage.get(name) {
            Some(entries) => Ok(entries
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect()),
            None => Ok(Vec::new()),
        }
    }

    async fn save_snapshot(&self, name: &str, entries: Vec<(String, Bytes)>) -> Result<()> {
        self.snapshot_saves.fetch_add(1, Ordering::Relaxed);

        let replacement: DashMap<String, Bytes> = entries.into_iter().collect();
        self.storage.insert(name.to_string(), replacement);
        Ok(())
    }

    async fn upsert_entry(&self, name: &str, key: &str, value: Bytes) -> Result<()> {
        self.upserts.fetch_add(1, Ordering::Relaxed);

        self.storage
            .entry(name.to_string())
            .or_insert_with(DashMap::new)
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete_entry(&self, name: &str, key: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::Relaxed);

        if let Some(entries) = self.storage.get(name) {
            entries.remove(key);
        }
        Ok(())
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
