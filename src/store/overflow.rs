//! Overflow Store
//!
//! Secondary per-cache store for spilling entries out of the primary
//! in-memory structure and restoring them later. `spill` replaces
//! whatever was previously spilled for the name; `restore` hands the
//! entries back to the manager, which inserts them additively. The
//! compressed variant keeps spilled values LZ4-compacted so parked data
//! costs a fraction of its live footprint.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use crate::error::{Error, Result};

/// Values below this size are not worth compressing
const DEFAULT_MIN_COMPRESS_SIZE: usize = 64;

/// Secondary store for spilled cache contents
#[async_trait]
pub trait OverflowStore: Send + Sync {
    /// Store `entries` for `name`, replacing any prior spilled contents
    async fn spill(&self, name: &str, entries: Vec<(String, Bytes)>) -> Result<()>;

    /// Return all entries spilled for `name`; empty when nothing spilled
    async fn restore(&self, name: &str) -> Result<Vec<(String, Bytes)>>;

    /// Operation counters and storage gauges
    fn stats(&self) -> OverflowStoreStats;
}

/// Overflow store counters
#[derive(Debug, Clone, Default)]
pub struct OverflowStoreStats {
    pub spills: u64,
    pub restores: u64,
    /// Entries currently parked across all names
    pub stored_entries: u64,
    /// Bytes currently parked, after compression where applied
    pub stored_bytes: u64,
}

/// Plain in-memory overflow store
#[derive(Default)]
pub struct InMemoryOverflowStore {
    storage: DashMap<String, Vec<(String, Bytes)>>,
    spills: AtomicU64,
    restores: AtomicU64,
}

impl InMemoryOverflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OverflowStore for InMemoryOverflowStore {
    async fn spill(&self, name: &str, entries: Vec<(String, Bytes)>) -> Result<()> {
        self.spills.fetch_add(1, Ordering::Relaxed);
        self.storage.insert(name.to_string(), entries);
        Ok(())
    }

    async fn restore(&self, name: &str) -> Result<Vec<(String, Bytes)>> {
        self.restores.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .storage
            .get(name)
            .map(|entries| entries.clone())
            .unwrap_or_default())
    }

    fn stats(&self) -> OverflowStoreStats {
        let mut stored_entries = 0;
        let mut stored_bytes = 0;
        for bucket in self.storage.iter() {
            stored_entries += bucket.value().len() as u64;
            stored_bytes += bucket
                .value()
                .iter()
                .map(|(_, v)| v.len() as u64)
                .sum::<u64>();
        }
        OverflowStoreStats {
            spills: self.spills.load(Ordering::Relaxed),
            restores: self.restores.load(Ordering::Relaxed),
            stored_entries,
            stored_bytes,
        }
    }
}

/// One parked value, compressed when that actually saved space
struct SpilledValue {
    compressed: bool,
    data: Bytes,
}

/// Overflow store that LZ4-compresses spilled values
pub struct CompressedOverflowStore {
    storage: DashMap<String, Vec<(String, SpilledValue)>>,
    min_compress_size: usize,
    spills: AtomicU64,
    restores: AtomicU64,
}

impl Default for CompressedOverflowStore {
    fn default() -> Self {
        Self {
            storage: DashMap::new(),
            min_compress_size: DEFAULT_MIN_COMPRESS_SIZE,
            spills: AtomicU64::new(0),
            restores: AtomicU64::new(0),
        }
    }
}

impl CompressedOverflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the minimum value size that triggers compression.
    pub fn with_min_size(min_compress_size: usize) -> Self {
        Self {
            min_compress_size,
            ..Self::default()
        }
    }

    fn encode(&self, value: &Bytes) -> Result<SpilledValue> {
        if value.len() < self.min_compress_size {
            return Ok(SpilledValue {
                compressed: false,
                data: value.clone(),
            });
        }

        let compressed =
            lz4::block::compress(value, Some(lz4::block::CompressionMode::DEFAULT), true)
                .map_err(|e| Error::CompressionFailed(e.to_string()))?;

        // Keep the raw bytes when compression does not shrink them.
        if compressed.len() >= value.len() {
            Ok(SpilledValue {
                compressed: false,
                data: value.clone(),
            })
        } else {
            Ok(SpilledValue {
                compressed: true,
                data: Bytes::from(compressed),
            })
        }
    }

    fn decode(value: &SpilledValue) -> Result<Bytes> {
        if !value.compressed {
            return Ok(value.data.clone());
        }
        lz4::block::decompress(&value.data, None)
            .map(Bytes::from)
            .map_err(|e| Error::DecompressionFailed(e.to_string()))
    }
}

#[async_trait]
impl OverflowStore for CompressedOverflowStore {
    async fn spill(&self, name: &str, entries: Vec<(String, Bytes)>) -> Result<()> {
        self.spills.fetch_add(1, Ordering::Relaxed);

        let mut parked = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            parked.push((key, self.encode(&value)?));
        }
        self.storage.insert(name.to_string(), parked);
        Ok(())
    }

    async fn restore(&self, name: &str) -> Result<Vec<(String, Bytes)>> {
        self.restores.fetch_add(1, Ordering::Relaxed);

        let parked = match self.storage.get(name) {
            Some(parked) => parked,
            None => return Ok(Vec::new()),
        };
        let mut entries = Vec::with_capacity(parked.len());
        for (key, value) in parked.iter() {
            entries.push((key.clone(), Self::decode(value)?));
        }
        Ok(entries)
    }

    fn stats(&self) -> OverflowStoreStats {
        let mut stored_entries = 0;
        let mut stored_bytes = 0;
        for bucket in self.storage.iter() {
            stored_entries += bucket.value().len() as u64;
            stored_bytes += bucket
                .value()
                .iter()
                .map(|(_, v)| v.data.len() as u64)
                .sum::<u64>();
        }
        OverflowStoreStats {
            spills: self.spills.load(Ordering::Relaxed),
            restores: self.restores.load(Ordering::Relaxed),
            stored_entries,
            stored_bytes,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
