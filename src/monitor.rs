//! Cache Monitor
//!
//! Per-cache access and eviction accounting. Each cache name owns one
//! record of atomic counters, so updates for the same name never lose
//! increments under concurrent access and updates for different names
//! are fully independent. Counters are monotone except `current_size`,
//! which is a point-in-time gauge.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

/// Counters for one cache name
#[derive(Debug, Default)]
struct MonitorRecord {
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
    evictions: AtomicU64,
    current_size: AtomicU64,
    /// Cumulative lookup latency, for the exact mean
    total_latency_ns: AtomicU64,
    /// Unix millis of the last access; 0 means never accessed
    last_access_ms: AtomicI64,
}

/// Point-in-time statistics for one cache.
///
/// `access_count` is derived as `hit_count + miss_count`, so the
/// invariant between the three holds in every snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub access_count: u64,
    pub hit_count: u64,
    pub miss_count: u64,
    pub expire_count: u64,
    pub eviction_count: u64,
    pub current_size: u64,
    /// `hit_count / access_count`; 0.0 when nothing was accessed
    pub hit_rate: f64,
    /// Mean lookup latency over all recorded accesses
    pub average_latency: Duration,
    pub last_access: Option<DateTime<Utc>>,
}

/// Collects per-cache statistics
#[derive(Debug, Default)]
pub struct CacheMonitor {
    records: DashMap<String, Arc<MonitorRecord>>,
}

impl CacheMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, name: &str) -> Arc<MonitorRecord> {
        if let Some(record) = self.records.get(name) {
            return record.value().clone();
        }
        self.records
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MonitorRecord::default()))
            .value()
            .clone()
    }

    /// Records one lookup (hit or miss) with its elapsed latency.
    pub fn record_access(&self, name: &str, hit: bool, latency: Duration) {
        let record = self.record(name);
        if hit {
            record.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            record.misses.fetch_add(1, Ordering::Relaxed);
        }
        record
            .total_latency_ns
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);
        record
            .last_access_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Records one explicit or capacity-driven entry removal.
    pub fn record_eviction(&self, name: &str) {
        self.record(name).evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one time-based expiry.
    pub fn record_expire(&self, name: &str) {
        self.record(name)
            .expirations
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Updates the entry-count gauge.
    pub fn update_size(&self, name: &str, size: u64) {
        self.record(name).current_size.store(size, Ordering::Relaxed);
    }

    /// Statistics snapshot for one cache. Returns zeros for a name with
    /// no recorded events yet; reading never materializes a record.
    pub fn stats_for(&self, name: &str) -> CacheStats {
        match self.records.get(name) {
            Some(record) => snapshot(record.value()),
            None => CacheStats::default(),
        }
    }

    /// Snapshots every cache that has recorded events.
    pub fn all(&self) -> HashMap<String, CacheStats> {
        self.records
            .iter()
            .map(|entry| (entry.key().clone(), snapshot(entry.value())))
            .collect()
    }

    /// Drops the record for a removed cache. A re-registered cache
    /// starts counting from zero.
    pub fn remove(&self, name: &str) -> bool {
        self.records.remove(name).is_some()
    }
}

fn snapshot(record: &MonitorRecord) -> CacheStats {
    let hit_count = record.hits.load(Ordering::Relaxed);
    let miss_count = record.misses.load(Ordering::Relaxed);
    let access_count = hit_count + miss_count;

    let hit_rate = if access_count == 0 {
        0.0
    } else {
        hit_count as f64 / access_count as f64
    };
    let average_latency = if access_count == 0 {
        Duration::ZERO
    } else {
        Duration::from_nanos(record.total_latency_ns.load(Ordering::Relaxed) / access_count)
    };
    let last_access_ms = record.last_access_ms.load(Ordering::Relaxed);

    CacheStats {
        access_count,
        hit_count,
        miss_count,
        expire_count: record.expirations.load(Ordering::Relaxed),
        eviction_count: record.evictions.load(Ordering::Relaxed),
        current_size: record.current_size.load(Ordering::Relaxed),
        hit_rate,
        average_latency,
        last_access: if last_access_ms == 0 {
            None
        } else {
            DateTime::from_timestamp_millis(last_access_ms)
        },
    }
}

// =============================================================================
// Tests
// =============================================================================
