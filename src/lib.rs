//! ReCache - Reconfigurable Named Cache Manager
//!
//! An embeddable manager for named, bounded, expiring key/value caches
//! whose policies can be changed at runtime. A configuration update is
//! validated, applied atomically and, when it touches a structural
//! field, the live cache is rebuilt under the new policy with its
//! entries preserved. Caches can mirror their contents to a durable
//! store, spill to a compressed overflow store, and prewarm from a
//! registered loader.
//!
//! # Architecture
//!
//! ```text
//! ConfigChangeNotifier → CacheManager → bounded in-memory caches
//!                            │
//!              durable / overflow / config stores
//! ```
//!
//! The manager composes the pieces explicitly: nothing is wrapped in
//! decorators, and all synchronization is per cache name.
//!
//! # Features
//!
//! - Live reconfiguration with entry-preserving rebuilds
//! - Capacity bounds and write/access expiry per cache
//! - Write-through and snapshot persistence
//! - LZ4-compressed overflow spill/restore
//! - Background warmup loaders
//! - Per-cache hit/miss/eviction/latency accounting
//!
//! # Modules
//!
//! - [`config`] - Cache configuration and validation
//! - [`error`] - Error types
//! - [`manager`] - The cache manager and its handles
//! - [`monitor`] - Access statistics accounting
//! - [`notifier`] - Configuration change broadcast
//! - [`store`] - Durable, overflow and configuration stores
//! - [`warmup`] - Cache warmup loaders

use std::time::Duration;

pub mod config;
pub mod error;
pub mod manager;
pub mod monitor;
pub mod notifier;
pub mod store;
pub mod warmup;

// Re-export commonly used types
pub use config::{CacheConfig, ExpiryPolicy};
pub use error::{Error, Result};
pub use manager::{CacheHandle, CacheManager, ManagerSettings, WriteThroughMode};
pub use monitor::{CacheMonitor, CacheStats};
pub use notifier::{ConfigChangeListener, ConfigChangeNotifier, ListenerId};
pub use warmup::CacheLoader;

// =============================================================================
// Defaults
// =============================================================================

/// Default maximum entry count per cache
pub const DEFAULT_CAPACITY: u64 = 10_000;

/// Default expiry duration (zero disables time-based expiry)
pub const DEFAULT_EXPIRE_AFTER: Duration = Duration::from_secs(3600);

/// Default root directory for the filesystem durable store
pub const DEFAULT_DURABLE_PATH: &str = "./cache_data";

/// Default interval between scheduled snapshot saves of a durable cache
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(3600);

/// Default timeout for a single durable/overflow store call
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default cadence of the maintenance loop
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(1);
