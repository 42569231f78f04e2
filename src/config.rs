//! Cache Configuration
//!
//! The policy value object for one named cache, plus the lock-guarded
//! handle the manager shares with concurrent readers. A reader never
//! observes a half-updated field set: `ConfigHandle::update` replaces
//! every field under one exclusive critical section.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// When the expiry clock for an entry restarts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ExpiryPolicy {
    /// Entries expire a fixed duration after they were written
    #[default]
    AfterWrite,
    /// Entries expire a fixed duration after they were last read or written
    AfterAccess,
}

impl std::fmt::Display for ExpiryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpiryPolicy::AfterWrite => write!(f, "afterWrite"),
            ExpiryPolicy::AfterAccess => write!(f, "afterAccess"),
        }
    }
}

/// Desired policy for one named cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// Cache name (identity key, stable for the configuration's lifetime)
    pub name: String,
    /// Maximum number of entries
    pub capacity: u64,
    /// Time-based expiry duration; zero disables time expiry
    pub expire_after: Duration,
    /// Expiry clock mode
    pub expiry: ExpiryPolicy,
    /// Keep a durable copy of this cache
    pub durability_enabled: bool,
    /// Write each put/removal through to the durable store as part of the call
    pub auto_write_through: bool,
    /// Allow spilling entries to the overflow store
    pub overflow_enabled: bool,
    /// Fill the cache from a registered loader after (re)build
    pub warmup_enabled: bool,
    /// Root path hint for the durable store
    pub durable_path: PathBuf,
    /// How often the scheduled persist of this cache runs
    pub flush_interval: Duration,
}

impl CacheConfig {
    /// Default configuration for the given cache name.
    pub fn for_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: crate::DEFAULT_CAPACITY,
            expire_after: crate::DEFAULT_EXPIRE_AFTER,
            expiry: ExpiryPolicy::AfterWrite,
            durability_enabled: false,
            auto_write_through: false,
            overflow_enabled: false,
            warmup_enabled: false,
            durable_path: PathBuf::from(crate::DEFAULT_DURABLE_PATH),
            flush_interval: crate::DEFAULT_FLUSH_INTERVAL,
        }
    }

    /// Validates the configuration before it is applied.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("cache name must not be empty".to_string()));
        }
        if self.durability_enabled && self.durable_path.as_os_str().is_empty() {
            return Err(Error::Config(format!(
                "cache '{}' enables durability but has no durable path",
                self.name
            )));
        }
        Ok(())
    }

    /// True when switching from `self` to `other` requires discarding and
    /// rebuilding the live instance. Structural fields are capacity, expiry
    /// duration and mode, write-through, overflow and durability toggles;
    /// path, flush interval and warmup changes apply without a rebuild.
    pub fn requires_rebuild(&self, other: &CacheConfig) -> bool {
        self.capacity != other.capacity
            || self.expire_after != other.expire_after
            || self.expiry != other.expiry
            || self.auto_write_through != other.auto_write_through
            || self.overflow_enabled != other.overflow_enabled
            || self.durability_enabled != other.durability_enabled
    }

    /// True when puts and removals must be mirrored to the durable store.
    pub fn is_write_through(&self) -> bool {
        self.durability_enabled && self.auto_write_through
    }
}

/// Shared, lock-guarded view of one cache's configuration.
///
/// Readers take the shared lock; `update` takes the exclusive lock and
/// replaces the whole value, so concurrent readers see either the old or
/// the new configuration, never a mix.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<CacheConfig>>,
}

impl ConfigHandle {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Clones the current configuration under the shared lock.
    pub fn snapshot(&self) -> CacheConfig {
        self.inner.read().clone()
    }

    /// Replaces every field atomically under the exclusive lock.
    pub fn update(&self, new_config: CacheConfig) {
        *self.inner.write() = new_config;
    }

    /// Reads one or more fields under the shared lock.
    pub fn read<R>(&self, f: impl FnOnce(&CacheConfig) -> R) -> R {
        f(&self.inner.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_component_defaults() {
        let config = CacheConfig::for_name("sessions");
        assert_eq!(config.name, "sessions");
        assert_eq!(config.capacity, 10_000);
        assert_eq!(config.expire_after, Duration::from_secs(3600));
        assert_eq!(config.expiry, ExpiryPolicy::AfterWrite);
        assert!(!config.durability_enabled);
        assert!(!config.auto_write_through);
        assert!(!config.overflow_enabled);
        assert!(!config.warmup_enabled);
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        let config = CacheConfig::for_name("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_durable_without_path() {
        let mut config = CacheConfig::for_name("sessions");
        config.durability_enabled = true;
        config.durable_path = PathBuf::new();
        assert!(config.validate().is_err());

        config.durable_path = PathBuf::from("./cache_data");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_structural_fields_require_rebuild() {
        let base = CacheConfig::for_name("sessions");

        let mut changed = base.clone();
        changed.capacity = 99;
        assert!(base.requires_rebuild(&changed));

        let mut changed = base.clone();
        changed.expiry = ExpiryPolicy::AfterAccess;
        assert!(base.requires_rebuild(&changed));

        let mut changed = base.clone();
        changed.expire_after = Duration::from_secs(60);
        assert!(base.requires_rebuild(&changed));

        let mut changed = base.clone();
        changed.durability_enabled = true;
        assert!(base.requires_rebuild(&changed));
    }

    #[test]
    fn test_non_structural_fields_do_not_rebuild() {
        let base = CacheConfig::for_name("sessions");

        let mut changed = base.clone();
        changed.flush_interval = Duration::from_secs(30);
        changed.durable_path = PathBuf::from("/var/lib/recache");
        changed.warmup_enabled = true;
        assert!(!base.requires_rebuild(&changed));
    }

    #[test]
    fn test_handle_update_is_whole_object() {
        let handle = ConfigHandle::new(CacheConfig::for_name("sessions"));

        let mut next = handle.snapshot();
        next.capacity = 42;
        next.overflow_enabled = true;
        handle.update(next.clone());

        let seen = handle.snapshot();
        assert_eq!(seen, next);
        assert_eq!(handle.read(|c| c.capacity), 42);
    }

    #[test]
    fn test_serde_round_trip_uses_camel_case() {
        let mut config = CacheConfig::for_name("sessions");
        config.durability_enabled = true;
        config.expiry = ExpiryPolicy::AfterAccess;

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"durabilityEnabled\":true"));
        assert!(json.contains("\"afterAccess\""));

        let back: CacheConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
