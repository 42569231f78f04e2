//! Cache Warmup
//!
//! Optional background fill of a freshly built cache from a registered
//! data loader. Warmup runs as a detached task: it never blocks or
//! fails the build, and a loader error leaves the cache usable (just
//! cold).

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use moka::sync::Cache;
use tracing::{debug, error, info};

use crate::error::Result;

/// Produces the initial entries for a named cache
#[async_trait]
pub trait CacheLoader: Send + Sync {
    async fn load(&self, cache_name: &str) -> Result<Vec<(String, Bytes)>>;
}

/// Registry of per-cache warmup loaders
#[derive(Default)]
pub struct Warmer {
    loaders: DashMap<String, Arc<dyn CacheLoader>>,
}

impl Warmer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the loader for `name`.
    pub fn register(&self, name: impl Into<String>, loader: Arc<dyn CacheLoader>) {
        self.loaders.insert(name.into(), loader);
    }

    /// Removes the loader for `name`. Returns whether one was registered.
    pub fn unregister(&self, name: &str) -> bool {
        self.loaders.remove(name).is_some()
    }

    pub fn has_loader(&self, name: &str) -> bool {
        self.loaders.contains_key(name)
    }

    /// Starts a background fill of `target` from the loader registered
    /// for `name`. Returns whether a task was spawned.
    pub(crate) fn spawn_fill(&self, name: &str, target: Cache<String, Bytes>) -> bool {
        let loader = match self.loaders.get(name) {
            Some(loader) => loader.value().clone(),
            None => {
                debug!(cache = name, "Warmup enabled but no loader registered");
                return false;
            }
        };

        let name = name.to_string();
        tokio::spawn(async move {
            match loader.load(&name).await {
                Ok(entries) => {
                    let count = entries.len();
                    for (key, value) in entries {
                        target.insert(key, value);
                    }
                    info!(cache = %name, entries = count, "Cache warmup complete");
                }
                Err(e) => {
                    error!(cache = %name, error = %e, "Cache warmup failed");
                }
            }
        });
        true
    }
}

impl std::fmt::Debug for Warmer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Warmer")
            .field("loader_count", &self.loaders.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
