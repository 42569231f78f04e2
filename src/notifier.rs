//! Configuration Change Notifier
//!
//! A subscription registry that broadcasts configuration values to
//! registered listeners. The listener set is copy-on-write: `notify`
//! iterates a snapshot taken under a short lock, so listeners may be
//! added or removed concurrently without ever breaking an in-flight
//! delivery. A listener that fails is logged and skipped; it never
//! prevents delivery to the remaining listeners.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::CacheConfig;
use crate::error::Result;

/// Receives configuration values after every successful change.
#[async_trait]
pub trait ConfigChangeListener: Send + Sync {
    async fn on_cache_config_changed(&self, config: &CacheConfig) -> Result<()>;
}

/// Stable identity token for a registered listener.
///
/// Unregistration is addressed by this token rather than by comparing
/// listener objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Registration {
    id: ListenerId,
    listener: Arc<dyn ConfigChangeListener>,
}

/// Registry of configuration-change listeners.
#[derive(Default)]
pub struct ConfigChangeNotifier {
    listeners: RwLock<Arc<Vec<Registration>>>,
}

impl ConfigChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener and returns its identity token.
    ///
    /// Registration is idempotent: registering the same `Arc` again
    /// returns the token it already holds instead of adding a duplicate.
    pub fn register(&self, listener: Arc<dyn ConfigChangeListener>) -> ListenerId {
        let mut guard = self.listeners.write();
        if let Some(existing) = guard
            .iter()
            .find(|r| Arc::ptr_eq(&r.listener, &listener))
        {
            return existing.id;
        }

        let id = ListenerId::new();
        let mut next: Vec<Registration> = guard
            .iter()
            .map(|r| Registration {
                id: r.id,
                listener: r.listener.clone(),
            })
            .collect();
        next.push(Registration { id, listener });
        *guard = Arc::new(next);
        id
    }

    /// Removes the listener registered under `id`. Returns whether a
    /// listener was removed; unknown tokens are a no-op.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut guard = self.listeners.write();
        if !guard.iter().any(|r| r.id == id) {
            return false;
        }
        let next: Vec<Registration> = guard
            .iter()
            .filter(|r| r.id != id)
            .map(|r| Registration {
                id: r.id,
                listener: r.listener.clone(),
            })
            .collect();
        *guard = Arc::new(next);
        true
    }

    /// Delivers `config` to every currently-registered listener.
    ///
    /// Listener failures are logged and isolated; delivery always
    /// continues to the rest of the set. Listeners registered or removed
    /// while a `notify` is in flight may or may not see this particular
    /// configuration.
    pub async fn notify(&self, config: &CacheConfig) {
        let snapshot = self.listeners.read().clone();
        debug!(
            cache = %config.name,
            listeners = snapshot.len(),
            "Broadcasting configuration change"
        );

        for registration in snapshot.iter() {
            if let Err(e) = registration.listener.on_cache_config_changed(config).await {
                warn!(
                    cache = %config.name,
                    listener = %registration.id,
                    error = %e,
                    "Configuration change listener failed"
                );
            }
        }
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ConfigChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigChangeNotifier")
            .field("listener_count", &self.len())
            .finish()
    }
}
