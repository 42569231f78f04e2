//! Cache Manager
//!
//! The core state machine: owns every named cache's lifetime, applies
//! configuration changes atomically, keeps the durable and overflow
//! stores synchronized with the in-memory contents, and accounts every
//! access.
//!
//! # Design
//!
//! - The synchronization unit is the cache name. Each name owns a slot
//!   holding its configuration handle and a `tokio::sync::RwLock`
//!   around the live instance: get/put/evict take it shared, build and
//!   reconfiguration take it exclusive. Operations on different names
//!   never contend.
//! - First-time builds are single-flight: concurrent callers for an
//!   unbuilt name produce exactly one instance and all callers receive
//!   it.
//! - Durable and overflow stores are composed explicitly around the
//!   bounded structure's mutations; nothing wraps the cache in a
//!   decorator.
//! - Removals the bounded structure performs on its own (expiry, size
//!   pressure) surface through an eviction listener that feeds the
//!   monitor and, for write-through caches, enqueues durable deletes
//!   applied by the maintenance loop.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::future::join_all;
use moka::notification::RemovalCause;
use moka::sync::Cache;
use tokio::sync::{mpsc, OwnedRwLockReadGuard, RwLock};
use tokio::time::{interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::{CacheConfig, ConfigHandle, ExpiryPolicy};
use crate::error::{Error, Result};
use crate::monitor::{CacheMonitor, CacheStats};
use crate::notifier::ConfigChangeListener;
use crate::store::{
    ConfigStore, DurableStore, InMemoryDurableStore, InMemoryOverflowStore, OverflowStore,
};
use crate::warmup::{CacheLoader, Warmer};

/// How write-through persistence behaves on `put`.
///
/// `Sync` performs the durable upsert as part of the `put` call: the
/// entry is persisted before `put` returns, at the cost of adapter
/// latency on every write. `Background` queues the upsert for the
/// maintenance loop: higher throughput, but a crash can lose the most
/// recent writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteThroughMode {
    #[default]
    Sync,
    Background,
}

/// Manager-wide settings
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Best-effort timeout applied to every durable/overflow call
    pub store_timeout: Duration,
    /// Write-through behavior on `put`
    pub write_through_mode: WriteThroughMode,
    /// Cadence of the maintenance loop's scheduled-flush scan
    pub maintenance_interval: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            store_timeout: crate::DEFAULT_STORE_TIMEOUT,
            write_through_mode: WriteThroughMode::default(),
            maintenance_interval: crate::DEFAULT_MAINTENANCE_INTERVAL,
        }
    }
}

/// Live bounded structure for one name, with the flags captured from
/// the configuration that built it
struct CacheInstance {
    entries: Cache<String, Bytes>,
    durable: bool,
    write_through: bool,
    overflow: bool,
}

impl CacheInstance {
    fn snapshot(&self) -> Vec<(String, Bytes)> {
        self.entries
            .iter()
            .map(|(key, value)| ((*key).clone(), value))
            .collect()
    }
}

/// Durable operations deferred to the maintenance loop
enum WriteBehindOp {
    Upsert {
        name: String,
        key: String,
        value: Bytes,
    },
    Delete {
        name: String,
        key: String,
    },
    Snapshot {
        name: String,
        entries: Vec<(String, Bytes)>,
    },
}

/// Per-name state: configuration, live instance, flush bookkeeping
struct CacheSlot {
    config: ConfigHandle,
    instance: Arc<RwLock<Option<Arc<CacheInstance>>>>,
    last_flush: parking_lot::Mutex<Instant>,
}

impl CacheSlot {
    fn new(config: CacheConfig) -> Self {
        Self {
            config: ConfigHandle::new(config),
            instance: Arc::new(RwLock::new(None)),
            last_flush: parking_lot::Mutex::new(Instant::now()),
        }
    }
}

type InstanceGuard = OwnedRwLockReadGuard<Option<Arc<CacheInstance>>>;

/// Reconfigurable manager of named caches
pub struct CacheManager {
    slots: DashMap<String, Arc<CacheSlot>>,
    monitor: Arc<CacheMonitor>,
    durable: Arc<dyn DurableStore>,
    overflow: Arc<dyn OverflowStore>,
    warmer: Warmer,
    settings: ManagerSettings,
    config_store: parking_lot::RwLock<Option<Arc<dyn ConfigStore>>>,
    write_tx: mpsc::UnboundedSender<WriteBehindOp>,
    write_rx: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<WriteBehindOp>>>,
    shutdown: CancellationToken,
}

impl CacheManager {
    /// Creates a manager over the given stores with default settings.
    pub fn new(durable: Arc<dyn DurableStore>, overflow: Arc<dyn OverflowStore>) -> Self {
        Self::with_settings(ManagerSettings::default(), durable, overflow)
    }

    /// Creates a manager with custom settings.
    pub fn with_settings(
        settings: ManagerSettings,
        durable: Arc<dyn DurableStore>,
        overflow: Arc<dyn OverflowStore>,
    ) -> Self {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        Self {
            slots: DashMap::new(),
            monitor: Arc::new(CacheMonitor::new()),
            durable,
            overflow,
            warmer: Warmer::new(),
            settings,
            config_store: parking_lot::RwLock::new(None),
            write_tx,
            write_rx: tokio::sync::Mutex::new(Some(write_rx)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Creates a manager with in-memory stores (for testing and
    /// embedding without persistence).
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryDurableStore::new()),
            Arc::new(InMemoryOverflowStore::new()),
        )
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registers a configuration for a new cache name. The instance is
    /// built lazily on first access. Fails if the name is already
    /// registered; `set_config` is the update path.
    pub fn register(&self, config: CacheConfig) -> Result<()> {
        config.validate()?;
        match self.slots.entry(config.name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(Error::Config(format!(
                "cache '{}' is already registered",
                config.name
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                info!(cache = %config.name, "Registered cache configuration");
                slot.insert(Arc::new(CacheSlot::new(config)));
                Ok(())
            }
        }
    }

    /// Drops the cache, its configuration and its monitor record
    /// together. A re-registered name starts from zero.
    pub fn remove_cache(&self, name: &str) -> bool {
        let removed = self.slots.remove(name).is_some();
        if removed {
            self.monitor.remove(name);
            info!(cache = name, "Removed cache");
        }
        removed
    }

    /// Registers a warmup loader consulted when a configuration with
    /// `warmup_enabled` is built.
    pub fn register_loader(&self, name: impl Into<String>, loader: Arc<dyn CacheLoader>) {
        self.warmer.register(name, loader);
    }

    /// Loads every stored configuration record, registers the valid
    /// ones and retains the store so later successful `set_config`
    /// calls are saved back to it. Returns how many were registered.
    #[instrument(skip(self, store))]
    pub async fn bootstrap(&self, store: Arc<dyn ConfigStore>) -> Result<usize> {
        let records = store.load_all().await?;
        let mut registered = 0;
        for config in records {
            match self.register(config) {
                Ok(()) => registered += 1,
                Err(e) => warn!(error = %e, "Skipping stored configuration"),
            }
        }
        *self.config_store.write() = Some(store);
        info!(registered, "Bootstrapped cache configurations");
        Ok(registered)
    }

    // =========================================================================
    // Cache operations
    // =========================================================================

    /// Ensures the cache for `name` is built and returns a handle to
    /// it. The handle addresses the cache by name through this
    /// manager, so it stays valid across reconfigurations.
    pub async fn get_or_create(&self, name: &str) -> Result<CacheHandle<'_>> {
        let (_guard, _instance) = self.acquire(name).await?;
        Ok(CacheHandle {
            manager: self,
            name: name.to_string(),
        })
    }

    /// Looks up one key; records a hit or miss with elapsed latency.
    pub async fn get(&self, name: &str, key: &str) -> Result<Option<Bytes>> {
        let start = Instant::now();
        let (_guard, instance) = self.acquire(name).await?;
        let value = instance.entries.get(key);
        self.monitor.record_access(name, value.is_some(), start.elapsed());
        Ok(value)
    }

    /// Writes one entry. For write-through configurations the durable
    /// upsert happens as part of this call (or is queued, depending on
    /// [`WriteThroughMode`]); a failing durable store never fails the
    /// in-memory write.
    pub async fn put(
        &self,
        name: &str,
        key: impl Into<String>,
        value: impl Into<Bytes>,
    ) -> Result<()> {
        let key = key.into();
        let value = value.into();
        let (_guard, instance) = self.acquire(name).await?;
        instance.entries.insert(key.clone(), value.clone());

        if instance.write_through {
            match self.settings.write_through_mode {
                WriteThroughMode::Sync => {
                    let write = self.durable.upsert_entry(name, &key, value);
                    if let Err(e) = self.store_call(name, "upsert_entry", write).await {
                        warn!(
                            cache = name,
                            key = %key,
                            error = %e,
                            "Write-through upsert failed; in-memory entry kept"
                        );
                    }
                }
                WriteThroughMode::Background => {
                    let _ = self.write_tx.send(WriteBehindOp::Upsert {
                        name: name.to_string(),
                        key,
                        value,
                    });
                }
            }
        }

        self.monitor.update_size(name, instance.entries.entry_count());
        Ok(())
    }

    /// Removes one entry. Returns whether it existed.
    pub async fn evict_key(&self, name: &str, key: &str) -> Result<bool> {
        let (_guard, instance) = self.acquire(name).await?;
        let existed = instance.entries.remove(key).is_some();

        if existed {
            self.monitor.record_eviction(name);
            if instance.durable {
                let delete = self.durable.delete_entry(name, key);
                if let Err(e) = self.store_call(name, "delete_entry", delete).await {
                    warn!(
                        cache = name,
                        key,
                        error = %e,
                        "Durable delete failed; the next snapshot save corrects it"
                    );
                }
            }
        }

        self.monitor.update_size(name, instance.entries.entry_count());
        Ok(existed)
    }

    /// Removes every entry. Returns how many were removed.
    pub async fn evict_all(&self, name: &str) -> Result<u64> {
        let (_guard, instance) = self.acquire(name).await?;
        let keys: Vec<String> = instance
            .entries
            .iter()
            .map(|(key, _)| (*key).clone())
            .collect();
        instance.entries.invalidate_all();
        instance.entries.run_pending_tasks();

        for key in &keys {
            self.monitor.record_eviction(name);
            if instance.durable {
                let delete = self.durable.delete_entry(name, key);
                if let Err(e) = self.store_call(name, "delete_entry", delete).await {
                    warn!(
                        cache = name,
                        key = %key,
                        error = %e,
                        "Durable delete failed; the next snapshot save corrects it"
                    );
                }
            }
        }

        self.monitor.update_size(name, 0);
        Ok(keys.len() as u64)
    }

    /// Entry count for `name`; 0 when the cache has not been built.
    /// Does not build an absent instance.
    pub async fn size(&self, name: &str) -> u64 {
        let slot = match self.slots.get(name) {
            Some(slot) => slot.value().clone(),
            None => return 0,
        };
        let guard = slot.instance.read().await;
        match guard.as_ref() {
            Some(instance) => {
                instance.entries.run_pending_tasks();
                let size = instance.entries.entry_count();
                self.monitor.update_size(name, size);
                size
            }
            None => 0,
        }
    }

    // =========================================================================
    // Reconfiguration
    // =========================================================================

    /// The reconfiguration entry point, serialized per name.
    ///
    /// Updates the stored configuration atomically, then compares the
    /// structural fields of old and new. When none differ this is a
    /// pure metadata update. When any differ and an instance is live,
    /// its entries are snapshotted, a fresh instance is built under the
    /// new configuration, the snapshot is re-inserted and the instance
    /// is swapped; same-name get/put block for exactly that window. On
    /// build failure the previous configuration and instance remain in
    /// effect and the error is returned.
    ///
    /// Returns whether a rebuild happened.
    #[instrument(skip(self, new_config), fields(cache = %name))]
    pub async fn set_config(&self, name: &str, new_config: CacheConfig) -> Result<bool> {
        if new_config.name != name {
            return Err(Error::Config(format!(
                "configuration is for cache '{}', not '{}'",
                new_config.name, name
            )));
        }
        new_config.validate()?;

        let slot = self.slot(name);
        let mut wguard = slot.instance.clone().write_owned().await;

        let old_config = slot.config.snapshot();
        slot.config.update(new_config.clone());

        let rebuilt = if !old_config.requires_rebuild(&new_config) {
            debug!("No structural change; configuration updated in place");
            false
        } else if let Some(old_instance) = wguard.as_ref().cloned() {
            let snapshot = old_instance.snapshot();
            let preserved = snapshot.len();
            match self.build_instance(&new_config).await {
                Ok(new_instance) => {
                    for (key, value) in snapshot {
                        new_instance.entries.insert(key, value);
                    }
                    if new_instance.durable {
                        // Catch the durable copy up with the rebuilt
                        // contents without stretching the swap window.
                        let _ = self.write_tx.send(WriteBehindOp::Snapshot {
                            name: name.to_string(),
                            entries: new_instance.snapshot(),
                        });
                    }
                    self.monitor
                        .update_size(name, new_instance.entries.entry_count());
                    *wguard = Some(new_instance);
                    info!(preserved, "Rebuilt cache instance for new configuration");
                    true
                }
                Err(e) => {
                    slot.config.update(old_config);
                    warn!(
                        error = %e,
                        "Rebuild failed; previous configuration and instance remain in effect"
                    );
                    return Err(e);
                }
            }
        } else {
            // Not built yet; the next access builds with the new
            // configuration.
            false
        };

        drop(wguard);
        self.save_config_record(&new_config).await;
        Ok(rebuilt)
    }

    // =========================================================================
    // Persistence and overflow
    // =========================================================================

    /// Forces a durable snapshot save for `name`. Returns whether a
    /// save happened; a cache without durability (or not yet built) is
    /// a no-op.
    pub async fn persist(&self, name: &str) -> Result<bool> {
        let slot = match self.slots.get(name) {
            Some(slot) => slot.value().clone(),
            None => return Ok(false),
        };
        let guard = slot.instance.read().await;
        let instance = match guard.as_ref() {
            Some(instance) if instance.durable => instance.clone(),
            _ => return Ok(false),
        };
        let entries = instance.snapshot();
        drop(guard);

        let count = entries.len();
        let save = self.durable.save_snapshot(name, entries);
        self.store_call(name, "save_snapshot", save).await?;
        *slot.last_flush.lock() = Instant::now();
        debug!(cache = name, entries = count, "Persisted cache snapshot");
        Ok(true)
    }

    /// Persists every durable cache. Returns how many were saved;
    /// individual failures are logged and retried on the next
    /// scheduled flush.
    pub async fn persist_all(&self) -> usize {
        let names: Vec<String> = self.slots.iter().map(|e| e.key().clone()).collect();
        let results = join_all(names.iter().map(|name| self.persist(name))).await;

        let mut saved = 0;
        for (name, result) in names.iter().zip(results) {
            match result {
                Ok(true) => saved += 1,
                Ok(false) => {}
                Err(e) => warn!(cache = %name, error = %e, "Persist failed"),
            }
        }
        saved
    }

    /// Copies the current entries of `name` into the overflow store,
    /// replacing whatever was spilled before. Returns whether a spill
    /// happened; a cache without overflow (or not yet built) is a
    /// no-op.
    pub async fn spill(&self, name: &str) -> Result<bool> {
        let slot = match self.slots.get(name) {
            Some(slot) => slot.value().clone(),
            None => return Ok(false),
        };
        let guard = slot.instance.read().await;
        let instance = match guard.as_ref() {
            Some(instance) if instance.overflow => instance.clone(),
            _ => return Ok(false),
        };
        let entries = instance.snapshot();
        drop(guard);

        let count = entries.len();
        let spill = self.overflow.spill(name, entries);
        self.store_call(name, "spill", spill).await?;
        debug!(cache = name, entries = count, "Spilled cache to overflow store");
        Ok(true)
    }

    /// Spills every overflow-enabled cache. Returns how many spilled.
    pub async fn spill_all(&self) -> usize {
        let names: Vec<String> = self.slots.iter().map(|e| e.key().clone()).collect();
        let results = join_all(names.iter().map(|name| self.spill(name))).await;

        let mut spilled = 0;
        for (name, result) in names.iter().zip(results) {
            match result {
                Ok(true) => spilled += 1,
                Ok(false) => {}
                Err(e) => warn!(cache = %name, error = %e, "Spill failed"),
            }
        }
        spilled
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn is_registered(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn cache_names(&self) -> Vec<String> {
        self.slots.iter().map(|e| e.key().clone()).collect()
    }

    /// Current configuration snapshot for `name`, if registered.
    pub fn config_of(&self, name: &str) -> Option<CacheConfig> {
        self.slots.get(name).map(|slot| slot.config.snapshot())
    }

    pub fn stats_for(&self, name: &str) -> CacheStats {
        self.monitor.stats_for(name)
    }

    pub fn all_stats(&self) -> HashMap<String, CacheStats> {
        self.monitor.all()
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Background loop applying write-behind durable operations and
    /// the scheduled per-cache flushes. Spawn it once per manager:
    ///
    /// ```no_run
    /// # use std::sync::Arc;
    /// # use recache::CacheManager;
    /// # #[tokio::main]
    /// # async fn main() {
    /// let manager = Arc::new(CacheManager::in_memory());
    /// tokio::spawn(manager.clone().run_maintenance());
    /// # }
    /// ```
    ///
    /// Durable caches rely on this loop: deletes for expired/evicted
    /// entries, background write-through and rebuild catch-up saves
    /// are all applied here. They queue on an unbounded channel that
    /// only this loop drains, so a write-through manager that never
    /// spawns it accumulates queued operations without bound.
    /// Terminates when [`close`](Self::close) is called, after
    /// draining the queue.
    pub async fn run_maintenance(self: Arc<Self>) {
        let mut rx = match self.write_rx.lock().await.take() {
            Some(rx) => rx,
            None => {
                warn!("Maintenance loop is already running");
                return;
            }
        };
        info!("Cache maintenance loop started");
        let mut tick = interval(self.settings.maintenance_interval);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    while let Ok(op) = rx.try_recv() {
                        self.apply_write_behind(op).await;
                    }
                    info!("Cache maintenance loop stopped");
                    return;
                }
                _ = tick.tick() => {
                    self.flush_due_caches().await;
                }
                op = rx.recv() => {
                    match op {
                        Some(op) => self.apply_write_behind(op).await,
                        // All senders dropped; the manager is gone.
                        None => return,
                    }
                }
            }
        }
    }

    /// Saves every durable cache one final time and stops the
    /// maintenance loop.
    pub async fn close(&self) {
        let saved = self.persist_all().await;
        info!(saved, "Cache manager closing");
        self.shutdown.cancel();
    }

    async fn apply_write_behind(&self, op: WriteBehindOp) {
        let (name, result) = match op {
            WriteBehindOp::Upsert { name, key, value } => {
                let write = self.durable.upsert_entry(&name, &key, value);
                let result = self.store_call(&name, "upsert_entry", write).await;
                (name, result)
            }
            WriteBehindOp::Delete { name, key } => {
                let delete = self.durable.delete_entry(&name, &key);
                let result = self.store_call(&name, "delete_entry", delete).await;
                (name, result)
            }
            WriteBehindOp::Snapshot { name, entries } => {
                let save = self.durable.save_snapshot(&name, entries);
                let result = self.store_call(&name, "save_snapshot", save).await;
                (name, result)
            }
        };
        if let Err(e) = result {
            warn!(cache = %name, error = %e, "Write-behind durable operation failed");
        }
    }

    async fn flush_due_caches(&self) {
        let slots: Vec<(String, Arc<CacheSlot>)> = self
            .slots
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        for (name, slot) in slots {
            let (durable, flush_interval) = slot
                .config
                .read(|c| (c.durability_enabled, c.flush_interval));
            if !durable || flush_interval.is_zero() {
                continue;
            }
            if slot.last_flush.lock().elapsed() < flush_interval {
                continue;
            }
            if let Err(e) = self.persist(&name).await {
                warn!(cache = %name, error = %e, "Scheduled persist failed");
            }
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// The slot for `name`, created with a default configuration when
    /// the name was never registered.
    fn slot(&self, name: &str) -> Arc<CacheSlot> {
        if let Some(slot) = self.slots.get(name) {
            return slot.value().clone();
        }
        self.slots
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CacheSlot::new(CacheConfig::for_name(name))))
            .value()
            .clone()
    }

    /// Shared-locked access to the live instance, building it first if
    /// needed (single-flight: the write lock makes the first caller
    /// build while the rest wait, then everyone proceeds on the same
    /// instance). The returned guard blocks a concurrent swap for as
    /// long as the caller holds it.
    async fn acquire(&self, name: &str) -> Result<(InstanceGuard, Arc<CacheInstance>)> {
        loop {
            let slot = self.slot(name);
            let guard = slot.instance.clone().read_owned().await;
            if let Some(instance) = guard.as_ref() {
                let instance = instance.clone();
                return Ok((guard, instance));
            }
            drop(guard);

            let mut wguard = slot.instance.clone().write_owned().await;
            if wguard.is_none() {
                let config = slot.config.snapshot();
                let instance = self.build_instance(&config).await?;
                info!(cache = name, capacity = config.capacity, "Built cache instance");
                self.monitor
                    .update_size(name, instance.entries.entry_count());
                *wguard = Some(instance.clone());
                let rguard = wguard.downgrade();
                return Ok((rguard, instance));
            }
            // Someone else built it while we waited for the write
            // lock; loop back to the read path.
        }
    }

    /// The build sequence: bounded structure per the configuration,
    /// eviction listener, durable snapshot load, additive overflow
    /// restore, background warmup. Any adapter failure aborts the
    /// build and nothing is published.
    async fn build_instance(&self, config: &CacheConfig) -> Result<Arc<CacheInstance>> {
        let name = config.name.clone();

        let mut builder = Cache::<String, Bytes>::builder().max_capacity(config.capacity);
        if !config.expire_after.is_zero() {
            builder = match config.expiry {
                ExpiryPolicy::AfterWrite => builder.time_to_live(config.expire_after),
                ExpiryPolicy::AfterAccess => builder.time_to_idle(config.expire_after),
            };
        }

        let listener_name = name.clone();
        let monitor = self.monitor.clone();
        let durable_deletes = config.is_write_through().then(|| self.write_tx.clone());
        builder = builder.eviction_listener(move |key: Arc<String>, _value: Bytes, cause| {
            match cause {
                RemovalCause::Expired => monitor.record_expire(&listener_name),
                RemovalCause::Size => monitor.record_eviction(&listener_name),
                // Explicit removals and replacements are accounted by
                // the manager itself.
                RemovalCause::Explicit | RemovalCause::Replaced => return,
            }
            if let Some(tx) = &durable_deletes {
                let _ = tx.send(WriteBehindOp::Delete {
                    name: listener_name.clone(),
                    key: (*key).clone(),
                });
            }
        });

        let entries = builder.build();

        if config.durability_enabled {
            let load = self.durable.load_snapshot(&name);
            let persisted = self
                .store_call(&name, "load_snapshot", load)
                .await
                .map_err(|e| Error::build_failure(&name, e))?;
            let count = persisted.len();
            for (key, value) in persisted {
                entries.insert(key, value);
            }
            if count > 0 {
                debug!(cache = %name, entries = count, "Loaded durable snapshot");
            }
        }

        if config.overflow_enabled {
            let restore = self.overflow.restore(&name);
            let spilled = self
                .store_call(&name, "restore", restore)
                .await
                .map_err(|e| Error::build_failure(&name, e))?;
            let count = spilled.len();
            for (key, value) in spilled {
                entries.insert(key, value);
            }
            if count > 0 {
                debug!(cache = %name, entries = count, "Restored spilled entries");
            }
        }

        if config.warmup_enabled {
            self.warmer.spawn_fill(&name, entries.clone());
        }

        Ok(Arc::new(CacheInstance {
            entries,
            durable: config.durability_enabled,
            write_through: config.is_write_through(),
            overflow: config.overflow_enabled,
        }))
    }

    async fn store_call<T>(
        &self,
        name: &str,
        op: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match timeout(self.settings.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::StoreTimeout {
                name: name.to_string(),
                op,
                timeout: self.settings.store_timeout,
            }),
        }
    }

    async fn save_config_record(&self, config: &CacheConfig) {
        let store = self.config_store.read().clone();
        if let Some(store) = store {
            if let Err(e) = store.save(config).await {
                warn!(cache = %config.name, error = %e, "Failed to save configuration record");
            }
        }
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("caches", &self.slots.len())
            .finish()
    }
}

#[async_trait]
impl ConfigChangeListener for CacheManager {
    /// Applies broadcast configurations for caches this manager has
    /// registered; configurations for foreign names are ignored.
    async fn on_cache_config_changed(&self, config: &CacheConfig) -> Result<()> {
        if !self.is_registered(&config.name) {
            debug!(
                cache = %config.name,
                "Ignoring configuration for a cache this manager does not own"
            );
            return Ok(());
        }
        self.set_config(&config.name, config.clone()).await.map(|_| ())
    }
}

/// Name-addressed view of one cache.
///
/// Holds no reference to the live instance, so it remains valid across
/// reconfigurations and rebuilds.
#[derive(Debug, Clone)]
pub struct CacheHandle<'a> {
    manager: &'a CacheManager,
    name: String,
}

impl CacheHandle<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.manager.get(&self.name, key).await
    }

    pub async fn put(&self, key: impl Into<String>, value: impl Into<Bytes>) -> Result<()> {
        self.manager.put(&self.name, key, value).await
    }

    pub async fn evict(&self, key: &str) -> Result<bool> {
        self.manager.evict_key(&self.name, key).await
    }

    pub async fn size(&self) -> u64 {
        self.manager.size(&self.name).await
    }

    pub fn stats(&self) -> CacheStats {
        self.manager.stats_for(&self.name)
    }
}

// =============================================================================
// Tests
// =============================================================================
