//! ReCache Integration Tests
//!
//! End-to-end flows through the public API:
//! - Cache lifecycle and per-name isolation
//! - Live reconfiguration and entry-preserving rebuilds
//! - Write and access expiry policies
//! - Durable persistence across restarts
//! - Overflow spill and restore
//! - Warmup loaders
//! - Configuration broadcast wiring

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use recache::{CacheConfig, CacheManager};

// =============================================================================
// Lifecycle Tests
// =============================================================================

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_handles_for_distinct_names_are_isolated() {
        let manager = CacheManager::in_memory();
        let users = manager.get_or_create("users").await.unwrap();
        let orders = manager.get_or_create("orders").await.unwrap();

        users.put("id", "alice").await.unwrap();
        orders.put("id", "order-9").await.unwrap();

        assert_eq!(users.get("id").await.unwrap(), Some(Bytes::from_static(b"alice")));
        assert_eq!(orders.get("id").await.unwrap(), Some(Bytes::from_static(b"order-9")));

        users.evict("id").await.unwrap();
        assert_eq!(users.get("id").await.unwrap(), None);
        assert_eq!(orders.get("id").await.unwrap(), Some(Bytes::from_static(b"order-9")));

        assert_eq!(users.stats().eviction_count, 1);
        assert_eq!(orders.stats().eviction_count, 0);
    }

    #[tokio::test]
    async fn test_unregistered_name_gets_default_configuration() {
        let manager = CacheManager::in_memory();

        assert!(!manager.is_registered("adhoc"));
        assert_eq!(manager.get("adhoc", "k").await.unwrap(), None);

        // First touch materializes the default configuration.
        assert!(manager.is_registered("adhoc"));
        let config = manager.config_of("adhoc").unwrap();
        assert_eq!(config.capacity, recache::DEFAULT_CAPACITY);
        assert!(!config.durability_enabled);
    }

    #[tokio::test]
    async fn test_cache_names_reflect_registrations_and_touches() {
        let manager = CacheManager::in_memory();

        manager.register(CacheConfig::for_name("a")).unwrap();
        manager.register(CacheConfig::for_name("b")).unwrap();
        manager.put("c", "k", "v").await.unwrap();

        let mut names = manager.cache_names();
        names.sort();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_removed_cache_restarts_from_scratch() {
        let manager = CacheManager::in_memory();

        manager.put("sessions", "k", "v").await.unwrap();
        manager.get("sessions", "k").await.unwrap();
        assert!(manager.remove_cache("sessions"));

        assert_eq!(manager.get("sessions", "k").await.unwrap(), None);
        let stats = manager.stats_for("sessions");
        assert_eq!(stats.hit_count, 0);
        assert_eq!(stats.miss_count, 1);
    }
}

// =============================================================================
// Reconfiguration Tests
// =============================================================================

mod reconfiguration_tests {
    use super::*;

    #[tokio::test]
    async fn test_capacity_change_preserves_contents() {
        let manager = CacheManager::in_memory();

        for i in 0..50 {
            manager
                .put("catalog", format!("sku-{i}"), format!("item-{i}"))
                .await
                .unwrap();
        }

        let mut config = manager.config_of("catalog").unwrap();
        config.capacity *= 2;
        assert!(manager.set_config("catalog", config).await.unwrap());

        for i in 0..50 {
            let value = manager.get("catalog", &format!("sku-{i}")).await.unwrap();
            assert_eq!(value, Some(Bytes::from(format!("item-{i}"))));
        }
    }

    #[tokio::test]
    async fn test_shrunken_capacity_evicts_down() {
        let manager = CacheManager::in_memory();

        for i in 0..20 {
            manager.put("catalog", format!("sku-{i}"), "x").await.unwrap();
        }

        let mut config = manager.config_of("catalog").unwrap();
        config.capacity = 5;
        manager.set_config("catalog", config).await.unwrap();

        assert!(manager.size("catalog").await <= 5);
    }

    #[tokio::test]
    async fn test_metadata_only_change_skips_rebuild() {
        let manager = CacheManager::in_memory();
        manager.put("sessions", "k", "v").await.unwrap();

        let mut config = manager.config_of("sessions").unwrap();
        config.flush_interval = Duration::from_secs(60);
        let rebuilt = manager.set_config("sessions", config).await.unwrap();

        assert!(!rebuilt);
        assert_eq!(
            manager.config_of("sessions").unwrap().flush_interval,
            Duration::from_secs(60)
        );
    }

    #[tokio::test]
    async fn test_invalid_configuration_changes_nothing() {
        let manager = CacheManager::in_memory();
        manager.put("sessions", "k", "v").await.unwrap();
        let before = manager.config_of("sessions").unwrap();

        let mut config = before.clone();
        config.durability_enabled = true;
        config.durable_path = std::path::PathBuf::new();
        assert!(manager.set_config("sessions", config).await.is_err());

        assert_eq!(manager.config_of("sessions").unwrap(), before);
        assert_eq!(
            manager.get("sessions", "k").await.unwrap(),
            Some(Bytes::from_static(b"v"))
        );
    }
}

// =============================================================================
// Expiry Tests
// =============================================================================

mod expiry_tests {
    use super::*;
    use recache::ExpiryPolicy;

    #[tokio::test]
    async fn test_write_expiry_drops_stale_entries() {
        let manager = CacheManager::in_memory();

        let mut config = CacheConfig::for_name("tokens");
        config.expire_after = Duration::from_millis(150);
        manager.register(config).unwrap();

        manager.put("tokens", "t1", "v").await.unwrap();
        assert!(manager.get("tokens", "t1").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(manager.get("tokens", "t1").await.unwrap(), None);
        assert_eq!(manager.size("tokens").await, 0);
        assert!(manager.stats_for("tokens").expire_count >= 1);
    }

    #[tokio::test]
    async fn test_access_expiry_keeps_hot_entries_alive() {
        let manager = CacheManager::in_memory();

        let mut config = CacheConfig::for_name("tokens");
        config.expire_after = Duration::from_millis(300);
        config.expiry = ExpiryPolicy::AfterAccess;
        manager.register(config).unwrap();

        manager.put("tokens", "hot", "v").await.unwrap();

        // Touched every 100ms the entry lives far beyond 300ms.
        for _ in 0..6 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert!(manager.get("tokens", "hot").await.unwrap().is_some());
        }

        // Left alone it expires.
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(manager.get("tokens", "hot").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_shorter_expiry_applies_to_preserved_entries() {
        let manager = CacheManager::in_memory();
        manager.put("tokens", "t1", "v").await.unwrap();

        let mut config = manager.config_of("tokens").unwrap();
        config.expire_after = Duration::from_millis(150);
        assert!(manager.set_config("tokens", config).await.unwrap());

        assert!(manager.get("tokens", "t1").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(manager.get("tokens", "t1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_zero_expiry_disables_time_eviction() {
        let manager = CacheManager::in_memory();

        let mut config = CacheConfig::for_name("pinned");
        config.expire_after = Duration::ZERO;
        manager.register(config).unwrap();

        manager.put("pinned", "k", "v").await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(manager.get("pinned", "k").await.unwrap().is_some());
    }
}

// =============================================================================
// Durability Tests
// =============================================================================

mod durability_tests {
    use super::*;
    use recache::store::{DurableStore, FsDurableStore, InMemoryDurableStore};
    use recache::ManagerSettings;

    fn durable_config(name: &str) -> CacheConfig {
        let mut config = CacheConfig::for_name(name);
        config.durability_enabled = true;
        config.auto_write_through = true;
        config
    }

    fn memory_overflow() -> Arc<recache::store::InMemoryOverflowStore> {
        Arc::new(recache::store::InMemoryOverflowStore::new())
    }

    #[tokio::test]
    async fn test_restart_reloads_write_through_entries() {
        let store = Arc::new(InMemoryDurableStore::new());

        {
            let manager = CacheManager::new(store.clone(), memory_overflow());
            manager.register(durable_config("sessions")).unwrap();
            manager.put("sessions", "user-1", "alice").await.unwrap();
            manager.put("sessions", "user-2", "bob").await.unwrap();
        }

        let manager = CacheManager::new(store.clone(), memory_overflow());
        manager.register(durable_config("sessions")).unwrap();
        assert_eq!(
            manager.get("sessions", "user-1").await.unwrap(),
            Some(Bytes::from_static(b"alice"))
        );
        assert_eq!(
            manager.get("sessions", "user-2").await.unwrap(),
            Some(Bytes::from_static(b"bob"))
        );
        assert!(store.stats().snapshot_loads >= 1);
    }

    #[tokio::test]
    async fn test_close_saves_snapshot_for_reload() {
        let store = Arc::new(InMemoryDurableStore::new());

        let mut config = CacheConfig::for_name("sessions");
        config.durability_enabled = true;

        {
            // No write-through: only the close-time snapshot persists.
            let manager = CacheManager::new(store.clone(), memory_overflow());
            manager.register(config.clone()).unwrap();
            manager.put("sessions", "k", "v").await.unwrap();
            assert_eq!(store.persisted_len("sessions"), 0);
            manager.close().await;
        }
        assert_eq!(store.persisted_len("sessions"), 1);

        let manager = CacheManager::new(store, memory_overflow());
        manager.register(config).unwrap();
        assert_eq!(
            manager.get("sessions", "k").await.unwrap(),
            Some(Bytes::from_static(b"v"))
        );
    }

    #[tokio::test]
    async fn test_filesystem_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = Arc::new(FsDurableStore::new(dir.path()));
            let manager = CacheManager::new(store, memory_overflow());
            manager.register(durable_config("sessions")).unwrap();
            manager.put("sessions", "user-1", "alice").await.unwrap();
            manager.put("sessions", "user-2", "bob").await.unwrap();
            manager.evict_key("sessions", "user-2").await.unwrap();
        }

        // A fresh store over the same directory sees the surviving entry.
        let store = Arc::new(FsDurableStore::new(dir.path()));
        let persisted = store.load_snapshot("sessions").await.unwrap();
        assert_eq!(persisted.len(), 1);

        let manager = CacheManager::new(store, memory_overflow());
        manager.register(durable_config("sessions")).unwrap();
        assert_eq!(
            manager.get("sessions", "user-1").await.unwrap(),
            Some(Bytes::from_static(b"alice"))
        );
        assert_eq!(manager.get("sessions", "user-2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_scheduled_flush_reaches_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsDurableStore::new(dir.path()));
        let settings = ManagerSettings {
            maintenance_interval: Duration::from_millis(25),
            ..ManagerSettings::default()
        };
        let manager = Arc::new(CacheManager::with_settings(
            settings,
            store.clone(),
            memory_overflow(),
        ));

        let mut config = CacheConfig::for_name("sessions");
        config.durability_enabled = true;
        config.flush_interval = Duration::from_millis(100);
        manager.register(config).unwrap();
        manager.put("sessions", "k", "v").await.unwrap();

        let worker = tokio::spawn(manager.clone().run_maintenance());

        let mut flushed = false;
        for _ in 0..200 {
            if store.stats().snapshot_saves >= 1 {
                flushed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(flushed, "scheduled flush never wrote a snapshot");

        manager.close().await;
        worker.await.unwrap();

        let persisted = store.load_snapshot("sessions").await.unwrap();
        assert_eq!(persisted.len(), 1);
    }
}

// =============================================================================
// Overflow Tests
// =============================================================================

mod overflow_tests {
    use super::*;
    use recache::store::{CompressedOverflowStore, InMemoryDurableStore, OverflowStore};

    fn overflow_config(name: &str) -> CacheConfig {
        let mut config = CacheConfig::for_name(name);
        config.overflow_enabled = true;
        config
    }

    #[tokio::test]
    async fn test_compressed_spill_restores_after_restart() {
        let overflow = Arc::new(CompressedOverflowStore::new());
        let payload = Bytes::from(vec![42u8; 4096]);

        {
            let manager =
                CacheManager::new(Arc::new(InMemoryDurableStore::new()), overflow.clone());
            manager.register(overflow_config("blobs")).unwrap();
            manager.put("blobs", "big", payload.clone()).await.unwrap();
            assert_eq!(manager.spill_all().await, 1);
        }
        assert_eq!(overflow.stats().spills, 1);

        let manager = CacheManager::new(Arc::new(InMemoryDurableStore::new()), overflow);
        manager.register(overflow_config("blobs")).unwrap();
        assert_eq!(manager.get("blobs", "big").await.unwrap(), Some(payload));
    }

    #[tokio::test]
    async fn test_restore_does_not_clobber_newer_entries() {
        let manager = CacheManager::in_memory();
        manager.register(overflow_config("blobs")).unwrap();

        manager.put("blobs", "k", "old").await.unwrap();
        assert!(manager.spill("blobs").await.unwrap());
        manager.put("blobs", "k", "new").await.unwrap();

        // The rebuild restores the spilled copy first, then the live
        // snapshot wins.
        let mut config = manager.config_of("blobs").unwrap();
        config.capacity *= 2;
        manager.set_config("blobs", config).await.unwrap();

        assert_eq!(
            manager.get("blobs", "k").await.unwrap(),
            Some(Bytes::from_static(b"new"))
        );
    }
}

// =============================================================================
// Warmup Tests
// =============================================================================

mod warmup_tests {
    use super::*;
    use async_trait::async_trait;
    use recache::{CacheLoader, Result};

    struct SeedLoader;

    #[async_trait]
    impl CacheLoader for SeedLoader {
        async fn load(&self, _cache_name: &str) -> Result<Vec<(String, Bytes)>> {
            Ok(vec![
                ("k1".to_string(), Bytes::from_static(b"v1")),
                ("k2".to_string(), Bytes::from_static(b"v2")),
            ])
        }
    }

    fn warmup_config(name: &str) -> CacheConfig {
        let mut config = CacheConfig::for_name(name);
        config.warmup_enabled = true;
        config
    }

    #[tokio::test]
    async fn test_loader_fills_cache_in_background() {
        let manager = CacheManager::in_memory();
        manager.register(warmup_config("lookup")).unwrap();
        manager.register_loader("lookup", Arc::new(SeedLoader));

        manager.get_or_create("lookup").await.unwrap();

        let mut warmed = false;
        for _ in 0..200 {
            if manager.size("lookup").await == 2 {
                warmed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(warmed, "warmup loader never filled the cache");
        assert_eq!(
            manager.get("lookup", "k1").await.unwrap(),
            Some(Bytes::from_static(b"v1"))
        );
    }

    #[tokio::test]
    async fn test_warmup_without_loader_builds_cold() {
        let manager = CacheManager::in_memory();
        manager.register(warmup_config("lookup")).unwrap();

        manager.get_or_create("lookup").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.size("lookup").await, 0);
    }
}

// =============================================================================
// Configuration Broadcast Tests
// =============================================================================

mod broadcast_tests {
    use super::*;
    use recache::ConfigChangeNotifier;

    #[tokio::test]
    async fn test_notifier_drives_manager_reconfiguration() {
        let notifier = ConfigChangeNotifier::new();
        let manager = Arc::new(CacheManager::in_memory());
        manager.register(CacheConfig::for_name("sessions")).unwrap();
        manager.put("sessions", "k", "v").await.unwrap();

        notifier.register(manager.clone());

        let mut config = CacheConfig::for_name("sessions");
        config.capacity = 77;
        notifier.notify(&config).await;

        assert_eq!(manager.config_of("sessions").unwrap().capacity, 77);
        assert_eq!(
            manager.get("sessions", "k").await.unwrap(),
            Some(Bytes::from_static(b"v"))
        );
    }

    #[tokio::test]
    async fn test_foreign_names_are_ignored() {
        let notifier = ConfigChangeNotifier::new();
        let manager = Arc::new(CacheManager::in_memory());
        manager.register(CacheConfig::for_name("mine")).unwrap();
        notifier.register(manager.clone());

        notifier.notify(&CacheConfig::for_name("not-mine")).await;
        assert!(!manager.is_registered("not-mine"));
    }

    #[tokio::test]
    async fn test_unregistered_manager_stops_receiving() {
        let notifier = ConfigChangeNotifier::new();
        let manager = Arc::new(CacheManager::in_memory());
        manager.register(CacheConfig::for_name("sessions")).unwrap();

        let id = notifier.register(manager.clone());
        assert!(notifier.unregister(id));

        let mut config = CacheConfig::for_name("sessions");
        config.capacity = 5;
        notifier.notify(&config).await;

        assert_ne!(manager.config_of("sessions").unwrap().capacity, 5);
    }

    #[tokio::test]
    async fn test_managers_apply_only_their_own_names() {
        let notifier = ConfigChangeNotifier::new();
        let left = Arc::new(CacheManager::in_memory());
        let right = Arc::new(CacheManager::in_memory());
        left.register(CacheConfig::for_name("left-cache")).unwrap();
        right.register(CacheConfig::for_name("right-cache")).unwrap();
        notifier.register(left.clone());
        notifier.register(right.clone());

        let mut config = CacheConfig::for_name("left-cache");
        config.capacity = 11;
        notifier.notify(&config).await;

        assert_eq!(left.config_of("left-cache").unwrap().capacity, 11);
        assert!(!right.is_registered("left-cache"));
    }
}

// =============================================================================
// Configuration Store Tests
// =============================================================================

mod config_store_tests {
    use super::*;
    use recache::store::JsonFileConfigStore;

    #[tokio::test]
    async fn test_bootstrap_round_trips_through_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("caches.json");

        {
            let manager = CacheManager::in_memory();
            let store = Arc::new(JsonFileConfigStore::new(&path));
            assert_eq!(manager.bootstrap(store).await.unwrap(), 0);

            let mut config = CacheConfig::for_name("sessions");
            config.capacity = 42;
            manager.set_config("sessions", config).await.unwrap();
        }

        let manager = CacheManager::in_memory();
        let store = Arc::new(JsonFileConfigStore::new(&path));
        assert_eq!(manager.bootstrap(store).await.unwrap(), 1);
        assert!(manager.is_registered("sessions"));
        assert_eq!(manager.config_of("sessions").unwrap().capacity, 42);
    }
}
