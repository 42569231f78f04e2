//! Configuration Store
//!
//! The configuration-persistence collaborator: the manager loads every
//! known cache configuration from it at startup (`bootstrap`) and saves
//! each successfully applied configuration back. The manager does not
//! depend on how or where the records are stored.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::fs;
use tokio::sync::Mutex;

use crate::config::CacheConfig;
use crate::error::Result;

/// Persistence for configuration records
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// All stored configuration records
    async fn load_all(&self) -> Result<Vec<CacheConfig>>;

    /// Insert or update the record for `config.name`
    async fn save(&self, config: &CacheConfig) -> Result<()>;
}

/// In-memory configuration store for testing and embedding
#[derive(Default)]
pub struct InMemoryConfigStore {
    configs: DashMap<String, CacheConfig>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated store.
    pub fn with_configs(configs: impl IntoIterator<Item = CacheConfig>) -> Self {
        let store = Self::new();
        for config in configs {
            store.configs.insert(config.name.clone(), config);
        }
        store
    }

    /// The record currently stored under `name`, if any.
    pub fn saved(&self, name: &str) -> Option<CacheConfig> {
        self.configs.get(name).map(|c| c.value().clone())
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn load_all(&self) -> Result<Vec<CacheConfig>> {
        Ok(self.configs.iter().map(|e| e.value().clone()).collect())
    }

    async fn save(&self, config: &CacheConfig) -> Result<()> {
        self.configs.insert(config.name.clone(), config.clone());
        Ok(())
    }
}

/// Configuration store backed by one JSON file (name -> config map)
pub struct JsonFileConfigStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles on the file
    lock: Mutex<()>,
}

impl JsonFileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn read_map(&self) -> Result<BTreeMap<String, CacheConfig>> {
        match fs::read(&self.path).await {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ConfigStore for JsonFileConfigStore {
    async fn load_all(&self) -> Result<Vec<CacheConfig>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_map().await?.into_values().collect())
    }

    async fn save(&self, config: &CacheConfig) -> Result<()> {
        let _guard = self.lock.lock().await;

        let mut map = self.read_map().await?;
        map.insert(config.name.clone(), config.clone());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let tmp = PathBuf::from(format!("{}.tmp", self.path.display()));
        fs::write(&tmp, serde_json::to_vec_pretty(&map)?).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
