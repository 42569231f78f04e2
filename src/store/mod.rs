//! Storage Adapters
//!
//! Pluggable backends around the in-memory caches:
//!
//! - [`DurableStore`]: per-cache persistent key/value mirror, used for
//!   write-through and warm start (`InMemoryDurableStore` for tests and
//!   embedding, `FsDurableStore` for on-disk persistence).
//! - [`OverflowStore`]: per-cache secondary store for spilling entries
//!   out of primary memory and restoring them later
//!   (`CompressedOverflowStore` keeps spilled values LZ4-compacted).
//! - [`ConfigStore`]: the configuration-record collaborator the manager
//!   bootstraps from and saves applied configurations to.
//!
//! Adapters never own cache data: the in-memory instance is the source
//! of truth and every backend must tolerate being wiped and rebuilt
//! from it.

pub mod config;
pub mod durable;
pub mod fs;
pub mod overflow;

pub use config::{ConfigStore, InMemoryConfigStore, JsonFileConfigStore};
pub use durable::{DurableStore, DurableStoreStats, InMemoryDurableStore};
pub use fs::FsDurableStore;
pub use overflow::{
    CompressedOverflowStore, InMemoryOverflowStore, OverflowStore, OverflowStoreStats,
};
