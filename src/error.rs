//! Error types for the cache manager

use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the cache manager
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // =========================================================================
    // Build Errors
    // =========================================================================
    /// Cache (re)construction failed; no instance was published
    #[error("Failed to build cache '{name}': {source}")]
    CacheBuild {
        name: String,
        #[source]
        source: Box<Error>,
    },

    // =========================================================================
    // Adapter I/O Errors
    // =========================================================================
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Store operation exceeded the adapter timeout
    #[error("Store operation '{op}' timed out for cache '{name}' after {timeout:?}")]
    StoreTimeout {
        name: String,
        op: &'static str,
        timeout: Duration,
    },

    /// Compression failed
    #[error("LZ4 compression failed: {0}")]
    CompressionFailed(String),

    /// Decompression failed
    #[error("LZ4 decompression failed: {0}")]
    DecompressionFailed(String),
}

impl Error {
    /// Wraps an adapter error as a build failure for the named cache.
    pub(crate) fn build_failure(name: &str, source: Error) -> Self {
        Error::CacheBuild {
            name: name.to_string(),
            source: Box::new(source),
        }
    }
}
