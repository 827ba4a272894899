//! Persistence collaborators for the options blob.

use crate::error::OptionsResult;
use crate::settings::ConfigMap;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Key/value persistence for whole options blobs.
///
/// Failures are surfaced to the caller as-is; nothing in this crate
/// retries a read or a write.
#[async_trait]
pub trait OptionsBackend: Send + Sync {
    /// Load the blob stored under `key`, or `None` if nothing was ever saved.
    async fn read(&self, key: &str) -> OptionsResult<Option<ConfigMap>>;

    /// Replace the blob stored under `key`.
    ///
    /// Returns false when the backend accepted the call but changed nothing.
    async fn write(&self, key: &str, options: &ConfigMap) -> OptionsResult<bool>;
}

/// In-memory backend used for development and tests.
///
/// Counts calls so cache behaviour can be asserted on.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    blobs: DashMap<String, ConfigMap>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a blob without counting it as a write.
    pub fn with_blob(self, key: &str, options: ConfigMap) -> Self {
        self.blobs.insert(key.to_string(), options);
        self
    }

    /// Inspect a stored blob without counting it as a read.
    pub fn stored(&self, key: &str) -> Option<ConfigMap> {
        self.blobs.get(key).map(|entry| entry.value().clone())
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OptionsBackend for MemoryBackend {
    async fn read(&self, key: &str) -> OptionsResult<Option<ConfigMap>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.stored(key))
    }

    async fn write(&self, key: &str, options: &ConfigMap) -> OptionsResult<bool> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let previous = self.blobs.insert(key.to_string(), options.clone());
        Ok(previous.as_ref() != Some(options))
    }
}
