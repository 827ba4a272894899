//! Write-through cache over the persisted options blob.
//!
//! The store owns the only in-process copy of the options. Reads are served
//! from the cache unless the caller asks for a fresh read; every write goes
//! to the backend first and then replaces the cache while the same lock is
//! held, so concurrent updates cannot interleave.

pub mod backend;

pub use backend::{MemoryBackend, OptionsBackend};

use crate::error::OptionsResult;
use crate::settings::{ConfigMap, PluginSettings};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Current name of the authentication method option
pub const AUTH_METHOD_FIELD: &str = "auth_method";

/// Name the authentication method option was stored under by older releases
pub const LEGACY_METHOD_FIELD: &str = "method";

/// Cached, backend-coherent options for one plugin.
pub struct ConfigStore {
    key: String,
    settings: Arc<dyn PluginSettings>,
    backend: Arc<dyn OptionsBackend>,
    cache: Mutex<Option<ConfigMap>>,
}

impl ConfigStore {
    /// Create a store for the blob persisted under `key`. The cache starts empty.
    pub fn new(
        key: impl Into<String>,
        settings: Arc<dyn PluginSettings>,
        backend: Arc<dyn OptionsBackend>,
    ) -> Self {
        Self {
            key: key.into(),
            settings,
            backend,
            cache: Mutex::new(None),
        }
    }

    /// Persistence key of the options blob
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn settings(&self) -> &dyn PluginSettings {
        self.settings.as_ref()
    }

    /// Whether a previous read or write populated the cache.
    pub async fn is_cached(&self) -> bool {
        self.cache.lock().await.is_some()
    }

    /// Return all options.
    ///
    /// Cache hits never touch the backend. On a miss, or when `fresh` is set,
    /// the blob is read (falling back to the declared defaults when nothing
    /// is stored), legacy fields are migrated, and the result is cached.
    /// Defaults are not persisted by a read.
    pub async fn get_all(&self, fresh: bool) -> OptionsResult<ConfigMap> {
        let mut cache = self.cache.lock().await;
        self.load(&mut cache, fresh).await
    }

    async fn load(
        &self,
        cache: &mut MutexGuard<'_, Option<ConfigMap>>,
        fresh: bool,
    ) -> OptionsResult<ConfigMap> {
        if !fresh {
            if let Some(cached) = &**cache {
                debug!(key = %self.key, "Options cache hit");
                return Ok(cached.clone());
            }
        }

        debug!(key = %self.key, fresh, "Loading options from backend");
        let mut options = match self.backend.read(&self.key).await? {
            Some(stored) => stored,
            None => {
                debug!(key = %self.key, "No stored options, using defaults");
                self.settings.defaults()
            }
        };

        if migrate_legacy_fields(&mut options) {
            info!(
                key = %self.key,
                "Migrated legacy '{}' option to '{}'",
                LEGACY_METHOD_FIELD,
                AUTH_METHOD_FIELD
            );
            self.write_through(cache, options.clone()).await?;
        } else {
            **cache = Some(options.clone());
        }

        Ok(options)
    }

    /// Return a single option, or `default` when the key is not stored.
    ///
    /// A missing key is never written back, neither to the backend nor
    /// to the cache.
    pub async fn get(&self, key: &str, default: Option<Value>) -> OptionsResult<Option<Value>> {
        let options = self.get_all(false).await?;
        Ok(options.get(key).cloned().or(default))
    }

    /// Persist the complete options map and replace the cache with it.
    ///
    /// No merging happens here; callers pass the full intended map.
    pub async fn update(&self, options: ConfigMap) -> OptionsResult<()> {
        let mut cache = self.cache.lock().await;
        self.write_through(&mut cache, options).await
    }

    /// Read, modify and write the options under one lock.
    ///
    /// `modify` receives the current map (cached, or loaded as in
    /// [`get_all`](Self::get_all)) and returns the complete map to persist.
    /// No other read or write of this store can interleave, so concurrent
    /// modifications are applied one after another instead of overwriting
    /// each other. Returns the map that was written.
    pub async fn update_with<F>(&self, modify: F) -> OptionsResult<ConfigMap>
    where
        F: FnOnce(ConfigMap) -> ConfigMap + Send,
    {
        let mut cache = self.cache.lock().await;
        let current = self.load(&mut cache, false).await?;
        let options = modify(current);
        self.write_through(&mut cache, options.clone()).await?;
        Ok(options)
    }

    async fn write_through(
        &self,
        cache: &mut MutexGuard<'_, Option<ConfigMap>>,
        options: ConfigMap,
    ) -> OptionsResult<()> {
        let changed = self.backend.write(&self.key, &options).await?;
        if changed {
            info!(key = %self.key, count = options.len(), "Options saved");
        } else {
            warn!(key = %self.key, "Backend reported no change while saving options");
        }
        **cache = Some(options);
        Ok(())
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Rename `method` to `auth_method` when only the legacy name is present.
///
/// Returns true if the map was changed and needs to be persisted.
pub fn migrate_legacy_fields(options: &mut ConfigMap) -> bool {
    if options.contains_key(AUTH_METHOD_FIELD) {
        return false;
    }

    match options.remove(LEGACY_METHOD_FIELD) {
        Some(method) => {
            options.insert(AUTH_METHOD_FIELD.to_string(), method);
            true
        }
        None => false,
    }
}
