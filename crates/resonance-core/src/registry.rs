//! Registry of loaded indices.
//!
//! Queries share loaded [`IndexHandle`]s through an [`IndexRegistry`] keyed by
//! `(metric, distance, forest_size)`. Only handles in
//! [`IndexState::Loaded`] are ever registered, so every reader sees a
//! read-only index.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use resonance_db::store::FeatureStore;
use tracing::debug;

use crate::errors::SimilarityError;
use crate::index::{IndexHandle, IndexKey, IndexState};

/// Loaded indices shared between queries.
#[derive(Debug)]
pub struct IndexRegistry {
    index_dir: PathBuf,
    backend: String,
    indices: RwLock<HashMap<IndexKey, Arc<IndexHandle>>>,
}

impl IndexRegistry {
    /// Create an empty registry loading from `index_dir` with `backend`.
    pub fn new(index_dir: impl Into<PathBuf>, backend: impl Into<String>) -> Self {
        Self {
            index_dir: index_dir.into(),
            backend: backend.into(),
            indices: RwLock::new(HashMap::new()),
        }
    }

    /// Directory indices are loaded from.
    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    /// The registered handle for `key`, if any.
    pub fn get(&self, key: &IndexKey) -> Result<Option<Arc<IndexHandle>>, SimilarityError> {
        Ok(self.read()?.get(key).cloned())
    }

    /// The registered handle for `key`, loading it from disk on a miss.
    ///
    /// Fails with [`SimilarityError::IndexNotFound`] if no persisted index
    /// matches `key`.
    pub fn get_or_load(
        &self,
        store: &dyn FeatureStore,
        key: &IndexKey,
    ) -> Result<Arc<IndexHandle>, SimilarityError> {
        if let Some(handle) = self.get(key)? {
            debug!("Registry hit for {}", key);
            return Ok(handle);
        }

        debug!("Registry miss for {}, loading from {:?}", key, self.index_dir);
        let handle = IndexHandle::open(store, key.clone(), &self.index_dir, &self.backend, true)?;

        // Another reader may have loaded it meanwhile; keep the first one.
        let mut indices = self.write()?;
        let entry = indices
            .entry(key.clone())
            .or_insert_with(|| Arc::new(handle));
        Ok(Arc::clone(entry))
    }

    /// Register a loaded handle, replacing any previous one for its key.
    ///
    /// Fails with [`SimilarityError::IndexNotReady`] unless the handle is loaded.
    pub fn insert(&self, handle: IndexHandle) -> Result<Arc<IndexHandle>, SimilarityError> {
        if handle.state() != IndexState::Loaded {
            return Err(SimilarityError::IndexNotReady {
                index: handle.name(),
                state: handle.state().to_string(),
            });
        }
        let key = handle.key().clone();
        let handle = Arc::new(handle);
        self.write()?.insert(key.clone(), Arc::clone(&handle));
        debug!("Registered index {}", key);
        Ok(handle)
    }

    /// Remove the handle for `key`. Outstanding `Arc`s stay valid.
    pub fn evict(&self, key: &IndexKey) -> Result<Option<Arc<IndexHandle>>, SimilarityError> {
        let evicted = self.write()?.remove(key);
        if evicted.is_some() {
            debug!("Evicted index {}", key);
        }
        Ok(evicted)
    }

    /// Remove every handle.
    pub fn clear(&self) -> Result<(), SimilarityError> {
        self.write()?.clear();
        Ok(())
    }

    /// Keys of the registered handles, sorted.
    pub fn keys(&self) -> Result<Vec<IndexKey>, SimilarityError> {
        let mut keys: Vec<IndexKey> = self.read()?.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    /// Number of registered handles.
    pub fn len(&self) -> Result<usize, SimilarityError> {
        Ok(self.read()?.len())
    }

    /// Whether no handles are registered.
    pub fn is_empty(&self) -> Result<bool, SimilarityError> {
        Ok(self.read()?.is_empty())
    }

    fn read(
        &self,
    ) -> Result<RwLockReadGuard<'_, HashMap<IndexKey, Arc<IndexHandle>>>, SimilarityError> {
        self.indices.read().map_err(|e| {
            SimilarityError::Other(anyhow::anyhow!(
                "Failed to acquire registry read lock: {}",
                e
            ))
        })
    }

    fn write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<IndexKey, Arc<IndexHandle>>>, SimilarityError> {
        self.indices.write().map_err(|e| {
            SimilarityError::Other(anyhow::anyhow!(
                "Failed to acquire registry write lock: {}",
                e
            ))
        })
    }
}
