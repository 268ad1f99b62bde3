//! ANN index handle and lifecycle.
//!
//! An [`IndexHandle`] wraps one [`AnnBackend`] and enforces the build-once,
//! read-only-afterwards lifecycle:
//!
//! ```text
//! Unbuilt ──begin_loading──▶ LoadingItems ──build / save──▶ Loaded
//!    │                                                         ▲
//!    └──────────────── build / save / load ────────────────────┘
//! ```
//!
//! Items can only be added in [`IndexState::LoadingItems`]. Queries are only
//! answered in [`IndexState::Loaded`]; any other state is rejected with
//! [`SimilarityError::IndexNotReady`] rather than waited on.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use resonance_db::ann::{
    open_ann_index, AnnBackend, AnnConfig, DistanceType, Neighbour, INDEX_FILE_EXTENSION,
};
use resonance_db::store::FeatureStore;
use resonance_db::DbError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::constants::{
    index_file_name, index_meta_file_name, index_name, BASE_DISTANCES, BASE_METRICS,
};
use crate::db_adapter::from_db_error;
use crate::errors::SimilarityError;

// ============================================================================
// IndexState
// ============================================================================

/// Lifecycle state of an [`IndexHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexState {
    /// Freshly opened, nothing added yet.
    Unbuilt,
    /// Accepting items.
    LoadingItems,
    /// Built, saved or loaded from disk. Read-only.
    Loaded,
}

impl IndexState {
    /// Get the state name used in error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexState::Unbuilt => "unbuilt",
            IndexState::LoadingItems => "loading-items",
            IndexState::Loaded => "loaded",
        }
    }
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// IndexKey
// ============================================================================

/// Identity of one index: `(metric, distance, forest_size)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexKey {
    /// Feature family (also the feature-table column).
    pub metric: String,
    /// Distance type used for ranking.
    pub distance: DistanceType,
    /// Forest size the index is built with.
    pub forest_size: usize,
}

impl IndexKey {
    /// Create a new key.
    pub fn new(metric: impl Into<String>, distance: DistanceType, forest_size: usize) -> Self {
        Self {
            metric: metric.into(),
            distance,
            forest_size,
        }
    }

    /// `{metric}_{distance}_{forest_size}`.
    pub fn name(&self) -> String {
        index_name(&self.metric, self.distance, self.forest_size)
    }

    /// Index file name under the index directory.
    pub fn file_name(&self) -> String {
        index_file_name(&self.metric, self.distance, self.forest_size)
    }

    /// Sidecar metadata file name under the index directory.
    pub fn meta_file_name(&self) -> String {
        index_meta_file_name(&self.metric, self.distance, self.forest_size)
    }

    /// Full path of the index file inside `index_dir`.
    pub fn file_path(&self, index_dir: &Path) -> PathBuf {
        index_dir.join(self.file_name())
    }

    /// Full path of the sidecar inside `index_dir`.
    pub fn meta_path(&self, index_dir: &Path) -> PathBuf {
        index_dir.join(self.meta_file_name())
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for IndexKey {
    type Err = String;

    /// Parse an index name (`mfccs_angular_10`). The metric part may itself
    /// contain underscores; distance and forest size are taken from the right.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.rsplitn(3, '_');
        let forest = parts.next();
        let distance = parts.next();
        let metric = parts.next();

        match (metric, distance, forest) {
            (Some(metric), Some(distance), Some(forest)) if !metric.is_empty() => {
                let distance = distance.parse::<DistanceType>()?;
                let forest_size = forest
                    .parse::<usize>()
                    .map_err(|_| format!("Invalid forest size in index name '{}'", s))?;
                Ok(Self::new(metric, distance, forest_size))
            }
            _ => Err(format!(
                "Index name '{}' is not of the form metric_distance_forest",
                s
            )),
        }
    }
}

/// Every index a full rebuild produces: each base metric × each base distance.
pub fn all_index_keys(forest_size: usize) -> Vec<IndexKey> {
    BASE_METRICS
        .iter()
        .flat_map(|metric| {
            BASE_DISTANCES
                .iter()
                .map(move |distance| IndexKey::new(*metric, *distance, forest_size))
        })
        .collect()
}

// ============================================================================
// IndexMeta
// ============================================================================

/// Sidecar metadata persisted next to each index file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    /// Feature family.
    pub metric: String,
    /// Distance type.
    pub distance: DistanceType,
    /// Forest size.
    pub forest_size: usize,
    /// Vector dimension.
    pub dimension: usize,
    /// Number of item slots (real + placeholder).
    pub item_count: usize,
    /// Ids filled with zero vectors during the build.
    #[serde(default)]
    pub placeholder_ids: Vec<u32>,
    /// When the index was saved.
    pub built_at: DateTime<Utc>,
    /// Backend that wrote the index file.
    pub backend: String,
}

impl IndexMeta {
    /// Write the sidecar as pretty JSON through a temporary sibling file.
    pub fn write(&self, path: &Path) -> Result<(), SimilarityError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut temp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        temp_name.push(".tmp");
        let temp = path.with_file_name(temp_name);

        fs::write(&temp, json).map_err(|e| SimilarityError::VectorIndexIo {
            path: temp.clone(),
            message: format!("Failed to write index metadata: {}", e),
        })?;
        fs::rename(&temp, path).map_err(|e| SimilarityError::VectorIndexIo {
            path: path.to_path_buf(),
            message: format!("Failed to move index metadata into place: {}", e),
        })
    }

    /// Read a sidecar. Returns `Ok(None)` if it does not exist.
    pub fn read(path: &Path) -> Result<Option<Self>, SimilarityError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

/// A persisted index discovered in the index directory.
#[derive(Debug, Clone, Serialize)]
pub struct PersistedIndex {
    /// Parsed key.
    pub key: IndexKey,
    /// Path of the index file.
    pub path: PathBuf,
    /// Size of the index file in bytes.
    pub size_bytes: u64,
    /// Sidecar metadata, when present and readable.
    pub meta: Option<IndexMeta>,
}

/// List every persisted index under `index_dir`, sorted by name.
///
/// A missing directory yields an empty list. Files whose names do not follow
/// the naming convention are skipped.
pub fn list_persisted_indices(index_dir: &Path) -> Result<Vec<PersistedIndex>, SimilarityError> {
    if !index_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in fs::read_dir(index_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(INDEX_FILE_EXTENSION) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let key = match stem.parse::<IndexKey>() {
            Ok(key) => key,
            Err(e) => {
                debug!("Skipping {:?}: {}", path, e);
                continue;
            }
        };

        let meta = match IndexMeta::read(&key.meta_path(index_dir)) {
            Ok(meta) => meta,
            Err(e) => {
                warn!("Unreadable metadata for index {}: {}", key, e);
                None
            }
        };

        found.push(PersistedIndex {
            size_bytes: entry.metadata()?.len(),
            key,
            path,
            meta,
        });
    }

    found.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(found)
}

/// Delete the index file and sidecar for `key`.
///
/// Returns whether an index file was present. Absent files are not an error.
pub fn remove_index_files(index_dir: &Path, key: &IndexKey) -> Result<bool, SimilarityError> {
    let file = key.file_path(index_dir);
    let existed = remove_if_exists(&file)?;
    remove_if_exists(&key.meta_path(index_dir))?;
    if existed {
        info!("Removed index {} from {:?}", key, index_dir);
    }
    Ok(existed)
}

fn remove_if_exists(path: &Path) -> Result<bool, SimilarityError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SimilarityError::VectorIndexIo {
            path: path.to_path_buf(),
            message: format!("Failed to remove: {}", e),
        }),
    }
}

// ============================================================================
// IndexHandle
// ============================================================================

/// Lifecycle guard and persistence naming around one ANN backend.
pub struct IndexHandle {
    key: IndexKey,
    dimension: usize,
    index_dir: PathBuf,
    backend: Box<dyn AnnBackend>,
    state: IndexState,
    placeholder_ids: BTreeSet<u32>,
}

impl fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexHandle")
            .field("key", &self.key)
            .field("dimension", &self.dimension)
            .field("index_dir", &self.index_dir)
            .field("backend", &self.backend.name())
            .field("state", &self.state)
            .field("placeholders", &self.placeholder_ids.len())
            .finish()
    }
}

impl IndexHandle {
    /// Open a handle for `key`.
    ///
    /// The vector dimension is discovered from one stored row of the metric.
    /// Any failure to discover it (unknown column, no rows, store error) is
    /// reported as [`SimilarityError::UnknownMetric`].
    ///
    /// With `load_existing`, the persisted index under `index_dir` is loaded
    /// immediately and the handle starts in [`IndexState::Loaded`].
    pub fn open(
        store: &dyn FeatureStore,
        key: IndexKey,
        index_dir: impl Into<PathBuf>,
        backend: &str,
        load_existing: bool,
    ) -> Result<Self, SimilarityError> {
        let dimension = match store.metric_dimension(&key.metric) {
            Ok(Some(dimension)) => dimension,
            Ok(None) => {
                debug!("No stored vectors for metric '{}'", key.metric);
                return Err(SimilarityError::UnknownMetric(key.metric));
            }
            Err(e) => {
                debug!("Dimension lookup for '{}' failed: {}", key.metric, e);
                return Err(SimilarityError::UnknownMetric(key.metric));
            }
        };

        let config = AnnConfig::new(dimension, key.distance).with_backend(backend);
        let backend = open_ann_index(&config).map_err(from_db_error)?;

        let mut handle = Self {
            key,
            dimension,
            index_dir: index_dir.into(),
            backend,
            state: IndexState::Unbuilt,
            placeholder_ids: BTreeSet::new(),
        };
        debug!(
            "Opened index handle {} (dimension {}, backend {})",
            handle.key,
            dimension,
            handle.backend.name()
        );

        if load_existing {
            handle.load(None)?;
        }
        Ok(handle)
    }

    /// The index key.
    pub fn key(&self) -> &IndexKey {
        &self.key
    }

    /// `{metric}_{distance}_{forest_size}`.
    pub fn name(&self) -> String {
        self.key.name()
    }

    /// Feature family.
    pub fn metric(&self) -> &str {
        &self.key.metric
    }

    /// Vector dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Distance type.
    pub fn distance(&self) -> DistanceType {
        self.key.distance
    }

    /// Forest size, fixed at construction.
    pub fn forest_size(&self) -> usize {
        self.key.forest_size
    }

    /// Current lifecycle state.
    pub fn state(&self) -> IndexState {
        self.state
    }

    /// Canonical index directory.
    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    /// Backend name.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Number of item slots in the backend.
    pub fn len(&self) -> usize {
        self.backend.len()
    }

    /// Whether the backend holds no items.
    pub fn is_empty(&self) -> bool {
        self.backend.is_empty()
    }

    /// Whether an item occupies `id`.
    pub fn contains(&self, id: u32) -> bool {
        self.backend.contains(id)
    }

    /// Ids filled with zero vectors during the build (or read from the sidecar).
    pub fn placeholder_ids(&self) -> &BTreeSet<u32> {
        &self.placeholder_ids
    }

    /// Whether `id` is a gap-filling placeholder.
    pub fn is_placeholder(&self, id: u32) -> bool {
        self.placeholder_ids.contains(&id)
    }

    // ------------------------------------------------------------------------
    // Mutation (LoadingItems only)
    // ------------------------------------------------------------------------

    /// Move from [`IndexState::Unbuilt`] to [`IndexState::LoadingItems`].
    ///
    /// Calling it again while already loading is a no-op.
    pub fn begin_loading(&mut self) -> Result<(), SimilarityError> {
        match self.state {
            IndexState::Unbuilt => {
                self.state = IndexState::LoadingItems;
                Ok(())
            }
            IndexState::LoadingItems => Ok(()),
            IndexState::Loaded => Err(self.immutable()),
        }
    }

    /// Add `vector` at `id`.
    ///
    /// Re-adding an occupied id is a no-op. Returns whether the item was added.
    pub fn add_item(&mut self, id: u32, vector: &[f32]) -> Result<bool, SimilarityError> {
        if self.state != IndexState::LoadingItems {
            return Err(self.immutable());
        }
        if vector.len() != self.dimension {
            return Err(SimilarityError::MalformedVector {
                id,
                reason: format!(
                    "expected dimension {}, got {}",
                    self.dimension,
                    vector.len()
                ),
            });
        }
        if self.backend.contains(id) {
            return Ok(false);
        }

        self.backend.add_item(id, vector).map_err(|e| match e {
            DbError::AlreadyBuilt => self.immutable(),
            other => from_db_error(other),
        })?;
        Ok(true)
    }

    /// Add a zero vector at `id` and record it as a placeholder.
    pub fn add_placeholder(&mut self, id: u32) -> Result<bool, SimilarityError> {
        let zeros = vec![0.0; self.dimension];
        let added = self.add_item(id, &zeros)?;
        if added {
            self.placeholder_ids.insert(id);
        }
        Ok(added)
    }

    /// Add the recording submitted as `(gid, offset)`.
    ///
    /// Silently does nothing when the submission or its vector is absent.
    /// Returns whether an item was added.
    pub fn add_recording_by_submission(
        &mut self,
        store: &dyn FeatureStore,
        gid: &str,
        offset: u32,
    ) -> Result<bool, SimilarityError> {
        if self.state != IndexState::LoadingItems {
            return Err(self.immutable());
        }

        let gid = gid.to_lowercase();
        let Some(id) = store
            .resolve_submission(&gid, offset)
            .map_err(from_db_error)?
        else {
            debug!("No submission ({}, {}); nothing to add", gid, offset);
            return Ok(false);
        };

        match store
            .feature_by_id(&self.key.metric, id)
            .map_err(from_db_error)?
        {
            Some(row) => self.add_item(row.id, &row.vector),
            None => {
                debug!("Recording {} has no {} vector; nothing to add", id, self.key.metric);
                Ok(false)
            }
        }
    }

    /// Add the recording with internal id `id`.
    ///
    /// Fails with [`SimilarityError::NoFeatureRow`] if it has no vector for
    /// this metric.
    pub fn add_recording_by_id(
        &mut self,
        store: &dyn FeatureStore,
        id: u32,
    ) -> Result<bool, SimilarityError> {
        if self.state != IndexState::LoadingItems {
            return Err(self.immutable());
        }

        let row = store
            .feature_by_id(&self.key.metric, id)
            .map_err(from_db_error)?
            .ok_or(SimilarityError::NoFeatureRow { id })?;
        self.add_item(row.id, &row.vector)
    }

    // ------------------------------------------------------------------------
    // Transitions to Loaded
    // ------------------------------------------------------------------------

    /// Build the index with the forest size fixed at construction.
    pub fn build(&mut self) -> Result<(), SimilarityError> {
        if self.state == IndexState::Loaded {
            return Err(self.immutable());
        }
        self.backend
            .build(self.key.forest_size)
            .map_err(from_db_error)?;
        self.state = IndexState::Loaded;
        info!("Built index {} with {} items", self.key, self.backend.len());
        Ok(())
    }

    /// Persist the index under `directory` as `{name or metric}_{distance}_{forest}.idx`.
    ///
    /// The directory is created if needed. An index not yet built is built
    /// first, so only a completed build is ever written. Returns the file path.
    pub fn save(
        &mut self,
        directory: &Path,
        name: Option<&str>,
    ) -> Result<PathBuf, SimilarityError> {
        if !self.backend.is_built() {
            self.build()?;
        }

        fs::create_dir_all(directory).map_err(|e| SimilarityError::VectorIndexIo {
            path: directory.to_path_buf(),
            message: format!("Failed to create index directory: {}", e),
        })?;

        let base = name.unwrap_or(&self.key.metric);
        let path = directory.join(index_file_name(base, self.key.distance, self.key.forest_size));

        // Sidecar before index file: a new index never sits next to stale placeholders.
        let meta = IndexMeta {
            metric: self.key.metric.clone(),
            distance: self.key.distance,
            forest_size: self.key.forest_size,
            dimension: self.dimension,
            item_count: self.backend.len(),
            placeholder_ids: self.placeholder_ids.iter().copied().collect(),
            built_at: Utc::now(),
            backend: self.backend.name().to_string(),
        };
        meta.write(&directory.join(index_meta_file_name(
            base,
            self.key.distance,
            self.key.forest_size,
        )))?;
        self.backend.save(&path).map_err(from_db_error)?;

        self.state = IndexState::Loaded;
        info!("Saved index {} to {:?}", self.key, path);
        Ok(path)
    }

    /// Load `{name or metric}_{distance}_{forest}.idx` from the index directory.
    ///
    /// A missing or corrupt file is reported as [`SimilarityError::IndexNotFound`].
    pub fn load(&mut self, name: Option<&str>) -> Result<(), SimilarityError> {
        let base = name.unwrap_or(&self.key.metric).to_string();
        let path = self.index_dir.join(index_file_name(
            &base,
            self.key.distance,
            self.key.forest_size,
        ));
        let index_name = index_name(&base, self.key.distance, self.key.forest_size);

        if let Err(e) = self.backend.load(&path) {
            debug!("Loading {:?} failed: {}", path, e);
            return Err(SimilarityError::IndexNotFound {
                name: index_name,
                path,
            });
        }

        let meta_path =
            self.index_dir
                .join(index_meta_file_name(&base, self.key.distance, self.key.forest_size));
        self.placeholder_ids = match IndexMeta::read(&meta_path) {
            Ok(Some(meta)) => meta.placeholder_ids.into_iter().collect(),
            Ok(None) => BTreeSet::new(),
            Err(e) => {
                warn!("Ignoring unreadable metadata {:?}: {}", meta_path, e);
                BTreeSet::new()
            }
        };

        self.state = IndexState::Loaded;
        debug!(
            "Loaded index {} ({} items, {} placeholders)",
            index_name,
            self.backend.len(),
            self.placeholder_ids.len()
        );
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Queries (Loaded only)
    // ------------------------------------------------------------------------

    /// Up to `k` nearest neighbours of the item at `id`, closest first.
    ///
    /// The item itself is part of the candidate set.
    pub fn nearest(&self, id: u32, k: usize) -> Result<Vec<Neighbour>, SimilarityError> {
        self.ensure_ready()?;
        self.backend.nearest_by_item(id, k).map_err(from_db_error)
    }

    /// Distance between the items at `a` and `b`.
    pub fn distance_between(&self, a: u32, b: u32) -> Result<f32, SimilarityError> {
        self.ensure_ready()?;
        self.backend.distance_between(a, b).map_err(from_db_error)
    }

    fn ensure_ready(&self) -> Result<(), SimilarityError> {
        if self.state == IndexState::Loaded {
            Ok(())
        } else {
            Err(SimilarityError::IndexNotReady {
                index: self.key.name(),
                state: self.state.to_string(),
            })
        }
    }

    fn immutable(&self) -> SimilarityError {
        SimilarityError::IndexImmutable {
            index: self.key.name(),
            state: self.state.to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
