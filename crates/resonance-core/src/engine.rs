//! Similarity engine – the entry point for index builds and queries.
//!
//! The [`SimilarityEngine`] owns the configuration, the feature store and an
//! [`IndexRegistry`]. Each engine has its own registry, so independent engines
//! (for example in parallel tests) never share loaded indices.

use std::sync::Arc;

use resonance_db::store::{FeatureStore, SqliteFeatureStore};
use serde::Serialize;
use tracing::{info, warn};

use crate::builder::{build_index, BuildOptions, BuildProgress, BuildSummary};
use crate::config::SimilarityConfig;
use crate::db_adapter::IntoSimilarityResult;
use crate::errors::SimilarityError;
use crate::index::{
    all_index_keys, list_persisted_indices, remove_index_files, IndexKey, PersistedIndex,
};
use crate::query::{
    BulkResult, PairwiseResult, QueryEngine, QueryParams, ResultForm, SimilarRecordings,
};
use crate::registry::IndexRegistry;
use crate::resolver::RecordingRef;

// ============================================================================
// Results
// ============================================================================

/// Outcome of [`SimilarityEngine::build_all`].
#[derive(Debug, Default, Serialize)]
pub struct BuildAllReport {
    /// Indices built and saved.
    pub built: Vec<BuildSummary>,
    /// Indices that failed, with the error message.
    pub failed: Vec<BuildFailure>,
}

/// One failed build in a [`BuildAllReport`].
#[derive(Debug, Serialize)]
pub struct BuildFailure {
    /// The index that failed.
    pub index: IndexKey,
    /// Why it failed.
    pub error: String,
}

// ============================================================================
// SimilarityEngine
// ============================================================================

/// The main engine for Resonance operations.
///
/// # Example
///
/// ```ignore
/// use resonance_core::{SimilarityConfig, SimilarityEngine, RecordingRef, ResultForm};
///
/// let engine = SimilarityEngine::open(SimilarityConfig::load_default()?)?;
/// let params = engine.query_params("mfccs", None, None, Some("10"))?;
/// let recording = "0dad432b-16cc-4bf0-8961-fd31d124b01b".parse()?;
/// let similar = engine.nearest(&params, &recording, ResultForm::Recordings)?;
/// ```
pub struct SimilarityEngine {
    config: SimilarityConfig,
    store: Arc<dyn FeatureStore>,
    registry: Arc<IndexRegistry>,
    queries: QueryEngine,
}

impl SimilarityEngine {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Create an engine over an existing store.
    pub fn new(config: SimilarityConfig, store: Arc<dyn FeatureStore>) -> Self {
        let registry = Arc::new(IndexRegistry::new(
            config.index_dir.clone(),
            config.backend.clone(),
        ));
        let queries = QueryEngine::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            config.placeholder_policy,
            config.query.max_bulk_recordings,
        );
        Self {
            config,
            store,
            registry,
            queries,
        }
    }

    /// Create an engine over the SQLite database at `config.database_path`.
    ///
    /// # Errors
    ///
    /// Returns [`SimilarityError::StoreError`] if the database cannot be opened.
    pub fn open(config: SimilarityConfig) -> Result<Self, SimilarityError> {
        let store = SqliteFeatureStore::open(&config.database_path).into_similarity_result()?;
        Ok(Self::new(config, Arc::new(store)))
    }

    /// The configuration.
    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    /// The feature store.
    pub fn store(&self) -> &Arc<dyn FeatureStore> {
        &self.store
    }

    /// The registry of loaded indices.
    pub fn registry(&self) -> &Arc<IndexRegistry> {
        &self.registry
    }

    // -------------------------------------------------------------------------
    // Builds
    // -------------------------------------------------------------------------

    /// Build options from the configuration.
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions::from_config(&self.config)
    }

    /// Build and save one index. A previously loaded copy is evicted.
    pub fn build_index<F>(
        &self,
        metric: &str,
        options: &BuildOptions,
        on_progress: F,
    ) -> Result<BuildSummary, SimilarityError>
    where
        F: FnMut(&BuildProgress),
    {
        let summary = build_index(self.store.as_ref(), metric, options, on_progress)?;
        self.registry.evict(&summary.index)?;
        Ok(summary)
    }

    /// Build every base index (each base metric × angular/manhattan).
    ///
    /// A failing index is recorded in the report and the rest still run.
    pub fn build_all<F>(
        &self,
        forest_size: usize,
        mut on_progress: F,
    ) -> Result<BuildAllReport, SimilarityError>
    where
        F: FnMut(&IndexKey, &BuildProgress),
    {
        if forest_size == 0 {
            return Err(SimilarityError::InvalidConfiguration {
                message: "forest size must be greater than 0".to_string(),
                hint: "Pass a positive --forest-size".to_string(),
            });
        }

        let base = self.build_options().with_forest_size(forest_size);
        let mut report = BuildAllReport::default();

        for key in all_index_keys(forest_size) {
            let options = base.clone().with_distance(key.distance);
            match self.build_index(&key.metric, &options, |p| on_progress(&key, p)) {
                Ok(summary) => report.built.push(summary),
                Err(e) => {
                    warn!("Failed to build index {}: {}", key, e);
                    report.failed.push(BuildFailure {
                        index: key,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Built {} indices ({} failed)",
            report.built.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Delete a persisted index and evict it from the registry.
    ///
    /// Returns whether an index file was present.
    pub fn remove_index(&self, key: &IndexKey) -> Result<bool, SimilarityError> {
        self.registry.evict(key)?;
        remove_index_files(&self.config.index_dir, key)
    }

    /// Persisted indices in the index directory.
    pub fn list_indices(&self) -> Result<Vec<PersistedIndex>, SimilarityError> {
        list_persisted_indices(&self.config.index_dir)
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Validate and default raw query parameters against the configured limits.
    pub fn query_params(
        &self,
        metric: &str,
        distance: Option<&str>,
        forest_size: Option<&str>,
        neighbours: Option<&str>,
    ) -> Result<QueryParams, SimilarityError> {
        QueryParams::resolve(metric, distance, forest_size, neighbours, &self.config.query)
    }

    /// See [`QueryEngine::nearest`].
    pub fn nearest(
        &self,
        params: &QueryParams,
        recording: &RecordingRef,
        form: ResultForm,
    ) -> Result<SimilarRecordings, SimilarityError> {
        self.queries.nearest(params, recording, form)
    }

    /// See [`QueryEngine::nearest_many`].
    pub fn nearest_many(
        &self,
        params: &QueryParams,
        recordings: &[RecordingRef],
    ) -> Result<BulkResult, SimilarityError> {
        self.queries.nearest_many(params, recordings)
    }

    /// See [`QueryEngine::similarity_between`].
    pub fn similarity_between(
        &self,
        params: &QueryParams,
        recordings: &[RecordingRef],
    ) -> Result<PairwiseResult, SimilarityError> {
        self.queries.similarity_between(params, recordings)
    }
}

impl std::fmt::Debug for SimilarityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityEngine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
