//! Batch builder for similarity indices.
//!
//! Populates a fresh [`IndexHandle`] from the feature store, one page at a
//! time in ascending id order, then builds and persists it.
//!
//! ## Dense ids
//!
//! The ANN backend addresses items by dense position, but recordings without a
//! vector for the metric leave holes in the id sequence. Every hole is filled
//! with a zero vector (a *placeholder*) so that after the build the index
//! holds exactly the ids `0..=max_id`:
//!
//! ```text
//! page: [1, 2, 5]      expected: 0
//!   id 1 → placeholder 0, add 1          expected: 2
//!   id 2 → add 2                         expected: 3
//!   id 5 → placeholder 3, 4, add 5       expected: 6
//! ```
//!
//! ## Failure
//!
//! A malformed vector aborts the whole build with
//! [`SimilarityError::MalformedVector`]. Items already added stay in the
//! handle; nothing is written to disk.

use std::path::{Path, PathBuf};

use resonance_db::ann::DistanceType;
use resonance_db::store::{FeatureRow, FeatureStore};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::SimilarityConfig;
use crate::db_adapter::IntoSimilarityResult;
use crate::errors::SimilarityError;
use crate::index::{IndexHandle, IndexKey};

// ============================================================================
// Options and results
// ============================================================================

/// Parameters of one index build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Forest size of the built index.
    pub forest_size: usize,
    /// Distance type of the built index.
    pub distance: DistanceType,
    /// Feature rows fetched per page.
    pub batch_size: usize,
    /// Directory the index is saved to.
    pub index_dir: PathBuf,
    /// ANN backend name.
    pub backend: String,
}

impl BuildOptions {
    /// Options taken from the global configuration.
    pub fn from_config(config: &SimilarityConfig) -> Self {
        Self {
            forest_size: config.query.default_forest_size,
            distance: config.query.default_distance,
            batch_size: config.batch_size,
            index_dir: config.index_dir.clone(),
            backend: config.backend.clone(),
        }
    }

    /// Set the forest size.
    pub fn with_forest_size(mut self, forest_size: usize) -> Self {
        self.forest_size = forest_size;
        self
    }

    /// Set the distance type.
    pub fn with_distance(mut self, distance: DistanceType) -> Self {
        self.distance = distance;
        self
    }

    /// Set the page size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Key of the index these options build for `metric`.
    pub fn key(&self, metric: &str) -> IndexKey {
        IndexKey::new(metric, self.distance, self.forest_size)
    }
}

/// Progress reported after each page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildProgress {
    /// Pages processed so far.
    pub pages: usize,
    /// Real vectors added so far.
    pub processed: u64,
    /// Rows with a vector for the metric when the build started.
    pub total: u64,
}

/// Outcome of a completed build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    /// Built index.
    pub index: IndexKey,
    /// Vector dimension.
    pub dimension: usize,
    /// Item slots in the index (real + placeholders).
    pub items: usize,
    /// Real vectors.
    pub real: u64,
    /// Zero-vector placeholders.
    pub placeholders: u64,
    /// Path of the saved index file.
    pub path: PathBuf,
}

/// Counters from [`populate_index`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopulateStats {
    /// Real vectors added.
    pub real: u64,
    /// Placeholders added.
    pub placeholders: u64,
    /// Pages read.
    pub pages: usize,
}

// ============================================================================
// Gap filling
// ============================================================================

/// Running state of the gap-filling loop.
#[derive(Debug, Default)]
pub struct GapFiller {
    expected: u32,
    stats: PopulateStats,
}

impl GapFiller {
    /// Start at id 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id that must be occupied.
    pub fn expected(&self) -> u32 {
        self.expected
    }

    /// Counters so far.
    pub fn stats(&self) -> PopulateStats {
        self.stats
    }

    /// Add one page of rows, filling any gap before each row.
    ///
    /// Rows within a page may come in any order, but pages must arrive in
    /// ascending id order: a row below [`expected`](Self::expected) whose slot
    /// already holds a placeholder would otherwise be dropped.
    pub fn push_page(
        &mut self,
        handle: &mut IndexHandle,
        rows: &[FeatureRow],
    ) -> Result<(), SimilarityError> {
        let mut ordered: Vec<&FeatureRow> = rows.iter().collect();
        ordered.sort_by_key(|row| row.id);

        for row in ordered {
            while self.expected < row.id {
                if handle.add_placeholder(self.expected)? {
                    self.stats.placeholders += 1;
                }
                self.expected += 1;
            }
            debug_assert!(
                !handle.is_placeholder(row.id),
                "row {} arrived after its slot was filled with a placeholder",
                row.id
            );
            if handle.add_item(row.id, &row.vector)? {
                self.stats.real += 1;
            }
            self.expected = self.expected.max(row.id.saturating_add(1));
        }

        self.stats.pages += 1;
        Ok(())
    }
}

/// Page through `store` and add every vector of the handle's metric.
///
/// The handle is moved into [`IndexState::LoadingItems`](crate::index::IndexState)
/// first. On error, items already added are kept.
pub fn populate_index<F>(
    handle: &mut IndexHandle,
    store: &dyn FeatureStore,
    batch_size: usize,
    mut on_progress: F,
) -> Result<PopulateStats, SimilarityError>
where
    F: FnMut(&BuildProgress),
{
    if batch_size == 0 {
        return Err(SimilarityError::InvalidConfiguration {
            message: "batch size must be greater than 0".to_string(),
            hint: "Pass a positive --batch-size".to_string(),
        });
    }

    handle.begin_loading()?;
    let metric = handle.metric().to_string();
    let total = store.count_with_metric(&metric).into_similarity_result()?;

    let mut filler = GapFiller::new();
    let mut after_id = None;
    loop {
        let page = store
            .fetch_feature_page(&metric, after_id, batch_size)
            .into_similarity_result()?;
        let Some(last) = page.last() else {
            break;
        };
        after_id = Some(last.id);

        filler.push_page(handle, &page)?;
        let stats = filler.stats();
        debug!(
            "{}: page {} done ({} rows, next id {})",
            handle.name(),
            stats.pages,
            page.len(),
            filler.expected()
        );
        on_progress(&BuildProgress {
            pages: stats.pages,
            processed: stats.real,
            total,
        });
    }

    Ok(filler.stats())
}

// ============================================================================
// Build entry point
// ============================================================================

/// Build and save the index for `metric` with `options`.
///
/// `on_progress` is called after every page.
pub fn build_index<F>(
    store: &dyn FeatureStore,
    metric: &str,
    options: &BuildOptions,
    on_progress: F,
) -> Result<BuildSummary, SimilarityError>
where
    F: FnMut(&BuildProgress),
{
    if options.forest_size == 0 {
        return Err(SimilarityError::InvalidConfiguration {
            message: "forest size must be greater than 0".to_string(),
            hint: "Pass a positive --forest-size".to_string(),
        });
    }

    let key = options.key(metric);
    info!(
        "Building index {} (batch size {}, backend {})",
        key, options.batch_size, options.backend
    );

    let mut handle = IndexHandle::open(store, key, &options.index_dir, &options.backend, false)?;
    let stats = populate_index(&mut handle, store, options.batch_size, on_progress)?;

    handle.build()?;
    let path = handle.save(&options.index_dir, None)?;

    info!(
        "Index {} complete: {} vectors, {} placeholders",
        handle.key(),
        stats.real,
        stats.placeholders
    );

    Ok(BuildSummary {
        index: handle.key().clone(),
        dimension: handle.dimension(),
        items: handle.len(),
        real: stats.real,
        placeholders: stats.placeholders,
        path,
    })
}

/// Whether a build for `key` has already been persisted in `index_dir`.
pub fn is_built(index_dir: &Path, key: &IndexKey) -> bool {
    key.file_path(index_dir).is_file()
}

// ============================================================================
// Tests
// ============================================================================
