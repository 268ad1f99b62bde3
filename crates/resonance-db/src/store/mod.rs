//! Relational feature store module for resonance-db.
//!
//! The feature store holds two tables: submissions (`lowlevel`: internal id →
//! global id + submission offset) and per-metric feature vectors
//! (`similarity`: internal id → one nullable vector column per metric).
//!
//! ## Available Stores
//!
//! - `sqlite` (default): SQLite via `rusqlite`, vectors stored as JSON arrays

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteFeatureStore;

use serde::{Deserialize, Serialize};

use crate::error::DbResult;

/// A feature vector for one recording and one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Internal dense id of the recording.
    pub id: u32,

    /// The metric's feature vector.
    pub vector: Vec<f32>,
}

impl FeatureRow {
    /// Create a new feature row.
    pub fn new(id: u32, vector: Vec<f32>) -> Self {
        Self { id, vector }
    }
}

/// External identity of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordingRow {
    /// Internal dense id.
    pub id: u32,

    /// Global identifier (lower-case UUID string).
    pub gid: String,

    /// Submission offset for the global identifier.
    pub offset: u32,
}

/// Read access to feature vectors and submission identifiers.
///
/// ## Implementation Notes
///
/// - Implementations must be thread-safe (`Send + Sync`).
/// - Global identifiers are compared case-insensitively.
/// - Pages are returned in ascending id order and skip recordings whose
///   vector for the metric has not been computed yet.
pub trait FeatureStore: Send + Sync {
    /// Dimension of the metric, taken from one stored vector.
    ///
    /// Returns `Ok(None)` when the metric exists but no vector was stored yet,
    /// and an error when the metric column does not exist.
    fn metric_dimension(&self, metric: &str) -> DbResult<Option<usize>>;

    /// Highest internal id known to the feature table.
    fn max_id(&self) -> DbResult<Option<u32>>;

    /// Number of recordings with a computed vector for the metric.
    fn count_with_metric(&self, metric: &str) -> DbResult<u64>;

    /// Up to `limit` feature rows with id greater than `after_id`, ascending.
    fn fetch_feature_page(
        &self,
        metric: &str,
        after_id: Option<u32>,
        limit: usize,
    ) -> DbResult<Vec<FeatureRow>>;

    /// Feature row of a single recording, if its vector exists.
    fn feature_by_id(&self, metric: &str, id: u32) -> DbResult<Option<FeatureRow>>;

    /// Internal id of the `(gid, offset)` submission.
    fn resolve_submission(&self, gid: &str, offset: u32) -> DbResult<Option<u32>>;

    /// External identities of the given ids. Unknown ids are omitted.
    fn recordings_by_ids(&self, ids: &[u32]) -> DbResult<Vec<RecordingRow>>;
}
