//! Query engine: parameter defaulting and the single, bulk and pairwise queries.
//!
//! Every query follows the same order: validate parameters, resolve external
//! identifiers, then touch the index. A request rejected during validation
//! never resolves a recording or opens an index.
//!
//! Single queries surface every failure as a distinct error. Bulk and pairwise
//! queries drop recordings that are unknown or not yet indexed instead.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use resonance_db::ann::DistanceType;
use resonance_db::store::FeatureStore;
use serde::Serialize;
use tracing::{debug, trace};

use crate::config::{PlaceholderPolicy, QueryConfig};
use crate::constants::{is_base_metric, PAIRWISE_RECORDINGS};
use crate::errors::SimilarityError;
use crate::index::{IndexHandle, IndexKey};
use crate::registry::IndexRegistry;
use crate::resolver::{IdentifierResolver, RecordingRef};

// ============================================================================
// QueryParams
// ============================================================================

/// Validated index parameters of a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryParams {
    /// Base metric.
    pub metric: String,
    /// Distance type.
    pub distance: DistanceType,
    /// Forest size.
    pub forest_size: usize,
    /// Number of neighbours to return.
    pub neighbours: usize,
}

impl QueryParams {
    /// Validate `metric` and default every other parameter from `limits`.
    ///
    /// - `distance`: default if absent, empty or not a known distance type.
    /// - `forest_size`: default if absent or not a positive integer.
    /// - `neighbours`: default if absent, not a positive integer, or above
    ///   `limits.max_neighbours` (the default, not the bound, is used).
    ///
    /// Fails with [`SimilarityError::UnknownMetric`] if `metric` is not a base
    /// metric.
    pub fn resolve(
        metric: &str,
        distance: Option<&str>,
        forest_size: Option<&str>,
        neighbours: Option<&str>,
        limits: &QueryConfig,
    ) -> Result<Self, SimilarityError> {
        if !is_base_metric(metric) {
            return Err(SimilarityError::UnknownMetric(metric.to_string()));
        }

        let distance = distance
            .and_then(|d| d.trim().parse::<DistanceType>().ok())
            .unwrap_or(limits.default_distance);

        let forest_size = forest_size
            .and_then(parse_positive)
            .unwrap_or(limits.default_forest_size);

        let neighbours = neighbours
            .and_then(parse_positive)
            .filter(|n| *n <= limits.max_neighbours)
            .unwrap_or(limits.default_neighbours);

        Ok(Self {
            metric: metric.to_string(),
            distance,
            forest_size,
            neighbours,
        })
    }

    /// All defaults for `metric`.
    pub fn with_defaults(metric: &str, limits: &QueryConfig) -> Result<Self, SimilarityError> {
        Self::resolve(metric, None, None, None, limits)
    }

    /// Key of the index these parameters address.
    pub fn key(&self) -> IndexKey {
        IndexKey::new(&self.metric, self.distance, self.forest_size)
    }
}

fn parse_positive(raw: &str) -> Option<usize> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|n| *n > 0)
        .and_then(|n| usize::try_from(n).ok())
}

// ============================================================================
// Results
// ============================================================================

/// Shape of single-query results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResultForm {
    /// External `(gid, offset)` identifiers.
    #[default]
    Recordings,
    /// Raw internal ids.
    Ids,
}

/// Neighbours of one recording, closest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SimilarRecordings {
    /// External identifiers. Ids without a submission are omitted.
    Recordings(Vec<RecordingRef>),
    /// Internal ids.
    Ids(Vec<u32>),
}

impl SimilarRecordings {
    /// Number of neighbours.
    pub fn len(&self) -> usize {
        match self {
            Self::Recordings(r) => r.len(),
            Self::Ids(ids) => ids.len(),
        }
    }

    /// Whether there are no neighbours.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `gid → offset → neighbours`.
pub type BulkResult = BTreeMap<String, BTreeMap<String, Vec<RecordingRef>>>;

/// `metric → distance`; empty when either side is unknown or not indexed.
pub type PairwiseResult = BTreeMap<String, f32>;

// ============================================================================
// QueryEngine
// ============================================================================

/// Answers similarity queries against loaded indices.
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<dyn FeatureStore>,
    resolver: IdentifierResolver,
    registry: Arc<IndexRegistry>,
    policy: PlaceholderPolicy,
    max_bulk_recordings: usize,
}

impl QueryEngine {
    /// Create an engine over `store`, loading indices through `registry`.
    pub fn new(
        store: Arc<dyn FeatureStore>,
        registry: Arc<IndexRegistry>,
        policy: PlaceholderPolicy,
        max_bulk_recordings: usize,
    ) -> Self {
        Self {
            resolver: IdentifierResolver::new(Arc::clone(&store)),
            store,
            registry,
            policy,
            max_bulk_recordings,
        }
    }

    /// The identifier resolver.
    pub fn resolver(&self) -> &IdentifierResolver {
        &self.resolver
    }

    /// Up to `params.neighbours` recordings most similar to `recording`.
    ///
    /// # Errors
    ///
    /// - [`SimilarityError::NoSubmission`] if the recording does not exist.
    /// - [`SimilarityError::IndexNotFound`] if no index matches `params`.
    /// - [`SimilarityError::ItemNotIndexed`] if the recording is not in the index.
    pub fn nearest(
        &self,
        params: &QueryParams,
        recording: &RecordingRef,
        form: ResultForm,
    ) -> Result<SimilarRecordings, SimilarityError> {
        let id = self.resolver.resolve_to_id(&recording.gid, recording.offset)?;
        let index = self.index(params)?;
        let ids = self.neighbour_ids(&index, id, params.neighbours)?;

        match form {
            ResultForm::Ids => Ok(SimilarRecordings::Ids(ids)),
            ResultForm::Recordings => Ok(SimilarRecordings::Recordings(self.to_recordings(&ids)?)),
        }
    }

    /// Neighbours of each of `recordings`.
    ///
    /// Recordings that do not exist or are not indexed are left out of the
    /// result.
    ///
    /// # Errors
    ///
    /// - [`SimilarityError::TooManyRecordings`] above the bulk cap, before any
    ///   resolution.
    /// - [`SimilarityError::IndexNotFound`] if no index matches `params`.
    pub fn nearest_many(
        &self,
        params: &QueryParams,
        recordings: &[RecordingRef],
    ) -> Result<BulkResult, SimilarityError> {
        if recordings.len() > self.max_bulk_recordings {
            return Err(SimilarityError::TooManyRecordings {
                count: recordings.len(),
                max: self.max_bulk_recordings,
            });
        }

        let mut resolved = Vec::with_capacity(recordings.len());
        for recording in recordings {
            match self.resolver.try_resolve(recording)? {
                Some(id) => resolved.push((recording, id)),
                None => debug!("Dropping unknown recording {}", recording),
            }
        }

        let index = self.index(params)?;
        let mut result = BulkResult::new();
        for (recording, id) in resolved {
            let ids = match self.neighbour_ids(&index, id, params.neighbours) {
                Ok(ids) => ids,
                Err(SimilarityError::ItemNotIndexed { .. }) => {
                    debug!("Dropping unindexed recording {}", recording);
                    continue;
                }
                Err(e) => return Err(e),
            };
            let similar = self.to_recordings(&ids)?;
            result
                .entry(recording.gid.clone())
                .or_default()
                .insert(recording.offset.to_string(), similar);
        }

        Ok(result)
    }

    /// Distance between exactly two recordings, keyed by metric.
    ///
    /// Returns an empty result when either recording does not exist or is
    /// not indexed.
    ///
    /// # Errors
    ///
    /// - [`SimilarityError::RecordingCountMismatch`] unless given two recordings.
    /// - [`SimilarityError::IndexNotFound`] if no index matches `params`.
    pub fn similarity_between(
        &self,
        params: &QueryParams,
        recordings: &[RecordingRef],
    ) -> Result<PairwiseResult, SimilarityError> {
        let [first, second] = recordings else {
            return Err(SimilarityError::RecordingCountMismatch {
                expected: PAIRWISE_RECORDINGS,
                actual: recordings.len(),
            });
        };

        let (Some(a), Some(b)) = (
            self.resolver.try_resolve(first)?,
            self.resolver.try_resolve(second)?,
        ) else {
            debug!("Pairwise query with an unknown recording; empty result");
            return Ok(PairwiseResult::new());
        };

        let index = self.index(params)?;
        if !self.is_queryable(&index, a) || !self.is_queryable(&index, b) {
            debug!("Pairwise query with an unindexed recording; empty result");
            return Ok(PairwiseResult::new());
        }

        let mut result = PairwiseResult::new();
        match index.distance_between(a, b) {
            Ok(distance) => {
                result.insert(params.metric.clone(), distance);
            }
            Err(SimilarityError::ItemNotIndexed { .. }) => {}
            Err(e) => return Err(e),
        }
        Ok(result)
    }

    fn index(&self, params: &QueryParams) -> Result<Arc<IndexHandle>, SimilarityError> {
        self.registry.get_or_load(self.store.as_ref(), &params.key())
    }

    fn is_queryable(&self, index: &IndexHandle, id: u32) -> bool {
        index.contains(id)
            && !(self.policy == PlaceholderPolicy::Exclude && index.is_placeholder(id))
    }

    /// Ranked neighbour ids of `id`, without `id` itself and, under
    /// [`PlaceholderPolicy::Exclude`], without placeholders.
    fn neighbour_ids(
        &self,
        index: &IndexHandle,
        id: u32,
        k: usize,
    ) -> Result<Vec<u32>, SimilarityError> {
        if !self.is_queryable(index, id) {
            return Err(SimilarityError::ItemNotIndexed { id });
        }

        let excluded: HashSet<u32> = match self.policy {
            PlaceholderPolicy::Include => HashSet::new(),
            PlaceholderPolicy::Exclude => index.placeholder_ids().iter().copied().collect(),
        };

        let ids: Vec<u32> = index
            .nearest(id, k + 1 + excluded.len())?
            .into_iter()
            .map(|n| n.id)
            .filter(|n| *n != id && !excluded.contains(n))
            .take(k)
            .collect();

        trace!("{} neighbours for id {} in {}", ids.len(), id, index.key());
        Ok(ids)
    }

    /// Map ids to recordings, keeping ranking order.
    fn to_recordings(&self, ids: &[u32]) -> Result<Vec<RecordingRef>, SimilarityError> {
        let mut known = self.resolver.resolve_many_from_ids(ids)?;
        Ok(ids.iter().filter_map(|id| known.remove(id)).collect())
    }
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("registry", &self.registry)
            .field("policy", &self.policy)
            .field("max_bulk_recordings", &self.max_bulk_recordings)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
