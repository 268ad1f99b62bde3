//! ANN capability traits and core types.
//!
//! This module defines the abstraction every ANN backend implements. The rest
//! of the system only ever talks to [`AnnBackend`], so the search structure
//! itself stays opaque.

use std::path::Path;
use std::str::FromStr;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::error::DbResult;

/// Dense integer position of an item inside an index.
pub type ItemId = u32;

// ============================================================================
// DistanceType
// ============================================================================

/// Vector-space metric used to rank neighbours.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
    Encode, Decode,
)]
#[serde(rename_all = "lowercase")]
pub enum DistanceType {
    /// Angular distance, `sqrt(2 - 2 cos)` (default).
    #[default]
    Angular,
    /// Euclidean (L2) distance.
    Euclidean,
    /// Manhattan (L1) distance.
    Manhattan,
    /// Number of differing components.
    Hamming,
    /// Inner product, higher is closer.
    Dot,
}

impl DistanceType {
    /// Every supported distance type.
    pub const ALL: [DistanceType; 5] = [
        DistanceType::Angular,
        DistanceType::Euclidean,
        DistanceType::Manhattan,
        DistanceType::Hamming,
        DistanceType::Dot,
    ];

    /// Get the distance name as used in index file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceType::Angular => "angular",
            DistanceType::Euclidean => "euclidean",
            DistanceType::Manhattan => "manhattan",
            DistanceType::Hamming => "hamming",
            DistanceType::Dot => "dot",
        }
    }

    /// Ranking key between two vectors: lower means closer.
    ///
    /// For [`DistanceType::Dot`] this is the negated inner product; use
    /// [`DistanceType::reported`] to turn it back into the user-facing value.
    pub fn rank(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceType::Angular => angular_distance(a, b),
            DistanceType::Euclidean => euclidean_distance(a, b),
            DistanceType::Manhattan => manhattan_distance(a, b),
            DistanceType::Hamming => hamming_distance(a, b),
            DistanceType::Dot => -dot_product(a, b),
        }
    }

    /// Convert a ranking key into the value reported to callers.
    pub fn reported(&self, rank: f32) -> f32 {
        match self {
            DistanceType::Dot => -rank,
            _ => rank,
        }
    }
}

impl std::fmt::Display for DistanceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DistanceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "angular" => Ok(Self::Angular),
            "euclidean" => Ok(Self::Euclidean),
            "manhattan" => Ok(Self::Manhattan),
            "hamming" => Ok(Self::Hamming),
            "dot" => Ok(Self::Dot),
            _ => Err(format!(
                "Unknown distance type: '{}'. Use one of: angular, euclidean, manhattan, hamming, dot.",
                s
            )),
        }
    }
}

// ============================================================================
// Neighbour
// ============================================================================

/// A single result from a nearest-neighbour lookup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbour {
    /// Dense id of the matched item.
    pub id: ItemId,

    /// Distance to the query item, as reported by the backend.
    pub distance: f32,
}

impl Neighbour {
    /// Create a new neighbour.
    pub fn new(id: ItemId, distance: f32) -> Self {
        Self { id, distance }
    }
}

// ============================================================================
// AnnBackend Trait
// ============================================================================

/// The opaque vector-index capability.
///
/// ## Implementation Notes
///
/// - Items are addressed by dense integer position; an index over ids
///   `0..=n` allocates `n + 1` slots even if some were never added.
/// - `add_item` on an occupied slot replaces it. Callers that need
///   add-once semantics check [`AnnBackend::contains`] first.
/// - After `build` or `load` the structure is read-only: further `add_item`
///   or `build` calls fail with [`crate::DbError::AlreadyBuilt`].
/// - `nearest_by_item` includes the query item itself when it is indexed.
pub trait AnnBackend: Send + Sync {
    /// Backend name, as recorded in index files and metadata.
    fn name(&self) -> &'static str;

    /// Dimension of vectors in this index.
    fn dimension(&self) -> usize;

    /// Distance type used by this index.
    fn distance_type(&self) -> DistanceType;

    /// Add a vector at the given dense id.
    fn add_item(&mut self, id: ItemId, vector: &[f32]) -> DbResult<()>;

    /// Whether an item occupies the given id.
    fn contains(&self, id: ItemId) -> bool;

    /// Get the stored vector for an id, if any.
    fn item_vector(&self, id: ItemId) -> Option<Vec<f32>>;

    /// Number of allocated slots (highest added id + 1).
    fn len(&self) -> usize;

    /// Check if no item was ever added.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build the search structure. `forest_size` trades build time for quality.
    fn build(&mut self, forest_size: usize) -> DbResult<()>;

    /// Whether the structure was built or loaded.
    fn is_built(&self) -> bool;

    /// Persist a built index to `path`.
    fn save(&self, path: &Path) -> DbResult<()>;

    /// Replace the contents with the index persisted at `path`.
    fn load(&mut self, path: &Path) -> DbResult<()>;

    /// Up to `k` nearest items to the item at `id`, best first.
    fn nearest_by_item(&self, id: ItemId, k: usize) -> DbResult<Vec<Neighbour>>;

    /// Distance between two indexed items.
    fn distance_between(&self, a: ItemId, b: ItemId) -> DbResult<f32>;
}

// ============================================================================
// Distance Functions
// ============================================================================

/// Angular distance between two vectors. Zero-norm vectors sit at `sqrt(2)`.
fn angular_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot = dot_product(a, b);
    let norm_a: f32 = a.iter().map(|x| x * x).sum();
    let norm_b: f32 = b.iter().map(|x| x * x).sum();

    let squared = if norm_a * norm_b > 0.0 {
        2.0 - 2.0 * dot / (norm_a * norm_b).sqrt()
    } else {
        2.0
    };

    squared.max(0.0).sqrt()
}

/// Compute dot product between two vectors.
fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Compute Euclidean (L2) distance between two vectors.
fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

/// Compute Manhattan (L1) distance between two vectors.
fn manhattan_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum()
}

fn hamming_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).filter(|(x, y)| x != y).count() as f32
}

// ============================================================================
// Tests
// ============================================================================
