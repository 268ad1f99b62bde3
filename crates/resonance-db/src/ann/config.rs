//! ANN index configuration.

use super::traits::DistanceType;
use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Default backend name.
pub const DEFAULT_BACKEND: &str = "exact";

/// File extension of persisted indices.
pub const INDEX_FILE_EXTENSION: &str = "idx";

// ============================================================================
// AnnConfig
// ============================================================================

/// Configuration for creating an empty ANN index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnConfig {
    /// Dimension of vectors in the index.
    pub dimension: usize,

    /// Distance type for ranking.
    #[serde(default)]
    pub distance: DistanceType,

    /// Backend to use (e.g., "exact").
    #[serde(default = "default_backend")]
    pub backend: String,
}

fn default_backend() -> String {
    DEFAULT_BACKEND.to_string()
}

impl AnnConfig {
    /// Create a new config with required fields.
    pub fn new(dimension: usize, distance: DistanceType) -> Self {
        Self {
            dimension,
            distance,
            backend: DEFAULT_BACKEND.to_string(),
        }
    }

    /// Set the backend.
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }
}
