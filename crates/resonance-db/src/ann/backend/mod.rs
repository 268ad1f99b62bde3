//! ANN backend implementations.
//!
//! ## Available Backends
//!
//! - `exact` (default): brute-force scan with exact ranking

#[cfg(feature = "exact")]
mod exact;

#[cfg(feature = "exact")]
pub use exact::ExactScanIndex;

use super::config::{AnnConfig, DEFAULT_BACKEND};
use super::traits::AnnBackend;
use crate::error::{DbError, DbResult};
use tracing::debug;

/// Create an empty ANN index with the given configuration.
///
/// The returned index accepts items until it is built or loaded.
///
/// # Errors
///
/// Returns an error if:
/// - The dimension is zero
/// - The backend is not supported or its feature is disabled
pub fn open_ann_index(config: &AnnConfig) -> DbResult<Box<dyn AnnBackend>> {
    debug!(
        "Opening {} ANN index (dimension={}, distance={})",
        config.backend, config.dimension, config.distance
    );

    if config.dimension == 0 {
        return Err(DbError::config("ANN index dimension must be positive"));
    }

    match config.backend.as_str() {
        #[cfg(feature = "exact")]
        "exact" => Ok(Box::new(ExactScanIndex::new(
            config.dimension,
            config.distance,
        ))),

        backend if backend == DEFAULT_BACKEND => Err(DbError::Internal {
            message: format!(
                "Backend '{}' is not available (feature not enabled)",
                backend
            ),
        }),

        backend => Err(DbError::Internal {
            message: format!(
                "Unknown backend: '{}'. Available backends: {}",
                backend,
                available_backends().join(", ")
            ),
        }),
    }
}

/// Get a list of available backend names.
#[allow(clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<&'static str> {
    let mut backends = Vec::new();

    #[cfg(feature = "exact")]
    backends.push("exact");

    backends
}

// ============================================================================
// Tests
// ============================================================================
