//! Adapter layer for resonance-db infrastructure.
//!
//! This module bridges resonance-db implementations with resonance-core's
//! domain errors.
//!
//! ## Architecture
//!
//! ```text
//! resonance-core domain code (index handle, builder, resolver, query engine)
//!        ↓
//!   db_adapter (this module) - error conversion
//!        ↓
//!     resonance-db implementations (ANN backends, SQLite feature store)
//! ```
//!
//! Call sites that know more context (the index name, the recording id) map
//! errors themselves and only fall back to [`from_db_error`].

use std::path::{Path, PathBuf};

use resonance_db::DbError;

use crate::errors::SimilarityError;

/// Convert a resonance-db error to a resonance-core error.
pub fn from_db_error(err: DbError) -> SimilarityError {
    match err {
        DbError::Io(io_err) => SimilarityError::Io(io_err),

        DbError::Json(json_err) => SimilarityError::Json(json_err),

        DbError::VectorIo { path, message } => SimilarityError::VectorIndexIo { path, message },

        DbError::VectorParse { path, message } => SimilarityError::VectorIndexIo { path, message },

        DbError::DimensionMismatch { expected, actual } => SimilarityError::VectorIndexIo {
            path: PathBuf::new(),
            message: format!("Dimension mismatch: expected {}, got {}", expected, actual),
        },

        DbError::IndexNotFound { path } => SimilarityError::IndexNotFound {
            name: index_name_from_path(&path),
            path,
        },

        DbError::ItemNotFound { id } => SimilarityError::ItemNotIndexed { id },

        DbError::AlreadyBuilt => SimilarityError::IndexImmutable {
            index: "unknown".to_string(),
            state: "loaded".to_string(),
        },

        DbError::NotBuilt => SimilarityError::IndexNotReady {
            index: "unknown".to_string(),
            state: "loading-items".to_string(),
        },

        DbError::MalformedVector { id, reason } => SimilarityError::MalformedVector { id, reason },

        DbError::Store { message } => SimilarityError::StoreError(message),

        DbError::Config { message } => SimilarityError::InvalidConfiguration {
            message,
            hint: "Check the metric name and index settings".to_string(),
        },

        DbError::Internal { message } => SimilarityError::Other(anyhow::anyhow!(message)),
    }
}

/// Extension trait to convert DbResult to Result<T, SimilarityError>.
pub trait IntoSimilarityResult<T> {
    /// Convert a DbResult to a SimilarityError result.
    fn into_similarity_result(self) -> Result<T, SimilarityError>;
}

impl<T> IntoSimilarityResult<T> for resonance_db::DbResult<T> {
    fn into_similarity_result(self) -> Result<T, SimilarityError> {
        self.map_err(from_db_error)
    }
}

fn index_name_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_not_found_carries_name() {
        let err = from_db_error(DbError::IndexNotFound {
            path: PathBuf::from("annoy_indices/mfccs_angular_10.idx"),
        });
        match err {
            SimilarityError::IndexNotFound { name, .. } => assert_eq!(name, "mfccs_angular_10"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_item_and_vector_mapping() {
        assert!(matches!(
            from_db_error(DbError::ItemNotFound { id: 4 }),
            SimilarityError::ItemNotIndexed { id: 4 }
        ));
        assert!(matches!(
            from_db_error(DbError::malformed_vector(9, "bad")),
            SimilarityError::MalformedVector { id: 9, .. }
        ));
        assert!(matches!(
            from_db_error(DbError::store("locked")),
            SimilarityError::StoreError(_)
        ));
    }
}
