//! Error types for resonance-core.

use std::path::PathBuf;

use thiserror::Error;

/// Domain-specific errors for similarity operations.
#[derive(Error, Debug)]
pub enum SimilarityError {
    // =========================================================================
    // Index Lifecycle Errors
    // =========================================================================
    /// No feature family with this name exists, or its dimension could not be
    /// discovered from the feature store.
    #[error("An index with the specified metric does not exist: `{0}`.")]
    UnknownMetric(String),

    /// No persisted index matches the (metric, distance, forest size) triple,
    /// or the file could not be read.
    #[error("Index does not exist with specified parameters: `{name}` (looked in `{path}`).")]
    IndexNotFound {
        /// The index name, `{metric}_{distance}_{forest_size}`.
        name: String,
        /// Path of the expected index file.
        path: PathBuf,
    },

    /// An add was attempted on an index that is not accepting items.
    #[error("Cannot add items to index `{index}` in state `{state}`.")]
    IndexImmutable {
        /// The index name.
        index: String,
        /// The lifecycle state the handle was in.
        state: String,
    },

    /// A query was issued against an index that has not been built or loaded.
    #[error("Index `{index}` is not ready for queries (state `{state}`).")]
    IndexNotReady {
        /// The index name.
        index: String,
        /// The lifecycle state the handle was in.
        state: String,
    },

    /// A feature vector has the wrong dimension or non-numeric data.
    #[error("Malformed feature vector for recording id {id}: {reason}")]
    MalformedVector {
        /// Internal id of the offending recording.
        id: u32,
        /// What was wrong with the vector.
        reason: String,
    },

    /// The feature table has no vector for this internal id.
    #[error("No feature vector stored for recording id {id}.")]
    NoFeatureRow {
        /// Internal id of the recording.
        id: u32,
    },

    // =========================================================================
    // Resolution Errors
    // =========================================================================
    /// The (global id, offset) pair has no submission.
    #[error("No submission exists for the given (MBID, offset) combination: ({gid}, {offset}).")]
    NoSubmission {
        /// The lower-cased global id.
        gid: String,
        /// The submission offset.
        offset: u32,
    },

    /// The recording exists but is not present in the loaded index.
    #[error("The submission of interest is not indexed (recording id {id}).")]
    ItemNotIndexed {
        /// Internal id of the recording.
        id: u32,
    },

    /// A recording identifier could not be parsed.
    #[error("Invalid recording identifier `{input}`: {reason}")]
    InvalidRecordingId {
        /// The raw input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    // =========================================================================
    // Query Shape Errors
    // =========================================================================
    /// Bulk query exceeds the recording cap.
    #[error("More than {max} recordings not allowed per request (got {count}).")]
    TooManyRecordings {
        /// Number of recordings requested.
        count: usize,
        /// The cap.
        max: usize,
    },

    /// Pairwise query did not receive exactly the expected number of recordings.
    #[error("Does not contain {expected} recordings in the request (got {actual}).")]
    RecordingCountMismatch {
        /// Required number of recordings.
        expected: usize,
        /// Number received.
        actual: usize,
    },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Global configuration file is invalid.
    #[error("Global config invalid: {0}")]
    InvalidGlobalConfig(String),

    /// A configuration value is invalid.
    #[error("Invalid configuration: {message}. {hint}")]
    InvalidConfiguration {
        /// Description of the invalid configuration.
        message: String,
        /// Actionable hint on how to fix it.
        hint: String,
    },

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Relational store failure.
    #[error("Feature store error: {0}")]
    StoreError(String),

    /// Index file I/O failure outside of load (e.g. save, remove).
    #[error("Vector index I/O error at `{path}`: {message}")]
    VectorIndexIo {
        /// Path to the index file or directory.
        path: PathBuf,
        /// Description of the I/O error.
        message: String,
    },

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A wrapped generic error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SimilarityError {
    /// Whether this error is a caller mistake (as opposed to an operational
    /// failure). API layers map these to "bad request" style responses.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownMetric(_)
                | Self::IndexNotFound { .. }
                | Self::NoSubmission { .. }
                | Self::ItemNotIndexed { .. }
                | Self::InvalidRecordingId { .. }
                | Self::TooManyRecordings { .. }
                | Self::RecordingCountMismatch { .. }
        )
    }
}
