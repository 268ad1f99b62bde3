//! # resonance-core
//!
//! **Resonance** – audio-recording similarity core library.
//!
//! This crate provides the domain logic for building nearest-neighbour indices
//! over per-recording feature vectors and answering similarity queries against
//! them. It is designed to be consumed by the `resonance` CLI and other Rust
//! tools (for example an HTTP API layer).
//!
//! ## Main Types
//!
//! - [`SimilarityEngine`] – the main entry point for builds and queries
//! - [`IndexHandle`] – one index and its build-once lifecycle
//! - [`SimilarityError`] – domain-specific error type
//!
//! ## Modules
//!
//! - [`builder`] – gap-filling batch builder
//! - [`config`] – configuration types (SimilarityConfig, QueryConfig)
//! - [`index`] – index handle, lifecycle state and on-disk naming
//! - [`query`] – parameter defaulting and the single/bulk/pairwise queries
//! - [`registry`] – loaded indices shared between queries
//! - [`resolver`] – `(gid, offset)` ↔ internal id mapping
//!
//! ## Example
//!
//! ```ignore
//! use resonance_core::{SimilarityConfig, SimilarityEngine, ResultForm};
//!
//! let engine = SimilarityEngine::open(SimilarityConfig::load_default()?)?;
//!
//! // Build the mfccs index with the configured defaults
//! let summary = engine.build_index("mfccs", &engine.build_options(), |_| {})?;
//! println!("{} items", summary.items);
//!
//! // Query it
//! let params = engine.query_params("mfccs", Some("angular"), None, Some("10"))?;
//! let recording = "0dad432b-16cc-4bf0-8961-fd31d124b01b:0".parse()?;
//! let similar = engine.nearest(&params, &recording, ResultForm::Recordings)?;
//! ```

// Modules
pub mod builder;
pub mod config;
pub mod constants;
pub mod db_adapter;
pub mod engine;
pub mod errors;
pub mod import;
pub mod index;
pub mod query;
pub mod registry;
pub mod resolver;

#[cfg(test)]
mod test_support;

// Re-exports for convenience
pub use builder::{
    build_index, populate_index, BuildOptions, BuildProgress, BuildSummary, GapFiller,
    PopulateStats,
};
pub use config::{PlaceholderPolicy, QueryConfig, SimilarityConfig};
pub use constants::{
    is_base_metric, BASE_DISTANCES, BASE_METRICS, DEFAULT_BATCH_SIZE, DEFAULT_DISTANCE,
    DEFAULT_FOREST_SIZE, DEFAULT_NEIGHBOURS, GLOBAL_CONFIG_FILENAME, INDEX_DIR_NAME,
    MAX_BULK_RECORDINGS, MAX_NEIGHBOURS, RESONANCE_HOME_DIR,
};
pub use engine::{BuildAllReport, BuildFailure, SimilarityEngine};
pub use errors::SimilarityError;
pub use import::{import_records, init_database, ImportRecord, ImportSummary};
pub use index::{
    all_index_keys, list_persisted_indices, remove_index_files, IndexHandle, IndexKey, IndexMeta,
    IndexState, PersistedIndex,
};
pub use query::{
    BulkResult, PairwiseResult, QueryEngine, QueryParams, ResultForm, SimilarRecordings,
};
pub use registry::IndexRegistry;
pub use resolver::{parse_recording_list, IdentifierResolver, RecordingRef};

// Infrastructure types that appear in the public API
pub use resonance_db::ann::{DistanceType, Neighbour};
pub use resonance_db::store::{FeatureRow, FeatureStore, RecordingRow, SqliteFeatureStore};
