//! Common constants used throughout resonance-core.
//!
//! This module centralizes metric names, query limits and on-disk naming to
//! keep the builder, the query engine and the CLI consistent.

use resonance_db::ann::{DistanceType, INDEX_FILE_EXTENSION};

// ============================================================================
// Metrics
// ============================================================================

/// Feature families an index can be built for.
///
/// Each name is also the column holding that metric's vectors in the feature
/// table.
pub const BASE_METRICS: &[&str] = &[
    "mfccs",
    "mfccsw",
    "gfccs",
    "gfccsw",
    "key",
    "bpm",
    "onsetrate",
    "moods",
    "instruments",
    "dortmund",
    "rosamerica",
    "tzanetakis",
];

/// Distance types a full rebuild produces for every base metric.
pub const BASE_DISTANCES: &[DistanceType] = &[DistanceType::Angular, DistanceType::Manhattan];

/// Check whether `metric` is one of the [`BASE_METRICS`].
pub fn is_base_metric(metric: &str) -> bool {
    BASE_METRICS.contains(&metric)
}

// ============================================================================
// Query Defaults
// ============================================================================

/// Distance type used when none (or an unrecognized one) is given.
pub const DEFAULT_DISTANCE: DistanceType = DistanceType::Angular;

/// Forest size used when none (or a non-positive one) is given.
pub const DEFAULT_FOREST_SIZE: usize = 10;

/// Neighbour count used when none (or an out-of-range one) is given.
pub const DEFAULT_NEIGHBOURS: usize = 200;

/// Largest neighbour count accepted; larger values fall back to the default.
pub const MAX_NEIGHBOURS: usize = 1000;

/// Maximum number of recordings in one bulk query.
pub const MAX_BULK_RECORDINGS: usize = 25;

/// Number of recordings a pairwise query compares.
pub const PAIRWISE_RECORDINGS: usize = 2;

// ============================================================================
// Build Defaults
// ============================================================================

/// Number of feature rows fetched per page during an index build.
pub const DEFAULT_BATCH_SIZE: usize = 50_000;

// ============================================================================
// Paths
// ============================================================================

/// Directory holding persisted indices, relative to the working directory.
pub const INDEX_DIR_NAME: &str = "annoy_indices";

/// Default SQLite database file, relative to the working directory.
pub const DEFAULT_DATABASE_FILENAME: &str = "resonance.db";

/// The name of the global configuration directory (`~/.resonance`).
pub const RESONANCE_HOME_DIR: &str = ".resonance";

/// Global configuration filename inside [`RESONANCE_HOME_DIR`].
pub const GLOBAL_CONFIG_FILENAME: &str = "config.yaml";

/// Suffix of the sidecar metadata written next to each index file.
pub const INDEX_META_SUFFIX: &str = "meta.json";

/// Index name: `{name}_{distance}_{forest_size}`.
pub fn index_name(name: &str, distance: DistanceType, forest_size: usize) -> String {
    format!("{}_{}_{}", name, distance.as_str(), forest_size)
}

/// Index file name: `{name}_{distance}_{forest_size}.idx`.
pub fn index_file_name(name: &str, distance: DistanceType, forest_size: usize) -> String {
    format!(
        "{}.{}",
        index_name(name, distance, forest_size),
        INDEX_FILE_EXTENSION
    )
}

/// Sidecar file name: `{name}_{distance}_{forest_size}.meta.json`.
pub fn index_meta_file_name(name: &str, distance: DistanceType, forest_size: usize) -> String {
    format!(
        "{}.{}",
        index_name(name, distance, forest_size),
        INDEX_META_SUFFIX
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_naming() {
        assert_eq!(
            index_file_name("mfccs", DistanceType::Angular, 10),
            "mfccs_angular_10.idx"
        );
        assert_eq!(
            index_meta_file_name("bpm", DistanceType::Manhattan, 5),
            "bpm_manhattan_5.meta.json"
        );
    }

    #[test]
    fn test_base_metrics() {
        assert!(is_base_metric("mfccs"));
        assert!(is_base_metric("tzanetakis"));
        assert!(!is_base_metric("nothing"));
        assert!(!is_base_metric("MFCCS"));
    }
}
