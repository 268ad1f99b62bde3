//! Shared fixtures for unit tests.

use std::path::Path;

use resonance_db::ann::DistanceType;
use resonance_db::store::SqliteFeatureStore;

use crate::builder::{build_index, BuildOptions};
use crate::config::SimilarityConfig;
use crate::constants::BASE_METRICS;
use crate::index::IndexKey;

pub const GID_A: &str = "0dad432b-16cc-4bf0-8961-fd31d124b01b";
pub const GID_B: &str = "c5f4909e-1d7b-4f15-a6f6-1af376bc01c9";
pub const GID_C: &str = "7f27d7a9-27f0-4663-9d20-2c9c40200e6d";

/// In-memory store with four submissions:
///
/// | id | gid   | offset | mfccs     | bpm   |
/// |----|-------|--------|-----------|-------|
/// | 1  | GID_A | 0      | [1, 0, 0] | [120] |
/// | 2  | GID_A | 1      | [0, 1, 0] | [128] |
/// | 3  | GID_B | 0      | -         | [90]  |
/// | 4  | GID_C | 0      | [1, 1, 0] | [100] |
///
/// Every other base metric column exists but is empty.
pub fn seeded_store() -> SqliteFeatureStore {
    let store = SqliteFeatureStore::open_in_memory().unwrap();
    store.init_schema(BASE_METRICS).unwrap();

    let rows: [(&str, u32, Option<[f32; 3]>, f32); 4] = [
        (GID_A, 0, Some([1.0, 0.0, 0.0]), 120.0),
        (GID_A, 1, Some([0.0, 1.0, 0.0]), 128.0),
        (GID_B, 0, None, 90.0),
        (GID_C, 0, Some([1.0, 1.0, 0.0]), 100.0),
    ];
    for (gid, offset, mfccs, bpm) in rows {
        let row = store.insert_submission(gid, Some(offset)).unwrap();
        if let Some(vector) = mfccs {
            store.set_feature(row.id, "mfccs", &vector).unwrap();
        }
        store.set_feature(row.id, "bpm", &[bpm]).unwrap();
    }
    store
}

/// Build and save the `metric` index at forest size 10 into `dir`.
pub fn build_test_index(
    store: &SqliteFeatureStore,
    dir: &Path,
    metric: &str,
    distance: DistanceType,
) -> IndexKey {
    let options = BuildOptions::from_config(&SimilarityConfig::default().with_index_dir(dir))
        .with_distance(distance)
        .with_forest_size(10);
    build_index(store, metric, &options, |_| {}).unwrap().index
}
