//! Seeding the feature store from JSON Lines.
//!
//! Each non-blank line registers one submission and its feature vectors:
//!
//! ```json
//! {"gid": "0dad432b-16cc-4bf0-8961-fd31d124b01b", "offset": 0, "features": {"mfccs": [1.0, 0.5], "bpm": [120.0]}}
//! ```
//!
//! `offset` is optional; the next free offset for the gid is used when absent.

use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

use anyhow::Context;
use resonance_db::store::SqliteFeatureStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::constants::{is_base_metric, BASE_METRICS};
use crate::db_adapter::IntoSimilarityResult;
use crate::errors::SimilarityError;

/// One line of an import file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRecord {
    /// Global id (UUID, any case).
    pub gid: String,
    /// Submission offset.
    #[serde(default)]
    pub offset: Option<u32>,
    /// Vectors keyed by base metric.
    #[serde(default)]
    pub features: BTreeMap<String, Vec<f32>>,
}

/// Counters from [`import_records`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Submissions inserted.
    pub submissions: usize,
    /// Feature vectors stored.
    pub vectors: usize,
}

/// Open (or create) the database at `path` with every base metric column.
pub fn init_database(path: &Path) -> Result<SqliteFeatureStore, SimilarityError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let store = SqliteFeatureStore::open(path).into_similarity_result()?;
    store.init_schema(BASE_METRICS).into_similarity_result()?;
    info!("Initialized feature store at {:?}", path);
    Ok(store)
}

/// Insert every record read from `reader` into `store`.
///
/// Stops at the first invalid line; lines before it stay imported.
pub fn import_records<R: BufRead>(
    store: &SqliteFeatureStore,
    reader: R,
) -> Result<ImportSummary, SimilarityError> {
    let mut summary = ImportSummary::default();

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let record: ImportRecord = serde_json::from_str(&line)
            .with_context(|| format!("Invalid import record on line {}", line_no))?;
        import_record(store, &record)
            .map_err(|e| anyhow::anyhow!("Line {}: {}", line_no, e))?;

        summary.submissions += 1;
        summary.vectors += record.features.len();
    }

    debug!(
        "Imported {} submissions, {} vectors",
        summary.submissions, summary.vectors
    );
    Ok(summary)
}

fn import_record(store: &SqliteFeatureStore, record: &ImportRecord) -> Result<(), SimilarityError> {
    Uuid::parse_str(&record.gid).map_err(|_| SimilarityError::InvalidRecordingId {
        input: record.gid.clone(),
        reason: "not a valid UUID".to_string(),
    })?;
    if let Some(metric) = record.features.keys().find(|m| !is_base_metric(m)) {
        return Err(SimilarityError::UnknownMetric(metric.clone()));
    }

    let row = store
        .insert_submission(&record.gid, record.offset)
        .into_similarity_result()?;
    for (metric, vector) in &record.features {
        store
            .set_feature(row.id, metric, vector)
            .into_similarity_result()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use resonance_db::store::FeatureStore;
    use std::io::Cursor;
    use tempfile::TempDir;

    const INPUT: &str = r#"
{"gid": "0DAD432B-16CC-4BF0-8961-FD31D124B01B", "features": {"mfccs": [1.0, 0.0], "bpm": [120.0]}}

{"gid": "0dad432b-16cc-4bf0-8961-fd31d124b01b", "features": {"mfccs": [0.0, 1.0]}}
{"gid": "c5f4909e-1d7b-4f15-a6f6-1af376bc01c9", "offset": 4}
"#;

    #[test]
    fn test_import_records() {
        let temp = TempDir::new().unwrap();
        let store = init_database(&temp.path().join("db").join("resonance.db")).unwrap();

        let summary = import_records(&store, Cursor::new(INPUT)).unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                submissions: 3,
                vectors: 3
            }
        );

        assert_eq!(
            store
                .resolve_submission("0dad432b-16cc-4bf0-8961-fd31d124b01b", 1)
                .unwrap(),
            Some(2)
        );
        assert_eq!(
            store
                .resolve_submission("c5f4909e-1d7b-4f15-a6f6-1af376bc01c9", 4)
                .unwrap(),
            Some(3)
        );
        assert_eq!(store.metric_dimension("mfccs").unwrap(), Some(2));
        assert_eq!(store.count_with_metric("bpm").unwrap(), 1);
    }

    #[test]
    fn test_import_stops_at_bad_line() {
        let temp = TempDir::new().unwrap();
        let store = init_database(&temp.path().join("resonance.db")).unwrap();

        let input = "{\"gid\": \"c5f4909e-1d7b-4f15-a6f6-1af376bc01c9\"}\n{\"gid\": \"nope\"}\n";
        let err = import_records(&store, Cursor::new(input)).unwrap_err();
        assert!(err.to_string().contains("Line 2"));
        assert_eq!(store.max_id().unwrap(), Some(1));

        let input = "{\"gid\": \"7f27d7a9-27f0-4663-9d20-2c9c40200e6d\", \"features\": {\"loudness\": [1.0]}}\n";
        assert!(import_records(&store, Cursor::new(input)).is_err());

        assert!(import_records(&store, Cursor::new("not json\n")).is_err());
    }
}
