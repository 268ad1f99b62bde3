//! SQLite-backed feature store.
//!
//! Schema:
//!
//! ```text
//! lowlevel(id INTEGER PRIMARY KEY, gid TEXT COLLATE NOCASE, submission_offset INTEGER)
//! similarity(id INTEGER PRIMARY KEY, <metric> TEXT NULL, ...)
//! ```
//!
//! Feature vectors are stored as JSON arrays, one nullable column per metric.
//! A NULL column means the metric has not been computed for that recording.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::{debug, trace};

use super::{FeatureRow, FeatureStore, RecordingRow};
use crate::error::{DbError, DbResult};

/// Maximum number of bound parameters per `IN (...)` lookup.
const LOOKUP_CHUNK_SIZE: usize = 500;

/// SQLite feature store.
///
/// The connection is guarded by a mutex so the store can be shared between
/// threads; SQLite serializes access to a single connection anyway.
pub struct SqliteFeatureStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteFeatureStore {
    /// Open (or create) a database file.
    pub fn open(path: &Path) -> DbResult<Self> {
        debug!("Opening SQLite feature store at {:?}", path);
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Path of the database file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Create the tables and add a vector column for every metric not yet present.
    pub fn init_schema(&self, metrics: &[&str]) -> DbResult<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS lowlevel (
                id INTEGER PRIMARY KEY,
                gid TEXT NOT NULL COLLATE NOCASE,
                submission_offset INTEGER NOT NULL,
                UNIQUE (gid, submission_offset)
            );
            CREATE TABLE IF NOT EXISTS similarity (
                id INTEGER PRIMARY KEY REFERENCES lowlevel(id)
            );
            "#,
        )?;

        let existing = Self::columns(&conn, "similarity")?;
        for metric in metrics {
            validate_column(metric)?;
            if !existing.iter().any(|c| c == metric) {
                conn.execute(
                    &format!("ALTER TABLE similarity ADD COLUMN {} TEXT", metric),
                    [],
                )?;
                debug!("Added metric column '{}'", metric);
            }
        }

        Ok(())
    }

    /// Metric columns currently present in the feature table.
    pub fn metric_columns(&self) -> DbResult<Vec<String>> {
        let conn = self.lock()?;
        Ok(Self::columns(&conn, "similarity")?
            .into_iter()
            .filter(|c| c != "id")
            .collect())
    }

    /// Register a submission and its (empty) feature row.
    ///
    /// The global id is stored lower-cased. When `offset` is `None` the next
    /// free offset for that global id is used.
    pub fn insert_submission(&self, gid: &str, offset: Option<u32>) -> DbResult<RecordingRow> {
        let gid = gid.to_lowercase();
        let conn = self.lock()?;

        let offset = match offset {
            Some(offset) => offset,
            None => conn.query_row(
                "SELECT COUNT(*) FROM lowlevel WHERE gid = ?1",
                params![gid],
                |row| row.get::<_, u32>(0),
            )?,
        };

        conn.execute(
            "INSERT INTO lowlevel (gid, submission_offset) VALUES (?1, ?2)",
            params![gid, offset],
        )?;
        let id = to_id(conn.last_insert_rowid())?;
        conn.execute("INSERT OR IGNORE INTO similarity (id) VALUES (?1)", params![id])?;

        trace!("Inserted submission {}:{} as id {}", gid, offset, id);
        Ok(RecordingRow { id, gid, offset })
    }

    /// Store a feature vector for a recording.
    pub fn set_feature(&self, id: u32, metric: &str, vector: &[f32]) -> DbResult<()> {
        let raw = serde_json::to_string(vector)?;
        self.set_raw_feature(id, metric, Some(&raw))
    }

    /// Store a raw JSON value (or NULL) in a metric column.
    ///
    /// No validation is done on `raw`; malformed values surface when the
    /// vector is read back.
    pub fn set_raw_feature(&self, id: u32, metric: &str, raw: Option<&str>) -> DbResult<()> {
        validate_column(metric)?;
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO similarity (id, {m}) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET {m} = excluded.{m}",
                m = metric
            ),
            params![id, raw],
        )?;
        Ok(())
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DbError::internal(format!("Failed to acquire connection lock: {}", e)))
    }

    fn columns(conn: &Connection, table: &str) -> DbResult<Vec<String>> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }
}

impl FeatureStore for SqliteFeatureStore {
    fn metric_dimension(&self, metric: &str) -> DbResult<Option<usize>> {
        validate_column(metric)?;
        let conn = self.lock()?;
        let row: Option<(i64, String)> = conn
            .query_row(
                &format!(
                    "SELECT id, {m} FROM similarity WHERE {m} IS NOT NULL LIMIT 1",
                    m = metric
                ),
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((id, raw)) => Ok(Some(parse_vector(to_id(id)?, &raw)?.len())),
            None => Ok(None),
        }
    }

    fn max_id(&self) -> DbResult<Option<u32>> {
        let conn = self.lock()?;
        let max: Option<i64> = conn.query_row("SELECT MAX(id) FROM similarity", [], |row| row.get(0))?;
        max.map(to_id).transpose()
    }

    fn count_with_metric(&self, metric: &str) -> DbResult<u64> {
        validate_column(metric)?;
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT({}) FROM similarity", metric),
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn fetch_feature_page(
        &self,
        metric: &str,
        after_id: Option<u32>,
        limit: usize,
    ) -> DbResult<Vec<FeatureRow>> {
        validate_column(metric)?;
        let conn = self.lock()?;
        let after = after_id.map(i64::from).unwrap_or(-1);

        let mut stmt = conn.prepare(&format!(
            "SELECT id, {m} FROM similarity
              WHERE {m} IS NOT NULL AND id > ?1
              ORDER BY id
              LIMIT ?2",
            m = metric
        ))?;
        let raw_rows = stmt
            .query_map(params![after, limit as i64], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        trace!(
            "Fetched {} '{}' rows after {:?}",
            raw_rows.len(),
            metric,
            after_id
        );

        raw_rows
            .into_iter()
            .map(|(id, raw)| {
                let id = to_id(id)?;
                Ok(FeatureRow::new(id, parse_vector(id, &raw)?))
            })
            .collect()
    }

    fn feature_by_id(&self, metric: &str, id: u32) -> DbResult<Option<FeatureRow>> {
        validate_column(metric)?;
        let conn = self.lock()?;
        let raw: Option<Option<String>> = conn
            .query_row(
                &format!("SELECT {} FROM similarity WHERE id = ?1", metric),
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        match raw.flatten() {
            Some(raw) => Ok(Some(FeatureRow::new(id, parse_vector(id, &raw)?))),
            None => Ok(None),
        }
    }

    fn resolve_submission(&self, gid: &str, offset: u32) -> DbResult<Option<u32>> {
        let conn = self.lock()?;
        let id: Option<i64> = conn
            .query_row(
                "SELECT id FROM lowlevel WHERE gid = ?1 AND submission_offset = ?2",
                params![gid.to_lowercase(), offset],
                |row| row.get(0),
            )
            .optional()?;
        id.map(to_id).transpose()
    }

    fn recordings_by_ids(&self, ids: &[u32]) -> DbResult<Vec<RecordingRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.lock()?;
        let mut recordings = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(LOOKUP_CHUNK_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let mut stmt = conn.prepare(&format!(
                "SELECT id, gid, submission_offset FROM lowlevel WHERE id IN ({})",
                placeholders
            ))?;
            let rows = stmt
                .query_map(params_from_iter(chunk.iter()), |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, u32>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            for (id, gid, offset) in rows {
                recordings.push(RecordingRow {
                    id: to_id(id)?,
                    gid: gid.to_lowercase(),
                    offset,
                });
            }
        }

        Ok(recordings)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Metric names are interpolated into SQL, so only plain identifiers pass.
fn validate_column(name: &str) -> DbResult<()> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name != "id";
    if valid {
        Ok(())
    } else {
        Err(DbError::config(format!("Invalid metric column name: '{}'", name)))
    }
}

fn to_id(raw: i64) -> DbResult<u32> {
    u32::try_from(raw).map_err(|_| DbError::store(format!("Row id {} is out of range", raw)))
}

/// Decode a stored JSON array into a numeric vector.
fn parse_vector(id: u32, raw: &str) -> DbResult<Vec<f32>> {
    let values: Vec<serde_json::Value> = serde_json::from_str(raw)
        .map_err(|e| DbError::malformed_vector(id, format!("not a JSON array: {}", e)))?;

    values
        .iter()
        .enumerate()
        .map(|(position, value)| {
            let number = value.as_f64().ok_or_else(|| {
                DbError::malformed_vector(
                    id,
                    format!("non-numeric component {} at position {}", value, position),
                )
            })?;
            let component = number as f32;
            if component.is_finite() {
                Ok(component)
            } else {
                Err(DbError::malformed_vector(
                    id,
                    format!("component {} at position {} is out of range", value, position),
                ))
            }
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteFeatureStore {
        let store = SqliteFeatureStore::open_in_memory().unwrap();
        store.init_schema(&["mfccs", "bpm"]).unwrap();
        store
    }

    #[test]
    fn test_init_schema_is_idempotent() {
        let store = store();
        store.init_schema(&["mfccs", "bpm", "key"]).unwrap();
        assert_eq!(store.metric_columns().unwrap(), vec!["mfccs", "bpm", "key"]);
    }

    #[test]
    fn test_init_schema_rejects_bad_names() {
        let store = SqliteFeatureStore::open_in_memory().unwrap();
        assert!(store.init_schema(&["mfccs; DROP TABLE lowlevel"]).is_err());
    }

    #[test]
    fn test_insert_submission_assigns_offsets() {
        let store = store();
        let first = store
            .insert_submission("0DAD432B-16CC-4BF0-8961-FD31D124B01B", None)
            .unwrap();
        let second = store
            .insert_submission("0dad432b-16cc-4bf0-8961-fd31d124b01b", None)
            .unwrap();

        assert_eq!(first.gid, "0dad432b-16cc-4bf0-8961-fd31d124b01b");
        assert_eq!(first.offset, 0);
        assert_eq!(second.offset, 1);
        assert_ne!(first.id, second.id);
        assert!(store
            .insert_submission("0dad432b-16cc-4bf0-8961-fd31d124b01b", Some(1))
            .is_err());
    }

    #[test]
    fn test_resolve_submission_is_case_insensitive() {
        let store = store();
        let row = store
            .insert_submission("0dad432b-16cc-4bf0-8961-fd31d124b01b", Some(0))
            .unwrap();

        let upper = store
            .resolve_submission("0DAD432B-16CC-4BF0-8961-FD31D124B01B", 0)
            .unwrap();
        assert_eq!(upper, Some(row.id));
        assert_eq!(
            store
                .resolve_submission("0dad432b-16cc-4bf0-8961-fd31d124b01b", 3)
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_metric_dimension() {
        let store = store();
        assert_eq!(store.metric_dimension("mfccs").unwrap(), None);

        let row = store.insert_submission("a", None).unwrap();
        store.set_feature(row.id, "mfccs", &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(store.metric_dimension("mfccs").unwrap(), Some(3));

        assert!(store.metric_dimension("nothing").is_err());
    }

    #[test]
    fn test_fetch_feature_page_skips_null_and_pages() {
        let store = store();
        for i in 0..5 {
            let row = store.insert_submission(&format!("gid-{}", i), None).unwrap();
            if i != 2 {
                store.set_feature(row.id, "bpm", &[i as f32]).unwrap();
            }
        }

        let first = store.fetch_feature_page("bpm", None, 2).unwrap();
        assert_eq!(first.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2]);

        let second = store.fetch_feature_page("bpm", Some(2), 2).unwrap();
        assert_eq!(second.iter().map(|r| r.id).collect::<Vec<_>>(), vec![4, 5]);

        let last = store.fetch_feature_page("bpm", Some(5), 2).unwrap();
        assert!(last.is_empty());

        assert_eq!(store.count_with_metric("bpm").unwrap(), 4);
        assert_eq!(store.max_id().unwrap(), Some(5));
    }

    #[test]
    fn test_malformed_vector_names_id() {
        let store = store();
        let row = store.insert_submission("a", None).unwrap();
        store
            .set_raw_feature(row.id, "mfccs", Some(r#"[1.0, "x"]"#))
            .unwrap();

        let err = store.fetch_feature_page("mfccs", None, 10).unwrap_err();
        assert!(matches!(err, DbError::MalformedVector { id, .. } if id == row.id));
        assert!(store.feature_by_id("mfccs", row.id).is_err());
    }

    #[test]
    fn test_out_of_range_component_is_malformed() {
        let store = store();
        let row = store.insert_submission("a", None).unwrap();
        store
            .set_raw_feature(row.id, "mfccs", Some("[1e39, 1.0, 0.0]"))
            .unwrap();

        let err = store.fetch_feature_page("mfccs", None, 10).unwrap_err();
        match err {
            DbError::MalformedVector { id, reason } => {
                assert_eq!(id, row.id);
                assert!(reason.contains("out of range"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_feature_by_id() {
        let store = store();
        let row = store.insert_submission("a", None).unwrap();
        assert_eq!(store.feature_by_id("mfccs", row.id).unwrap(), None);
        assert_eq!(store.feature_by_id("mfccs", 999).unwrap(), None);

        store.set_feature(row.id, "mfccs", &[0.5, 0.25]).unwrap();
        assert_eq!(
            store.feature_by_id("mfccs", row.id).unwrap(),
            Some(FeatureRow::new(row.id, vec![0.5, 0.25]))
        );
    }

    #[test]
    fn test_recordings_by_ids_omits_unknown() {
        let store = store();
        let a = store.insert_submission("A", None).unwrap();
        let b = store.insert_submission("b", Some(4)).unwrap();

        let mut rows = store.recordings_by_ids(&[b.id, 77, a.id]).unwrap();
        rows.sort_by_key(|r| r.id);
        assert_eq!(rows, vec![a, b]);
        assert!(store.recordings_by_ids(&[]).unwrap().is_empty());
    }
}
