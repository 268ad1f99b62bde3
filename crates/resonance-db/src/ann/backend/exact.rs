//! Brute-force ANN backend.
//!
//! Stores every vector in a dense slot table and answers neighbour queries
//! with a linear scan, so rankings are exact. Indices are persisted as a
//! single bincode file written through a temporary sibling and renamed into
//! place, which keeps half-written files from ever carrying the final name.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use bincode::{config, Decode, Encode};
use tracing::{debug, trace};

use super::super::traits::{AnnBackend, DistanceType, ItemId, Neighbour};
use crate::error::{DbError, DbResult};

/// Backend name recorded in index files.
const BACKEND_NAME: &str = "exact";

/// Version of the on-disk layout.
const FORMAT_VERSION: u32 = 1;

/// On-disk representation of a built index.
#[derive(Debug, Encode, Decode)]
struct IndexFile {
    version: u32,
    backend: String,
    dimension: u32,
    distance: DistanceType,
    forest_size: u32,
    items: Vec<Option<Vec<f32>>>,
}

/// Brute-force vector index with exact ranking.
pub struct ExactScanIndex {
    /// Dimension of vectors.
    dimension: usize,

    /// Distance type for ranking.
    distance: DistanceType,

    /// Slot table addressed by dense id.
    items: Vec<Option<Vec<f32>>>,

    /// Forest size recorded at build time.
    forest_size: usize,

    /// Set once built or loaded.
    built: bool,
}

impl ExactScanIndex {
    /// Create an empty index.
    pub fn new(dimension: usize, distance: DistanceType) -> Self {
        Self {
            dimension,
            distance,
            items: Vec::new(),
            forest_size: 0,
            built: false,
        }
    }

    /// Forest size the index was built with (0 before build).
    pub fn forest_size(&self) -> usize {
        self.forest_size
    }

    fn slot(&self, id: ItemId) -> Option<&Vec<f32>> {
        self.items.get(id as usize).and_then(|slot| slot.as_ref())
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        path.with_file_name(name)
    }
}

impl AnnBackend for ExactScanIndex {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn distance_type(&self) -> DistanceType {
        self.distance
    }

    fn add_item(&mut self, id: ItemId, vector: &[f32]) -> DbResult<()> {
        if self.built {
            return Err(DbError::AlreadyBuilt);
        }
        if vector.len() != self.dimension {
            return Err(DbError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let position = id as usize;
        if position >= self.items.len() {
            self.items.resize(position + 1, None);
        }
        self.items[position] = Some(vector.to_vec());

        trace!("Added item {} ({} slots)", id, self.items.len());
        Ok(())
    }

    fn contains(&self, id: ItemId) -> bool {
        self.slot(id).is_some()
    }

    fn item_vector(&self, id: ItemId) -> Option<Vec<f32>> {
        self.slot(id).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn build(&mut self, forest_size: usize) -> DbResult<()> {
        if self.built {
            return Err(DbError::AlreadyBuilt);
        }
        self.forest_size = forest_size;
        self.built = true;
        debug!(
            "Built exact index: {} slots, forest_size={}",
            self.items.len(),
            forest_size
        );
        Ok(())
    }

    fn is_built(&self) -> bool {
        self.built
    }

    fn save(&self, path: &Path) -> DbResult<()> {
        if !self.built {
            return Err(DbError::NotBuilt);
        }

        let file = IndexFile {
            version: FORMAT_VERSION,
            backend: BACKEND_NAME.to_string(),
            dimension: self.dimension as u32,
            distance: self.distance,
            forest_size: self.forest_size as u32,
            items: self.items.clone(),
        };

        let temp = Self::temp_path(path);
        let handle = File::create(&temp)
            .map_err(|e| DbError::vector_io(&temp, format!("Failed to create index file: {}", e)))?;
        let mut writer = BufWriter::new(handle);
        bincode::encode_into_std_write(&file, &mut writer, config::standard())
            .map_err(|e| DbError::vector_parse(&temp, format!("Failed to encode index: {}", e)))?;
        writer
            .flush()
            .map_err(|e| DbError::vector_io(&temp, format!("Failed to flush index: {}", e)))?;
        drop(writer);

        fs::rename(&temp, path)
            .map_err(|e| DbError::vector_io(path, format!("Failed to move index into place: {}", e)))?;

        debug!("Saved exact index to {:?} ({} slots)", path, self.items.len());
        Ok(())
    }

    fn load(&mut self, path: &Path) -> DbResult<()> {
        if !path.is_file() {
            return Err(DbError::IndexNotFound {
                path: path.to_path_buf(),
            });
        }

        let handle = File::open(path)
            .map_err(|e| DbError::vector_io(path, format!("Failed to open index: {}", e)))?;
        let mut reader = BufReader::new(handle);
        let file: IndexFile = bincode::decode_from_std_read(&mut reader, config::standard())
            .map_err(|e| DbError::vector_parse(path, format!("Failed to decode index: {}", e)))?;

        if file.version != FORMAT_VERSION || file.backend != BACKEND_NAME {
            return Err(DbError::vector_parse(
                path,
                format!(
                    "Unsupported index format: backend '{}' version {}",
                    file.backend, file.version
                ),
            ));
        }
        if file.dimension as usize != self.dimension {
            return Err(DbError::DimensionMismatch {
                expected: self.dimension,
                actual: file.dimension as usize,
            });
        }
        if file.distance != self.distance {
            return Err(DbError::vector_parse(
                path,
                format!(
                    "Distance mismatch: expected '{}', found '{}'",
                    self.distance, file.distance
                ),
            ));
        }
        if let Some(bad) = file
            .items
            .iter()
            .flatten()
            .find(|v| v.len() != self.dimension)
        {
            return Err(DbError::vector_parse(
                path,
                format!("Stored vector has dimension {}", bad.len()),
            ));
        }

        self.items = file.items;
        self.forest_size = file.forest_size as usize;
        self.built = true;

        debug!("Loaded exact index from {:?} ({} slots)", path, self.items.len());
        Ok(())
    }

    fn nearest_by_item(&self, id: ItemId, k: usize) -> DbResult<Vec<Neighbour>> {
        if !self.built {
            return Err(DbError::NotBuilt);
        }
        let query = self.slot(id).ok_or(DbError::ItemNotFound { id })?;

        let mut scored: Vec<Neighbour> = self
            .items
            .iter()
            .enumerate()
            .filter_map(|(position, slot)| {
                slot.as_ref()
                    .map(|v| Neighbour::new(position as ItemId, self.distance.rank(query, v)))
            })
            .collect();

        // Stable on ties so equal distances keep ascending id order.
        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or_else(|| a.distance.is_nan().cmp(&b.distance.is_nan()))
        });
        scored.truncate(k);

        for neighbour in &mut scored {
            neighbour.distance = self.distance.reported(neighbour.distance);
        }

        trace!("Found {} neighbours for item {}", scored.len(), id);
        Ok(scored)
    }

    fn distance_between(&self, a: ItemId, b: ItemId) -> DbResult<f32> {
        let va = self.slot(a).ok_or(DbError::ItemNotFound { id: a })?;
        let vb = self.slot(b).ok_or(DbError::ItemNotFound { id: b })?;
        Ok(self.distance.reported(self.distance.rank(va, vb)))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_index(distance: DistanceType) -> ExactScanIndex {
        let mut index = ExactScanIndex::new(2, distance);
        index.add_item(0, &[0.0, 0.0]).unwrap();
        index.add_item(1, &[1.0, 0.0]).unwrap();
        index.add_item(2, &[2.0, 0.0]).unwrap();
        index.add_item(3, &[10.0, 0.0]).unwrap();
        index
    }

    #[test]
    fn test_add_item_grows_slots() {
        let mut index = ExactScanIndex::new(2, DistanceType::Euclidean);
        index.add_item(4, &[1.0, 1.0]).unwrap();
        assert_eq!(index.len(), 5);
        assert!(index.contains(4));
        assert!(!index.contains(0));
        assert!(!index.contains(99));
    }

    #[test]
    fn test_add_item_rejects_wrong_dimension() {
        let mut index = ExactScanIndex::new(3, DistanceType::Angular);
        let err = index.add_item(0, &[1.0]).unwrap_err();
        assert!(matches!(
            err,
            DbError::DimensionMismatch {
                expected: 3,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_build_freezes_index() {
        let mut index = sample_index(DistanceType::Euclidean);
        index.build(10).unwrap();
        assert!(index.is_built());
        assert!(matches!(
            index.add_item(9, &[0.0, 0.0]),
            Err(DbError::AlreadyBuilt)
        ));
        assert!(matches!(index.build(10), Err(DbError::AlreadyBuilt)));
    }

    #[test]
    fn test_nearest_by_item_ranks_by_distance() {
        let mut index = sample_index(DistanceType::Manhattan);
        index.build(10).unwrap();

        let ids: Vec<ItemId> = index
            .nearest_by_item(1, 3)
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![1, 0, 2]);
    }

    #[test]
    fn test_nearest_by_item_ranks_nan_last() {
        let mut index = sample_index(DistanceType::Euclidean);
        index.add_item(4, &[f32::NAN, 0.0]).unwrap();
        index.build(10).unwrap();

        let ids: Vec<ItemId> = index
            .nearest_by_item(1, 5)
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![1, 0, 2, 3, 4]);
    }

    #[test]
    fn test_nearest_by_item_missing_item() {
        let mut index = ExactScanIndex::new(2, DistanceType::Euclidean);
        index.add_item(2, &[1.0, 1.0]).unwrap();
        index.build(1).unwrap();
        assert!(matches!(
            index.nearest_by_item(0, 5),
            Err(DbError::ItemNotFound { id: 0 })
        ));
        assert!(matches!(
            index.nearest_by_item(7, 5),
            Err(DbError::ItemNotFound { id: 7 })
        ));
    }

    #[test]
    fn test_nearest_requires_build() {
        let index = sample_index(DistanceType::Euclidean);
        assert!(matches!(index.nearest_by_item(0, 1), Err(DbError::NotBuilt)));
    }

    #[test]
    fn test_distance_between() {
        let index = sample_index(DistanceType::Euclidean);
        assert!((index.distance_between(1, 3).unwrap() - 9.0).abs() < 1e-6);
        assert!(index.distance_between(1, 42).is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("mfccs_euclidean_10.idx");

        let mut index = sample_index(DistanceType::Euclidean);
        index.build(10).unwrap();
        index.save(&path).unwrap();
        assert!(!ExactScanIndex::temp_path(&path).exists());

        let mut loaded = ExactScanIndex::new(2, DistanceType::Euclidean);
        loaded.load(&path).unwrap();
        assert!(loaded.is_built());
        assert_eq!(loaded.forest_size(), 10);
        assert_eq!(
            loaded.nearest_by_item(2, 4).unwrap(),
            index.nearest_by_item(2, 4).unwrap()
        );
    }

    #[test]
    fn test_save_requires_build() {
        let temp = TempDir::new().unwrap();
        let index = sample_index(DistanceType::Euclidean);
        assert!(matches!(
            index.save(&temp.path().join("x.idx")),
            Err(DbError::NotBuilt)
        ));
    }

    #[test]
    fn test_load_missing_and_corrupt() {
        let temp = TempDir::new().unwrap();
        let mut index = ExactScanIndex::new(2, DistanceType::Euclidean);

        let missing = temp.path().join("missing.idx");
        assert!(matches!(
            index.load(&missing),
            Err(DbError::IndexNotFound { .. })
        ));

        let corrupt = temp.path().join("corrupt.idx");
        fs::write(&corrupt, b"not an index").unwrap();
        assert!(index.load(&corrupt).is_err());
        assert!(!index.is_built());
    }

    #[test]
    fn test_load_rejects_other_distance() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.idx");
        let mut index = sample_index(DistanceType::Euclidean);
        index.build(10).unwrap();
        index.save(&path).unwrap();

        let mut other = ExactScanIndex::new(2, DistanceType::Angular);
        assert!(matches!(
            other.load(&path),
            Err(DbError::VectorParse { .. })
        ));
    }
}
