//! ANN index module for resonance-db.
//!
//! This module provides the opaque vector-index capability used by the
//! similarity layer: add items at dense integer ids, build, save/load, and
//! ask for the nearest neighbours of an indexed item.
//!
//! ## Available Backends
//!
//! - `exact` (default): brute-force scan with exact ranking, persisted with bincode
//!
//! ## Usage
//!
//! ```ignore
//! use resonance_db::ann::{AnnConfig, DistanceType, open_ann_index};
//!
//! let config = AnnConfig::new(13, DistanceType::Manhattan);
//! let mut index = open_ann_index(&config)?;
//! index.add_item(0, &[0.0; 13])?;
//! index.build(10)?;
//! index.save(Path::new("annoy_indices/mfccs_manhattan_10.idx"))?;
//! ```

mod backend;
mod config;
mod traits;

pub use config::{AnnConfig, DEFAULT_BACKEND, INDEX_FILE_EXTENSION};
pub use traits::{AnnBackend, DistanceType, ItemId, Neighbour};

pub use backend::{available_backends, open_ann_index};

#[cfg(feature = "exact")]
pub use backend::ExactScanIndex;
