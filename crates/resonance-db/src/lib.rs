//! # resonance-db
//!
//! Infrastructure layer for Resonance - ANN index backends and the relational
//! feature store.
//!
//! This crate provides the "heavy" infrastructure implementations that are isolated
//! from the domain logic in `resonance-core`. By separating these concerns:
//!
//! - The index lifecycle, gap-filling builder and query layer do not depend on
//!   any particular ANN library or database driver
//! - ANN backends can be swapped without changing domain logic
//! - Testing is easier with in-memory stores
//!
//! ## Architecture
//!
//! ```text
//! resonance-cli → resonance-core → (traits)
//!                      ↑
//!                 resonance-db (implements AnnBackend / FeatureStore)
//! ```
//!
//! ## Features
//!
//! - `exact` (default): brute-force ANN backend persisted with bincode
//! - `sqlite` (default): SQLite feature store via `rusqlite`
//!
//! ## Modules
//!
//! - `ann`: the opaque vector-index capability and its backends
//! - `store`: feature vectors and submission identifiers in a relational store
//!
//! ## Usage
//!
//! ```ignore
//! use resonance_db::ann::{AnnConfig, DistanceType, open_ann_index};
//!
//! let config = AnnConfig::new(13, DistanceType::Angular);
//! let mut index = open_ann_index(&config)?;
//!
//! index.add_item(0, &vector)?;
//! index.build(10)?;
//! let neighbours = index.nearest_by_item(0, 10)?;
//! ```

pub mod ann;
pub mod error;
pub mod store;

pub use error::{DbError, DbResult};
