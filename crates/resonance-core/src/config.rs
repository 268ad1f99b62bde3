//! Configuration types for Resonance.
//!
//! - [`SimilarityConfig`]: global configuration stored in `~/.resonance/config.yaml`
//! - [`QueryConfig`]: defaults and limits applied to query parameters
//! - [`PlaceholderPolicy`]: whether gap-filling placeholders may appear in results

use std::fs;
use std::path::{Path, PathBuf};

use resonance_db::ann::{available_backends, DistanceType, DEFAULT_BACKEND};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_DATABASE_FILENAME, DEFAULT_DISTANCE, DEFAULT_FOREST_SIZE,
    DEFAULT_NEIGHBOURS, GLOBAL_CONFIG_FILENAME, INDEX_DIR_NAME, MAX_BULK_RECORDINGS,
    MAX_NEIGHBOURS, RESONANCE_HOME_DIR,
};
use crate::errors::SimilarityError;

// ============================================================================
// PlaceholderPolicy
// ============================================================================

/// Treatment of the zero-vector placeholders inserted for id gaps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceholderPolicy {
    /// Placeholders are ordinary index items and may appear as neighbours.
    #[default]
    Include,

    /// Placeholder ids recorded at build time are dropped from results.
    Exclude,
}

impl std::fmt::Display for PlaceholderPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Include => write!(f, "include"),
            Self::Exclude => write!(f, "exclude"),
        }
    }
}

impl std::str::FromStr for PlaceholderPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "include" => Ok(Self::Include),
            "exclude" => Ok(Self::Exclude),
            _ => Err(format!(
                "Unknown placeholder policy: '{}'. Use 'include' or 'exclude'.",
                s
            )),
        }
    }
}

// ============================================================================
// QueryConfig
// ============================================================================

/// Defaults and limits for query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryConfig {
    /// Distance type used when a request gives none or an invalid one.
    #[serde(default = "default_distance")]
    pub default_distance: DistanceType,

    /// Forest size used when a request gives none or an invalid one.
    #[serde(default = "default_forest_size")]
    pub default_forest_size: usize,

    /// Neighbour count used when a request gives none or an invalid one.
    #[serde(default = "default_neighbours")]
    pub default_neighbours: usize,

    /// Upper bound on neighbour count; larger requests get the default.
    #[serde(default = "default_max_neighbours")]
    pub max_neighbours: usize,

    /// Maximum recordings in one bulk query.
    #[serde(default = "default_max_bulk_recordings")]
    pub max_bulk_recordings: usize,
}

fn default_distance() -> DistanceType {
    DEFAULT_DISTANCE
}

fn default_forest_size() -> usize {
    DEFAULT_FOREST_SIZE
}

fn default_neighbours() -> usize {
    DEFAULT_NEIGHBOURS
}

fn default_max_neighbours() -> usize {
    MAX_NEIGHBOURS
}

fn default_max_bulk_recordings() -> usize {
    MAX_BULK_RECORDINGS
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_distance: DEFAULT_DISTANCE,
            default_forest_size: DEFAULT_FOREST_SIZE,
            default_neighbours: DEFAULT_NEIGHBOURS,
            max_neighbours: MAX_NEIGHBOURS,
            max_bulk_recordings: MAX_BULK_RECORDINGS,
        }
    }
}

// ============================================================================
// SimilarityConfig
// ============================================================================

/// Global configuration for Resonance.
///
/// # Example YAML
///
/// ```yaml
/// databasePath: /var/lib/resonance/features.db
/// indexDir: /var/lib/resonance/annoy_indices
/// batchSize: 10000
/// placeholderPolicy: exclude
/// query:
///   defaultNeighbours: 100
///   maxBulkRecordings: 25
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityConfig {
    /// SQLite database holding submissions and feature vectors.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Directory holding persisted indices.
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,

    /// Feature rows fetched per page during a build.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// ANN backend name.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Treatment of gap-filling placeholders in query results.
    #[serde(default)]
    pub placeholder_policy: PlaceholderPolicy,

    /// Query defaults and limits.
    #[serde(default)]
    pub query: QueryConfig,
}

fn default_database_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATABASE_FILENAME)
}

fn default_index_dir() -> PathBuf {
    PathBuf::from(INDEX_DIR_NAME)
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_backend() -> String {
    DEFAULT_BACKEND.to_string()
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            index_dir: default_index_dir(),
            batch_size: DEFAULT_BATCH_SIZE,
            backend: default_backend(),
            placeholder_policy: PlaceholderPolicy::default(),
            query: QueryConfig::default(),
        }
    }
}

impl SimilarityConfig {
    /// Load the configuration from the default location (`~/.resonance/config.yaml`).
    ///
    /// If the file does not exist, returns the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SimilarityError::InvalidGlobalConfig`] if the file exists but cannot be parsed.
    pub fn load_default() -> Result<Self, SimilarityError> {
        match Self::default_path() {
            Some(path) => Self::from_path(&path),
            None => {
                tracing::debug!("Could not determine home directory, using default config");
                Ok(Self::default())
            }
        }
    }

    /// Load the configuration from a specific path.
    ///
    /// If the file does not exist, returns the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SimilarityError::InvalidGlobalConfig`] if the file exists but cannot be parsed.
    /// Returns [`SimilarityError::InvalidConfiguration`] if validation fails.
    pub fn from_path(path: &Path) -> Result<Self, SimilarityError> {
        if !path.exists() {
            tracing::debug!("Config not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            SimilarityError::InvalidGlobalConfig(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| {
            SimilarityError::InvalidGlobalConfig(format!(
                "Failed to parse {}: {}",
                path.display(),
                e
            ))
        })?;

        let warnings = config.validate()?;
        for warning in warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok(config)
    }

    /// Get the default config directory (`~/.resonance`).
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(RESONANCE_HOME_DIR))
    }

    /// Get the default config file path (`~/.resonance/config.yaml`).
    pub fn default_path() -> Option<PathBuf> {
        Self::default_dir().map(|d| d.join(GLOBAL_CONFIG_FILENAME))
    }

    /// Set the database path.
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    /// Set the index directory.
    pub fn with_index_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.index_dir = path.into();
        self
    }

    /// Set the build batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the placeholder policy.
    pub fn with_placeholder_policy(mut self, policy: PlaceholderPolicy) -> Self {
        self.placeholder_policy = policy;
        self
    }

    /// Validate the configuration.
    ///
    /// Returns non-fatal warnings; hard errors are returned as
    /// [`SimilarityError::InvalidConfiguration`].
    pub fn validate(&self) -> Result<Vec<String>, SimilarityError> {
        let mut warnings = Vec::new();

        if self.batch_size == 0 {
            return Err(SimilarityError::InvalidConfiguration {
                message: "batchSize must be greater than 0".to_string(),
                hint: format!("Remove it to use the default of {}", DEFAULT_BATCH_SIZE),
            });
        }

        if self.query.default_forest_size == 0 {
            return Err(SimilarityError::InvalidConfiguration {
                message: "query.defaultForestSize must be greater than 0".to_string(),
                hint: format!("Remove it to use the default of {}", DEFAULT_FOREST_SIZE),
            });
        }

        if self.query.max_neighbours == 0 || self.query.default_neighbours == 0 {
            return Err(SimilarityError::InvalidConfiguration {
                message: "query neighbour counts must be greater than 0".to_string(),
                hint: format!(
                    "Use defaultNeighbours: {} and maxNeighbours: {}",
                    DEFAULT_NEIGHBOURS, MAX_NEIGHBOURS
                ),
            });
        }

        if self.query.max_bulk_recordings == 0 {
            return Err(SimilarityError::InvalidConfiguration {
                message: "query.maxBulkRecordings must be greater than 0".to_string(),
                hint: format!("Remove it to use the default of {}", MAX_BULK_RECORDINGS),
            });
        }

        if self.query.default_neighbours > self.query.max_neighbours {
            warnings.push(format!(
                "query.defaultNeighbours ({}) exceeds query.maxNeighbours ({})",
                self.query.default_neighbours, self.query.max_neighbours
            ));
        }

        if !available_backends().contains(&self.backend.as_str()) {
            warnings.push(format!(
                "backend '{}' is not available in this build (available: {})",
                self.backend,
                available_backends().join(", ")
            ));
        }

        Ok(warnings)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = SimilarityConfig::default();
        assert_eq!(config.index_dir, PathBuf::from("annoy_indices"));
        assert_eq!(config.batch_size, 50_000);
        assert_eq!(config.placeholder_policy, PlaceholderPolicy::Include);
        assert_eq!(config.query.default_distance, DistanceType::Angular);
        assert_eq!(config.query.default_forest_size, 10);
        assert_eq!(config.query.default_neighbours, 200);
        assert_eq!(config.query.max_neighbours, 1000);
        assert_eq!(config.query.max_bulk_recordings, 25);
        assert!(config.validate().unwrap().is_empty());
    }

    #[test]
    fn test_from_missing_path_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let config = SimilarityConfig::from_path(&temp.path().join("absent.yaml")).unwrap();
        assert_eq!(config, SimilarityConfig::default());
    }

    #[test]
    fn test_from_path_partial_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        fs::write(
            &path,
            "indexDir: /tmp/idx\nbatchSize: 7\nplaceholderPolicy: exclude\nquery:\n  defaultNeighbours: 5\n",
        )
        .unwrap();

        let config = SimilarityConfig::from_path(&path).unwrap();
        assert_eq!(config.index_dir, PathBuf::from("/tmp/idx"));
        assert_eq!(config.batch_size, 7);
        assert_eq!(config.placeholder_policy, PlaceholderPolicy::Exclude);
        assert_eq!(config.query.default_neighbours, 5);
        assert_eq!(config.query.max_neighbours, 1000);
    }

    #[test]
    fn test_invalid_yaml_and_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");

        fs::write(&path, "batchSize: [").unwrap();
        assert!(matches!(
            SimilarityConfig::from_path(&path),
            Err(SimilarityError::InvalidGlobalConfig(_))
        ));

        fs::write(&path, "batchSize: 0\n").unwrap();
        assert!(matches!(
            SimilarityConfig::from_path(&path),
            Err(SimilarityError::InvalidConfiguration { .. })
        ));

        fs::write(&path, "query:\n  defaultDistance: cosine\n").unwrap();
        assert!(SimilarityConfig::from_path(&path).is_err());
    }

    #[test]
    fn test_validate_warnings() {
        let mut config = SimilarityConfig::default();
        config.query.default_neighbours = 5000;
        config.backend = "missing".to_string();
        let warnings = config.validate().unwrap();
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_placeholder_policy_parse() {
        assert_eq!(
            "EXCLUDE".parse::<PlaceholderPolicy>(),
            Ok(PlaceholderPolicy::Exclude)
        );
        assert!("sometimes".parse::<PlaceholderPolicy>().is_err());
    }
}
