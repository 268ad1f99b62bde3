//! Identifier resolution between external `(gid, offset)` pairs and internal ids.
//!
//! Global ids are compared case-insensitively; every gid leaving this module
//! is lower-case.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use resonance_db::store::FeatureStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::db_adapter::IntoSimilarityResult;
use crate::errors::SimilarityError;

// ============================================================================
// RecordingRef
// ============================================================================

/// External identity of a submission: global id plus submission offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordingRef {
    /// Lower-cased global id.
    pub gid: String,
    /// Submission offset.
    pub offset: u32,
}

impl RecordingRef {
    /// Create a reference, lower-casing `gid`.
    pub fn new(gid: impl AsRef<str>, offset: u32) -> Self {
        Self {
            gid: gid.as_ref().to_lowercase(),
            offset,
        }
    }
}

impl fmt::Display for RecordingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.gid, self.offset)
    }
}

impl FromStr for RecordingRef {
    type Err = SimilarityError;

    /// Parse `gid` or `gid:offset`. The gid must be a UUID; the offset
    /// defaults to 0.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| SimilarityError::InvalidRecordingId {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = s.trim();
        let (gid, offset) = match trimmed.split_once(':') {
            Some((gid, offset)) => (gid, Some(offset)),
            None => (trimmed, None),
        };

        let gid = Uuid::parse_str(gid).map_err(|_| invalid("not a valid UUID"))?;
        let offset = match offset {
            None => 0,
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|_| invalid("offset must be a non-negative integer"))?,
        };

        Ok(Self {
            gid: gid.hyphenated().to_string(),
            offset,
        })
    }
}

/// Parse a `;`-separated list of recording identifiers.
///
/// Empty segments (e.g. a trailing `;`) are ignored.
pub fn parse_recording_list(input: &str) -> Result<Vec<RecordingRef>, SimilarityError> {
    input
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(RecordingRef::from_str)
        .collect()
}

// ============================================================================
// IdentifierResolver
// ============================================================================

/// Bidirectional mapping between [`RecordingRef`]s and internal ids.
#[derive(Clone)]
pub struct IdentifierResolver {
    store: Arc<dyn FeatureStore>,
}

impl IdentifierResolver {
    /// Create a resolver over `store`.
    pub fn new(store: Arc<dyn FeatureStore>) -> Self {
        Self { store }
    }

    /// Internal id of the submission `(gid, offset)`.
    ///
    /// Fails with [`SimilarityError::NoSubmission`] if there is none.
    pub fn resolve_to_id(&self, gid: &str, offset: u32) -> Result<u32, SimilarityError> {
        let gid = gid.to_lowercase();
        match self
            .store
            .resolve_submission(&gid, offset)
            .into_similarity_result()?
        {
            Some(id) => {
                trace!("Resolved ({}, {}) to id {}", gid, offset, id);
                Ok(id)
            }
            None => Err(SimilarityError::NoSubmission { gid, offset }),
        }
    }

    /// Like [`resolve_to_id`](Self::resolve_to_id), but maps a missing
    /// submission to `None`.
    pub fn try_resolve(&self, recording: &RecordingRef) -> Result<Option<u32>, SimilarityError> {
        match self.resolve_to_id(&recording.gid, recording.offset) {
            Ok(id) => Ok(Some(id)),
            Err(SimilarityError::NoSubmission { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// External identities of `ids`. Unknown ids are omitted.
    pub fn resolve_many_from_ids(
        &self,
        ids: &[u32],
    ) -> Result<HashMap<u32, RecordingRef>, SimilarityError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = self.store.recordings_by_ids(ids).into_similarity_result()?;
        if rows.len() < ids.len() {
            debug!(
                "Resolved {} of {} ids; the rest are unknown",
                rows.len(),
                ids.len()
            );
        }

        Ok(rows
            .into_iter()
            .map(|row| (row.id, RecordingRef::new(row.gid, row.offset)))
            .collect())
    }
}

impl fmt::Debug for IdentifierResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentifierResolver").finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seeded_store, GID_A, GID_B};

    fn resolver() -> IdentifierResolver {
        IdentifierResolver::new(Arc::new(seeded_store()))
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let resolver = resolver();
        let upper = "0DAD432B-16CC-4BF0-8961-FD31D124B01B";
        let lower = upper.to_lowercase();
        assert_eq!(GID_A, lower);

        let a = resolver.resolve_to_id(upper, 0).unwrap();
        let b = resolver.resolve_to_id(&lower, 0).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, 1);
    }

    #[test]
    fn test_resolve_missing_submission() {
        let resolver = resolver();
        let err = resolver.resolve_to_id(GID_A, 9).unwrap_err();
        match err {
            SimilarityError::NoSubmission { gid, offset } => {
                assert_eq!(gid, GID_A);
                assert_eq!(offset, 9);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            resolver.try_resolve(&RecordingRef::new(GID_A, 9)).unwrap(),
            None
        );
    }

    #[test]
    fn test_resolve_many_omits_unknown() {
        let resolver = resolver();
        let map = resolver.resolve_many_from_ids(&[1, 3, 999]).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&1], RecordingRef::new(GID_A, 0));
        assert_eq!(map[&3], RecordingRef::new(GID_B, 0));
        assert!(resolver.resolve_many_from_ids(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_recording_ref_parse() {
        let r: RecordingRef = "0DAD432B-16CC-4BF0-8961-FD31D124B01B:3".parse().unwrap();
        assert_eq!(r.gid, GID_A);
        assert_eq!(r.offset, 3);

        let r: RecordingRef = GID_B.parse().unwrap();
        assert_eq!(r.offset, 0);
        assert_eq!(r.to_string(), format!("{}:0", GID_B));

        for bad in [
            "not-a-uuid",
            "0dad432b-16cc-4bf0-8961-fd31d124b01b:-1",
            "0dad432b-16cc-4bf0-8961-fd31d124b01b:x",
        ] {
            assert!(matches!(
                bad.parse::<RecordingRef>(),
                Err(SimilarityError::InvalidRecordingId { .. })
            ));
        }
    }

    #[test]
    fn test_parse_recording_list() {
        let list = parse_recording_list(&format!("{GID_A};{GID_B}:2;")).unwrap();
        assert_eq!(
            list,
            vec![RecordingRef::new(GID_A, 0), RecordingRef::new(GID_B, 2)]
        );
        assert!(parse_recording_list("").unwrap().is_empty());
        assert!(parse_recording_list(&format!("{GID_A};bogus")).is_err());
    }
}
