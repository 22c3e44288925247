//! Artifact records: the unit of work tracked from discovery to purge

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::PathBuf;

/// Where a record sits in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStage {
    /// Listed by the catalog, nothing local yet
    Discovered,
    /// Raw payload on local disk
    Retrieved,
    /// Derived form present and tracked by the registry
    Materialized,
}

/// One remotely-addressable unit of sensor data and its local derivatives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Source-scoped identifier, also the dedupe key
    pub key: String,

    /// Sensor timestamp the artifact represents
    pub observation_time: DateTime<Utc>,

    /// Address handed to the transfer collaborator
    #[serde(default)]
    pub remote_locator: Option<String>,

    /// Raw payload location
    #[serde(default)]
    pub local_path: Option<PathBuf>,

    /// Servable artifact location
    #[serde(default)]
    pub derived_location: Option<PathBuf>,
}

impl ArtifactRecord {
    /// A freshly discovered record
    pub fn discovered(
        key: impl Into<String>,
        observation_time: DateTime<Utc>,
        remote_locator: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            observation_time,
            remote_locator: Some(remote_locator.into()),
            local_path: None,
            derived_location: None,
        }
    }

    /// A record rebuilt from an existing derived entry
    pub fn materialized(
        key: impl Into<String>,
        observation_time: DateTime<Utc>,
        derived_location: PathBuf,
    ) -> Self {
        Self {
            key: key.into(),
            observation_time,
            remote_locator: None,
            local_path: None,
            derived_location: Some(derived_location),
        }
    }

    pub fn stage(&self) -> ArtifactStage {
        if self.derived_location.is_some() {
            ArtifactStage::Materialized
        } else if self.local_path.is_some() {
            ArtifactStage::Retrieved
        } else {
            ArtifactStage::Discovered
        }
    }

    /// Record the derived location and drop the remote and raw addresses
    pub fn mark_materialized(&mut self, derived_location: PathBuf) {
        self.derived_location = Some(derived_location);
        self.remote_locator = None;
        self.local_path = None;
    }

    /// Ordering used by the registry: observation time, then key
    pub fn chronological(a: &ArtifactRecord, b: &ArtifactRecord) -> Ordering {
        a.observation_time
            .cmp(&b.observation_time)
            .then_with(|| a.key.cmp(&b.key))
    }
}

impl PartialEq for ArtifactRecord {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ArtifactRecord {}

/// One entry of a synchronize() result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Materialized {
    pub derived_location: PathBuf,
    pub observation_time: DateTime<Utc>,
}

impl Materialized {
    pub(crate) fn from_record(record: &ArtifactRecord) -> Option<Self> {
        record.derived_location.as_ref().map(|location| Self {
            derived_location: location.clone(),
            observation_time: record.observation_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 18, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_lifecycle_stages() {
        let mut record = ArtifactRecord::discovered("a", at(12, 0), "https://host/a");
        assert_eq!(record.stage(), ArtifactStage::Discovered);

        record.local_path = Some(PathBuf::from("/raw/a"));
        assert_eq!(record.stage(), ArtifactStage::Retrieved);

        record.mark_materialized(PathBuf::from("/tiles/a"));
        assert_eq!(record.stage(), ArtifactStage::Materialized);
        assert!(record.remote_locator.is_none());
        assert!(record.local_path.is_none());
    }

    #[test]
    fn test_equality_is_by_key() {
        let a = ArtifactRecord::discovered("a", at(12, 0), "x");
        let b = ArtifactRecord::materialized("a", at(13, 0), PathBuf::from("/tiles/a"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_ties_broken_by_key() {
        let mut records = vec![
            ArtifactRecord::discovered("c", at(12, 0), "x"),
            ArtifactRecord::discovered("a", at(12, 0), "x"),
            ArtifactRecord::discovered("b", at(11, 0), "x"),
        ];
        records.sort_by(ArtifactRecord::chronological);

        let keys: Vec<_> = records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_materialized_entry_requires_location() {
        let discovered = ArtifactRecord::discovered("a", at(12, 0), "x");
        assert!(Materialized::from_record(&discovered).is_none());

        let done = ArtifactRecord::materialized("a", at(12, 0), PathBuf::from("/tiles/a"));
        let entry = Materialized::from_record(&done).unwrap();
        assert_eq!(entry.derived_location, PathBuf::from("/tiles/a"));
        assert_eq!(entry.observation_time, at(12, 0));
    }
}
