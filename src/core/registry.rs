//! In-memory registry of materialized artifacts for one source

use chrono::{DateTime, Utc};
use std::path::Path;

use crate::core::artifact::{ArtifactRecord, Materialized};
use crate::core::retention::RetentionPolicy;

/// Materialized records, kept ascending by observation time
#[derive(Debug, Default, Clone)]
pub struct Registry {
    records: Vec<ArtifactRecord>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ArtifactRecord] {
        &self.records
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.records.iter().any(|r| r.key == key)
    }

    pub fn contains_derived(&self, location: &Path) -> bool {
        self.records
            .iter()
            .any(|r| r.derived_location.as_deref() == Some(location))
    }

    /// Add a materialized record unless its derived location is already tracked.
    ///
    /// Returns `true` if the record was added.
    pub fn insert(&mut self, record: ArtifactRecord) -> bool {
        let Some(location) = record.derived_location.as_deref() else {
            return false;
        };
        if self.contains_derived(location) {
            return false;
        }
        let at = self
            .records
            .partition_point(|r| ArtifactRecord::chronological(r, &record).is_lt());
        self.records.insert(at, record);
        true
    }

    /// Append without ordering; `sort` must follow before the registry is read.
    pub(crate) fn push_unsorted(&mut self, record: ArtifactRecord) -> bool {
        match record.derived_location.as_deref() {
            Some(location) if !self.contains_derived(location) => {
                self.records.push(record);
                true
            }
            _ => false,
        }
    }

    pub fn sort(&mut self) {
        self.records.sort_by(ArtifactRecord::chronological);
    }

    /// Remove every record the policy no longer considers live.
    ///
    /// Walks from the newest record backwards; the first dead record found
    /// marks the boundary, and it plus everything older is split off.
    pub fn evict(&mut self, policy: &RetentionPolicy, now: DateTime<Utc>) -> Vec<ArtifactRecord> {
        self.sort();
        let boundary = self
            .records
            .iter()
            .rposition(|r| !policy.is_live(r, now));
        match boundary {
            Some(idx) => self.records.drain(..=idx).collect(),
            None => Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Ascending `(derived_location, observation_time)` pairs
    pub fn snapshot(&self) -> Vec<Materialized> {
        self.records
            .iter()
            .filter_map(Materialized::from_record)
            .collect()
    }
}
