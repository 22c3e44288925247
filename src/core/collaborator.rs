/*!
 * Collaborator contracts consumed by the sync engine
 *
 * Each data source supplies one implementation of every trait here. The
 * engine never sees how a catalog is scraped, how bytes are fetched, or how a
 * raster becomes tiles; it only sequences these calls.
 */

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::artifact::ArtifactRecord;
use crate::error::Result;

/// Lists what is currently available upstream.
pub trait Catalog: Send + Sync {
    /// Records with `key`, `observation_time` and `remote_locator` set.
    ///
    /// Errors only when the listing as a whole is unavailable; an upstream
    /// with nothing new returns an empty vector.
    fn discover(&self) -> Result<Vec<ArtifactRecord>>;
}

/// Fetches a record's raw payload into local storage.
pub trait Transfer: Send + Sync {
    /// Retrieve into `raw_root`, returning the payload path.
    ///
    /// Must be idempotent and must not leave a partial file behind on error.
    fn retrieve(&self, record: &ArtifactRecord, raw_root: &Path) -> Result<PathBuf>;
}

/// Converts a retrieved payload into its servable form.
pub trait Transform: Send + Sync {
    /// Write the derived artifact for `record` into `output_dir`.
    ///
    /// `output_dir` is a private scratch directory; the engine moves it into
    /// place on success and deletes it on failure.
    fn transform(&self, record: &ArtifactRecord, output_dir: &Path) -> Result<()>;

    /// Called once after every unit, on success, failure and panic alike,
    /// before the worker takes its next unit.
    fn release_resources(&self) {}
}

/// Maps keys to derived entries and back.
pub trait Layout: Send + Sync {
    /// Name of the derived entry for `key`
    fn entry_name(&self, key: &str) -> String {
        sanitize_entry_name(key)
    }

    /// Deterministic derived path for `key`; pure, no I/O
    fn derive_path(&self, derived_root: &Path, key: &str) -> PathBuf {
        derived_root.join(self.entry_name(key))
    }

    /// Observation time encoded in a derived entry name
    fn parse_observation_time(&self, entry_name: &str) -> Option<DateTime<Utc>>;
}

/// File name of a key with path separators flattened
pub fn sanitize_entry_name(key: &str) -> String {
    key.trim_matches(|c| c == '/' || c == '\\')
        .replace(['/', '\\'], "_")
}

/// The full set of collaborators for one source
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn Catalog>,
    pub transfer: Arc<dyn Transfer>,
    pub transform: Arc<dyn Transform>,
    pub layout: Arc<dyn Layout>,
}

impl Collaborators {
    pub fn new(
        catalog: impl Catalog + 'static,
        transfer: impl Transfer + 'static,
        transform: impl Transform + 'static,
        layout: impl Layout + 'static,
    ) -> Self {
        Self {
            catalog: Arc::new(catalog),
            transfer: Arc::new(transfer),
            transform: Arc::new(transform),
            layout: Arc::new(layout),
        }
    }
}
