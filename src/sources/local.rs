/*!
 * Local directory archive source
 *
 * Collaborators for upstream archives that are reachable as a plain
 * directory (an rsync mirror, an NFS export of the NOAA feed, a test
 * fixture). The transform places the payload as-is; real tiling chains plug
 * in their own `Transform`.
 */

use chrono::{DateTime, Utc};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::SourceConfig;
use crate::core::artifact::ArtifactRecord;
use crate::core::collaborator::{sanitize_entry_name, Catalog, Collaborators, Transfer, Transform};
use crate::error::{GeoSyncError, Result};
use crate::sources::NamingScheme;

/// File written next to every passthrough payload
pub const MANIFEST_FILE_NAME: &str = "artifact.json";

/// Build the collaborator set for a configured local source
pub fn local_collaborators(source: &SourceConfig) -> Result<Collaborators> {
    let catalog = DirectoryCatalog::new(&source.name, &source.upstream_dir, source.naming)
        .with_include(source.include.as_deref())?;
    Ok(Collaborators::new(
        catalog,
        CopyTransfer,
        PassthroughTransform,
        source.naming,
    ))
}

/// Lists the files of one upstream directory
#[derive(Debug, Clone)]
pub struct DirectoryCatalog {
    source: String,
    upstream_dir: PathBuf,
    naming: NamingScheme,
    include: Option<Pattern>,
}

impl DirectoryCatalog {
    pub fn new(source: &str, upstream_dir: impl Into<PathBuf>, naming: NamingScheme) -> Self {
        Self {
            source: source.to_string(),
            upstream_dir: upstream_dir.into(),
            naming,
            include: None,
        }
    }

    /// Only list file names matching this glob
    pub fn with_include(mut self, include: Option<&str>) -> Result<Self> {
        self.include = include
            .map(Pattern::new)
            .transpose()
            .map_err(|e| GeoSyncError::Config(format!("invalid include pattern: {}", e)))?;
        Ok(self)
    }
}

impl Catalog for DirectoryCatalog {
    fn discover(&self) -> Result<Vec<ArtifactRecord>> {
        let meta = fs::metadata(&self.upstream_dir).map_err(|e| {
            GeoSyncError::catalog(
                &self.source,
                format!("{}: {}", self.upstream_dir.display(), e),
            )
        })?;
        if !meta.is_dir() {
            return Err(GeoSyncError::catalog(
                &self.source,
                format!("{} is not a directory", self.upstream_dir.display()),
            ));
        }

        let mut records = Vec::new();
        for entry in WalkDir::new(&self.upstream_dir).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(source = %self.source, error = %e, "unreadable upstream entry skipped");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if let Some(ref include) = self.include {
                if !include.matches(name) {
                    continue;
                }
            }

            match self.naming.parse(name) {
                Some(observation_time) => records.push(ArtifactRecord::discovered(
                    name,
                    observation_time,
                    entry.path().to_string_lossy(),
                )),
                None => {
                    warn!(source = %self.source, file = name, scheme = %self.naming, "no observation time in upstream name, skipped")
                }
            }
        }

        debug!(source = %self.source, found = records.len(), "upstream listed");
        Ok(records)
    }
}

/// Copies the upstream file into the raw root
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyTransfer;

impl Transfer for CopyTransfer {
    fn retrieve(&self, record: &ArtifactRecord, raw_root: &Path) -> Result<PathBuf> {
        let locator = record
            .remote_locator
            .as_deref()
            .ok_or_else(|| GeoSyncError::transfer(&record.key, "record has no remote locator"))?;
        let target = raw_root.join(sanitize_entry_name(&record.key));

        copy_atomically(Path::new(locator), &target)
            .map_err(|e| GeoSyncError::transfer(&record.key, e))?;
        Ok(target)
    }
}

/// Copy through a temp file in the target directory so a failed copy never
/// leaves a partial file at `target`.
fn copy_atomically(source: &Path, target: &Path) -> io::Result<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut input = File::open(source)?;
    let mut staged = NamedTempFile::new_in(dir)?;
    io::copy(&mut input, staged.as_file_mut())?;
    staged.as_file().sync_all()?;
    staged.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// Metadata written beside a passthrough payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub key: String,
    pub observation_time: DateTime<Utc>,
    pub source_locator: Option<String>,
}

/// Places the raw payload and a manifest in the derived entry
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughTransform;

impl Transform for PassthroughTransform {
    fn transform(&self, record: &ArtifactRecord, output_dir: &Path) -> Result<()> {
        let payload = record
            .local_path
            .as_deref()
            .ok_or_else(|| GeoSyncError::transform(&record.key, "record was never retrieved"))?;
        let file_name = payload
            .file_name()
            .ok_or_else(|| GeoSyncError::transform(&record.key, "payload path has no file name"))?;

        fs::copy(payload, output_dir.join(file_name))?;

        let manifest = ArtifactManifest {
            key: record.key.clone(),
            observation_time: record.observation_time,
            source_locator: record.remote_locator.clone(),
        };
        let writer = BufWriter::new(File::create(output_dir.join(MANIFEST_FILE_NAME))?);
        serde_json::to_writer_pretty(writer, &manifest)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const NAME_A: &str = "MRMS_Reflectivity_0C_00.50_20240618-120000.grib2.gz";
    const NAME_B: &str = "MRMS_Reflectivity_0C_00.50_20240618-120200.grib2.gz";

    #[test]
    fn test_catalog_lists_and_filters() {
        let upstream = tempfile::tempdir().unwrap();
        fs::write(upstream.path().join(NAME_A), b"a").unwrap();
        fs::write(upstream.path().join(NAME_B), b"b").unwrap();
        fs::write(upstream.path().join("MRMS_Reflectivity_0C.latest.grib2.gz"), b"l").unwrap();
        fs::write(upstream.path().join("index.html"), b"<html>").unwrap();
        fs::create_dir(upstream.path().join("subdir")).unwrap();

        let catalog = DirectoryCatalog::new("mrms", upstream.path(), NamingScheme::Mrms)
            .with_include(Some("*.grib2.gz"))
            .unwrap();
        let mut records = catalog.discover().unwrap();
        records.sort_by(ArtifactRecord::chronological);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, NAME_A);
        assert_eq!(
            records[0].observation_time,
            Utc.with_ymd_and_hms(2024, 6, 18, 12, 0, 0).unwrap()
        );
        assert!(records[0]
            .remote_locator
            .as_deref()
            .unwrap()
            .ends_with(NAME_A));
    }

    #[test]
    fn test_catalog_empty_is_not_an_error() {
        let upstream = tempfile::tempdir().unwrap();
        let catalog = DirectoryCatalog::new("mrms", upstream.path(), NamingScheme::Mrms);
        assert!(catalog.discover().unwrap().is_empty());
    }

    #[test]
    fn test_catalog_missing_dir_is_fatal() {
        let upstream = tempfile::tempdir().unwrap();
        let catalog =
            DirectoryCatalog::new("mrms", upstream.path().join("gone"), NamingScheme::Mrms);

        let err = catalog.discover().unwrap_err();
        assert!(matches!(err, GeoSyncError::Catalog { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_invalid_include_pattern() {
        let result = DirectoryCatalog::new("mrms", "/tmp", NamingScheme::Mrms)
            .with_include(Some("[unclosed"));
        assert!(matches!(result, Err(GeoSyncError::Config(_))));
    }

    #[test]
    fn test_copy_transfer() {
        let upstream = tempfile::tempdir().unwrap();
        let raw = tempfile::tempdir().unwrap();
        let source = upstream.path().join(NAME_A);
        fs::write(&source, b"grib bytes").unwrap();

        let record = ArtifactRecord::discovered(
            NAME_A,
            Utc::now(),
            source.to_string_lossy(),
        );
        let local = CopyTransfer.retrieve(&record, raw.path()).unwrap();
        // Retrieving twice is harmless
        let again = CopyTransfer.retrieve(&record, raw.path()).unwrap();

        assert_eq!(local, again);
        assert_eq!(fs::read(&local).unwrap(), b"grib bytes");
        assert_eq!(fs::read_dir(raw.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_copy_transfer_failure_leaves_nothing() {
        let raw = tempfile::tempdir().unwrap();
        let record = ArtifactRecord::discovered(NAME_A, Utc::now(), "/definitely/not/here");

        let err = CopyTransfer.retrieve(&record, raw.path()).unwrap_err();

        assert!(matches!(err, GeoSyncError::Transfer { .. }));
        assert_eq!(fs::read_dir(raw.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_passthrough_transform_writes_manifest() {
        let raw = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let payload = raw.path().join(NAME_A);
        fs::write(&payload, b"grib bytes").unwrap();

        let observed = Utc.with_ymd_and_hms(2024, 6, 18, 12, 0, 0).unwrap();
        let mut record = ArtifactRecord::discovered(NAME_A, observed, "upstream/a");
        record.local_path = Some(payload);

        PassthroughTransform.transform(&record, out.path()).unwrap();

        assert_eq!(fs::read(out.path().join(NAME_A)).unwrap(), b"grib bytes");
        let manifest: ArtifactManifest = serde_json::from_reader(
            File::open(out.path().join(MANIFEST_FILE_NAME)).unwrap(),
        )
        .unwrap();
        assert_eq!(manifest.key, NAME_A);
        assert_eq!(manifest.observation_time, observed);
        assert_eq!(manifest.source_locator.as_deref(), Some("upstream/a"));
    }

    #[test]
    fn test_passthrough_requires_payload() {
        let out = tempfile::tempdir().unwrap();
        let record = ArtifactRecord::discovered(NAME_A, Utc::now(), "x");
        assert!(PassthroughTransform.transform(&record, out.path()).is_err());
    }
}
