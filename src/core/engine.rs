/*!
 * Sync Engine
 *
 * Drives one source from "what exists upstream" to "what is correctly
 * represented locally". A cycle runs, in order:
 *
 * 1. discover  - list upstream (failure aborts the cycle)
 * 2. filter    - drop records already outside the retention window
 * 3. dedupe    - skip or adopt records whose derived path already exists
 * 4. retrieve  - fetch raw payloads, sequentially
 * 5. transform - materialize payloads on the worker pool
 * 6. reclaim   - delete every raw payload fetched this cycle
 * 7. evict     - apply retention to the whole registry
 * 8. return    - registry snapshot, ascending by observation time
 *
 * The disk is the source of truth for "already done": the registry is a
 * cache rebuilt from the derived root at construction.
 */

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::{SourceConfig, SyncConfig};
use crate::core::artifact::{ArtifactRecord, Materialized};
use crate::core::collaborator::{Collaborators, Layout, Transform};
use crate::core::pool::TransformPool;
use crate::core::registry::Registry;
use crate::core::retention::{Clock, RetentionPolicy, SystemClock};
use crate::error::{GeoSyncError, Result};

/// Scratch area for in-flight transforms, inside the derived root so the
/// final rename never crosses filesystems.
pub const STAGING_DIR_NAME: &str = ".geosync-staging";

/// Construction parameters for one engine
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub name: String,
    pub raw_root: PathBuf,
    pub derived_root: PathBuf,
    pub sync: SyncConfig,
}

impl EngineSettings {
    pub fn new(
        name: impl Into<String>,
        raw_root: impl Into<PathBuf>,
        derived_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            raw_root: raw_root.into(),
            derived_root: derived_root.into(),
            sync: SyncConfig::default(),
        }
    }

    pub fn with_time_window(mut self, window: Duration) -> Self {
        self.sync.time_window_secs = window.as_secs();
        self
    }

    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }
}

impl From<&SourceConfig> for EngineSettings {
    fn from(source: &SourceConfig) -> Self {
        Self {
            name: source.name.clone(),
            raw_root: source.raw_root.clone(),
            derived_root: source.derived_root.clone(),
            sync: source.sync.clone(),
        }
    }
}

/// Counters for one synchronize() call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleStats {
    pub discovered: u64,
    pub expired_on_discovery: u64,
    pub duplicates: u64,
    pub already_present: u64,
    pub adopted: u64,
    pub retrieved: u64,
    pub transfer_failures: u64,
    pub materialized: u64,
    pub transform_failures: u64,
    pub payloads_reclaimed: u64,
    /// Records dropped from the registry by retention
    pub evicted: u64,
    /// Evicted records whose delete failed and was queued for retry
    pub purge_deferred: u64,
    pub duration_ms: u64,
}

impl CycleStats {
    /// True when no record was dropped by a transfer or transform failure
    pub fn is_clean(&self) -> bool {
        self.transfer_failures == 0 && self.transform_failures == 0
    }
}

pub struct SyncEngine {
    name: String,
    raw_root: PathBuf,
    derived_root: PathBuf,
    staging_root: PathBuf,
    policy: RetentionPolicy,
    pool: TransformPool,
    collaborators: Collaborators,
    clock: Arc<dyn Clock>,
    registry: Registry,
    pending_purges: Vec<PathBuf>,
    last_cycle: Option<CycleStats>,
}

impl SyncEngine {
    /// Create an engine on the wall clock and rebuild its registry from disk
    pub fn new(settings: EngineSettings, collaborators: Collaborators) -> Result<Self> {
        Self::with_clock(settings, collaborators, Arc::new(SystemClock))
    }

    pub fn with_clock(
        settings: EngineSettings,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        settings.sync.validate()?;
        let policy = RetentionPolicy::new(settings.sync.time_window())?;
        let pool = TransformPool::new(settings.sync.worker_pool_width, settings.sync.chunk_size)?;

        fs::create_dir_all(&settings.raw_root)?;
        fs::create_dir_all(&settings.derived_root)?;

        // Leftovers here are transforms interrupted by a crash
        let staging_root = settings.derived_root.join(STAGING_DIR_NAME);
        remove_path(&staging_root)?;
        fs::create_dir_all(&staging_root)?;

        let mut engine = Self {
            name: settings.name,
            raw_root: settings.raw_root,
            derived_root: settings.derived_root,
            staging_root,
            policy,
            pool,
            collaborators,
            clock,
            registry: Registry::new(),
            pending_purges: Vec::new(),
            last_cycle: None,
        };
        engine.bootstrap()?;
        Ok(engine)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn raw_root(&self) -> &Path {
        &self.raw_root
    }

    pub fn derived_root(&self) -> &Path {
        &self.derived_root
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Current registry as returned by synchronize()
    pub fn materialized(&self) -> Vec<Materialized> {
        self.registry.snapshot()
    }

    /// Statistics of the most recent completed cycle
    pub fn last_cycle(&self) -> Option<&CycleStats> {
        self.last_cycle.as_ref()
    }

    /// Derived locations whose deletion failed and will be retried
    pub fn pending_purges(&self) -> &[PathBuf] {
        &self.pending_purges
    }

    /// Deterministic derived path for a key
    pub fn derive_path(&self, key: &str) -> PathBuf {
        self.collaborators
            .layout
            .derive_path(&self.derived_root, key)
    }

    /// Forget the in-memory registry and rebuild it from the derived root
    pub fn reload(&mut self) -> Result<()> {
        self.registry.clear();
        self.bootstrap()
    }

    /// Run one full cycle and return the servable artifacts, oldest first.
    ///
    /// Only a catalog failure is returned as an error, and it leaves the
    /// registry untouched. Per-record failures are logged and show up as
    /// missing entries in the result.
    pub fn synchronize(&mut self) -> Result<Vec<Materialized>> {
        let started = Instant::now();
        let now = self.clock.now();
        let mut stats = CycleStats::default();

        info!(source = %self.name, %now, "sync cycle started");

        let discovered = self.discover()?;
        stats.discovered = discovered.len() as u64;

        let live = self.filter_live(discovered, now, &mut stats);
        let queued = self.dedupe(live, &mut stats);
        let retrieved = self.retrieve_all(queued, &mut stats);
        let payloads = self.transform_all(retrieved, &mut stats);
        self.reclaim_payloads(&payloads, &mut stats);

        self.registry.sort();
        let eviction = self.evict(now);
        stats.evicted = eviction.evicted;
        stats.purge_deferred = eviction.deferred;

        stats.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            source = %self.name,
            discovered = stats.discovered,
            adopted = stats.adopted,
            materialized = stats.materialized,
            transfer_failures = stats.transfer_failures,
            transform_failures = stats.transform_failures,
            evicted = stats.evicted,
            purge_deferred = stats.purge_deferred,
            registry = self.registry.len(),
            duration_ms = stats.duration_ms,
            "sync cycle finished"
        );
        self.last_cycle = Some(stats);

        Ok(self.registry.snapshot())
    }

    fn discover(&self) -> Result<Vec<ArtifactRecord>> {
        self.collaborators.catalog.discover().map_err(|e| {
            let err = match e {
                GeoSyncError::Catalog { .. } => e,
                other => GeoSyncError::catalog(&self.name, other),
            };
            error!(source = %self.name, error = %err, "catalog unavailable, cycle aborted");
            err
        })
    }

    fn filter_live(
        &self,
        discovered: Vec<ArtifactRecord>,
        now: DateTime<Utc>,
        stats: &mut CycleStats,
    ) -> Vec<ArtifactRecord> {
        let (live, expired): (Vec<_>, Vec<_>) = discovered
            .into_iter()
            .partition(|record| self.policy.is_live(record, now));
        stats.expired_on_discovery = expired.len() as u64;
        if !expired.is_empty() {
            debug!(
                source = %self.name,
                expired = expired.len(),
                cutoff = %self.policy.cutoff(now),
                "skipping records outside the retention window"
            );
        }
        live
    }

    fn dedupe(&mut self, live: Vec<ArtifactRecord>, stats: &mut CycleStats) -> Vec<ArtifactRecord> {
        let mut seen = HashSet::new();
        let mut queued = Vec::new();

        for mut record in live {
            // Keys that collapse onto the same derived entry count as duplicates
            let target = self.derive_path(&record.key);
            if !seen.insert(target.clone()) {
                stats.duplicates += 1;
                continue;
            }

            if !target.exists() {
                queued.push(record);
                continue;
            }

            stats.already_present += 1;
            if !self.registry.contains_derived(&target) {
                debug!(source = %self.name, key = %record.key, path = %target.display(), "adopting existing derived entry");
                record.mark_materialized(target);
                if self.registry.push_unsorted(record) {
                    stats.adopted += 1;
                }
            }
        }

        queued
    }

    fn retrieve_all(
        &self,
        queued: Vec<ArtifactRecord>,
        stats: &mut CycleStats,
    ) -> Vec<ArtifactRecord> {
        let mut retrieved = Vec::with_capacity(queued.len());

        // Sequential on purpose: upstreams are rate limited
        for mut record in queued {
            match self
                .collaborators
                .transfer
                .retrieve(&record, &self.raw_root)
            {
                Ok(local_path) => {
                    debug!(source = %self.name, key = %record.key, path = %local_path.display(), "retrieved");
                    record.local_path = Some(local_path);
                    stats.retrieved += 1;
                    retrieved.push(record);
                }
                Err(e) => {
                    stats.transfer_failures += 1;
                    warn!(source = %self.name, key = %record.key, error = %e, "transfer failed, record skipped this cycle");
                }
            }
        }

        retrieved
    }

    /// Materialize every retrieved record; returns the raw payload paths.
    fn transform_all(
        &mut self,
        retrieved: Vec<ArtifactRecord>,
        stats: &mut CycleStats,
    ) -> Vec<PathBuf> {
        if retrieved.is_empty() {
            return Vec::new();
        }

        let materializer = Materializer {
            derived_root: &self.derived_root,
            staging_root: &self.staging_root,
            layout: self.collaborators.layout.as_ref(),
            transform: self.collaborators.transform.as_ref(),
        };
        let outcomes = self
            .pool
            .run_chunked(retrieved, |record| materializer.materialize(record));

        let mut payloads = Vec::with_capacity(outcomes.len());
        for (mut record, outcome) in outcomes {
            if let Some(local_path) = record.local_path.take() {
                payloads.push(local_path);
            }
            match outcome {
                Ok(location) => {
                    record.mark_materialized(location);
                    if self.registry.push_unsorted(record) {
                        stats.materialized += 1;
                    }
                }
                Err(e) => {
                    stats.transform_failures += 1;
                    warn!(source = %self.name, key = %record.key, error = %e, "transform failed, record discarded");
                }
            }
        }

        payloads
    }

    fn reclaim_payloads(&self, payloads: &[PathBuf], stats: &mut CycleStats) {
        for payload in payloads {
            match remove_path(payload) {
                Ok(()) => stats.payloads_reclaimed += 1,
                Err(e) => {
                    warn!(source = %self.name, path = %payload.display(), error = %e, "failed to delete raw payload")
                }
            }
        }
    }

    /// Drop every non-live record from the registry and from disk.
    fn evict(&mut self, now: DateTime<Utc>) -> Eviction {
        self.retry_pending_purges();

        let mut outcome = Eviction::default();
        for record in self.registry.evict(&self.policy, now) {
            outcome.evicted += 1;
            let Some(location) = record.derived_location else {
                continue;
            };
            match remove_path(&location) {
                Ok(()) => {
                    debug!(source = %self.name, key = %record.key, path = %location.display(), "evicted");
                }
                Err(e) => {
                    warn!(source = %self.name, path = %location.display(), error = %e, "eviction delete failed, will retry");
                    outcome.deferred += 1;
                    // A reload can evict the same undeleted entry again
                    if !self.pending_purges.contains(&location) {
                        self.pending_purges.push(location);
                    }
                }
            }
        }
        outcome
    }

    fn retry_pending_purges(&mut self) {
        let name = &self.name;
        self.pending_purges.retain(|location| match remove_path(location) {
            Ok(()) => {
                debug!(source = %name, path = %location.display(), "deferred purge completed");
                false
            }
            Err(e) => {
                warn!(source = %name, path = %location.display(), error = %e, "deferred purge failed again");
                true
            }
        });
    }

    /// Rebuild the registry from the derived root, then evict.
    fn bootstrap(&mut self) -> Result<()> {
        let (records, skipped) = scan_derived(
            &self.name,
            &self.derived_root,
            self.collaborators.layout.as_ref(),
        );
        let mut recovered = 0usize;
        for record in records {
            if self.registry.push_unsorted(record) {
                recovered += 1;
            }
        }

        self.registry.sort();
        let now = self.clock.now();
        let eviction = self.evict(now);

        info!(
            source = %self.name,
            recovered,
            skipped,
            evicted = eviction.evicted,
            purge_deferred = eviction.deferred,
            registry = self.registry.len(),
            "registry rebuilt from disk"
        );
        Ok(())
    }
}

/// Live entries of a derived root, oldest first, without touching the disk.
///
/// Unlike constructing a `SyncEngine`, this never clears staging or deletes
/// expired entries, so it is safe to run beside an engine working on the
/// same roots.
pub fn inspect_derived(
    source: &str,
    derived_root: &Path,
    layout: &dyn Layout,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Vec<Materialized> {
    if !derived_root.is_dir() {
        return Vec::new();
    }
    let (records, _) = scan_derived(source, derived_root, layout);
    let mut registry = Registry::new();
    for record in records.into_iter().filter(|r| policy.is_live(r, now)) {
        registry.insert(record);
    }
    registry.snapshot()
}

/// One materialized record per parseable entry of `derived_root`, plus the
/// number of entries skipped. Dot-prefixed entries are ignored.
fn scan_derived(
    source: &str,
    derived_root: &Path,
    layout: &dyn Layout,
) -> (Vec<ArtifactRecord>, usize) {
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for entry in WalkDir::new(derived_root).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(source, error = %e, "unreadable derived entry skipped");
                skipped += 1;
                continue;
            }
        };
        let Some(name) = entry.file_name().to_str() else {
            warn!(source, path = %entry.path().display(), "non UTF-8 derived entry skipped");
            skipped += 1;
            continue;
        };
        if name.starts_with('.') {
            continue;
        }

        match layout.parse_observation_time(name) {
            Some(observation_time) => records.push(ArtifactRecord::materialized(
                name,
                observation_time,
                entry.path().to_path_buf(),
            )),
            None => {
                let err = GeoSyncError::UnparsableEntry(entry.path().to_path_buf());
                warn!(source, error = %err, "derived entry ignored");
                skipped += 1;
            }
        }
    }

    (records, skipped)
}

/// Counts from one eviction pass
#[derive(Debug, Default, Clone, Copy)]
struct Eviction {
    evicted: u64,
    deferred: u64,
}

/// Borrowed view of what a worker needs to materialize one record
struct Materializer<'a> {
    derived_root: &'a Path,
    staging_root: &'a Path,
    layout: &'a dyn Layout,
    transform: &'a dyn Transform,
}

impl Materializer<'_> {
    fn materialize(&self, record: &ArtifactRecord) -> Result<PathBuf> {
        let target = self.layout.derive_path(self.derived_root, &record.key);
        let scope = UnitScope::open(self.staging_root, self.transform)
            .map_err(|e| GeoSyncError::transform(&record.key, e))?;

        let outcome = self
            .transform
            .transform(record, scope.output_dir())
            .map_err(|e| match e {
                GeoSyncError::Transform { .. } => e,
                other => GeoSyncError::transform(&record.key, other),
            })
            .and_then(|()| {
                scope
                    .commit(&target)
                    .map_err(|e| GeoSyncError::transform(&record.key, e))
            });

        if outcome.is_err() {
            if let Err(e) = remove_path(&target) {
                warn!(key = %record.key, path = %target.display(), error = %e, "failed to remove partial derived output");
            }
        }
        outcome
    }
}

/// Resources owned by one transform unit.
///
/// Holds the scratch output directory and, on every exit path, tells the
/// transform to release its buffers before the worker moves on.
struct UnitScope<'a> {
    staging: TempDir,
    transform: &'a dyn Transform,
}

impl<'a> UnitScope<'a> {
    fn open(staging_root: &Path, transform: &'a dyn Transform) -> io::Result<Self> {
        let staging = tempfile::Builder::new()
            .prefix("unit-")
            .tempdir_in(staging_root)?;
        Ok(Self { staging, transform })
    }

    fn output_dir(&self) -> &Path {
        self.staging.path()
    }

    /// Move the finished output to `target` in one rename
    fn commit(self, target: &Path) -> io::Result<PathBuf> {
        remove_path(target)?;
        fs::rename(self.staging.path(), target)?;
        Ok(target.to_path_buf())
    }
}

impl Drop for UnitScope<'_> {
    fn drop(&mut self) {
        self.transform.release_resources();
    }
}

/// Delete a file or directory tree; a missing path is not an error.
pub(crate) fn remove_path(path: &Path) -> io::Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collaborator::{Catalog, Transfer};
    use crate::core::retention::ManualClock;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 18, 12, 0, 0).unwrap()
    }

    struct EmptyCatalog;

    impl Catalog for EmptyCatalog {
        fn discover(&self) -> Result<Vec<ArtifactRecord>> {
            Ok(Vec::new())
        }
    }

    struct NoTransfer;

    impl Transfer for NoTransfer {
        fn retrieve(&self, record: &ArtifactRecord, _raw_root: &Path) -> Result<PathBuf> {
            Err(GeoSyncError::transfer(&record.key, "offline"))
        }
    }

    #[derive(Default)]
    struct CountingTransform {
        releases: AtomicUsize,
        fail: bool,
    }

    impl Transform for CountingTransform {
        fn transform(&self, _record: &ArtifactRecord, output_dir: &Path) -> Result<()> {
            fs::write(output_dir.join("0.png"), b"tile")?;
            if self.fail {
                return Err(GeoSyncError::Other("render failed".to_string()));
            }
            Ok(())
        }

        fn release_resources(&self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Entry names are minutes before `now()`
    struct MinutesLayout;

    impl Layout for MinutesLayout {
        fn parse_observation_time(&self, entry_name: &str) -> Option<DateTime<Utc>> {
            let minutes: i64 = entry_name.strip_prefix('m')?.parse().ok()?;
            Some(now() - ChronoDuration::minutes(minutes))
        }
    }

    fn engine_in(dir: &Path) -> SyncEngine {
        let settings = EngineSettings::new("test", dir.join("raw"), dir.join("derived"))
            .with_time_window(Duration::from_secs(3600));
        let collaborators =
            Collaborators::new(EmptyCatalog, NoTransfer, CountingTransform::default(), MinutesLayout);
        SyncEngine::with_clock(settings, collaborators, Arc::new(ManualClock::new(now()))).unwrap()
    }

    #[test]
    fn test_bootstrap_recovers_and_evicts() {
        let dir = tempfile::tempdir().unwrap();
        let derived = dir.path().join("derived");
        for name in ["m10", "m45", "m70", "garbage"] {
            fs::create_dir_all(derived.join(name)).unwrap();
        }

        let engine = engine_in(dir.path());

        let keys: Vec<_> = engine.registry().records().iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["m45", "m10"]);
        assert!(!derived.join("m70").exists());
        // Unparsable entries are ignored, not deleted
        assert!(derived.join("garbage").exists());
    }

    #[test]
    fn test_stale_staging_cleared_on_start() {
        let dir = tempfile::tempdir().unwrap();
        let leftover = dir.path().join("derived").join(STAGING_DIR_NAME).join("unit-old");
        fs::create_dir_all(&leftover).unwrap();

        let engine = engine_in(dir.path());

        assert!(!leftover.exists());
        assert!(engine.derived_root().join(STAGING_DIR_NAME).is_dir());
        assert!(engine.registry().is_empty());
    }

    #[test]
    fn test_empty_cycle_still_records_stats() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_in(dir.path());

        let result = engine.synchronize().unwrap();

        assert!(result.is_empty());
        let stats = engine.last_cycle().unwrap();
        assert_eq!(stats.discovered, 0);
        assert!(stats.is_clean());
    }

    #[test]
    fn test_unit_scope_commit_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let transform = CountingTransform::default();
        let target = dir.path().join("out");

        let scope = UnitScope::open(dir.path(), &transform).unwrap();
        fs::write(scope.output_dir().join("0.png"), b"tile").unwrap();
        scope.commit(&target).unwrap();

        assert!(target.join("0.png").exists());
        assert_eq!(transform.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_materialize_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        fs::create_dir_all(&staging).unwrap();
        let transform = CountingTransform {
            fail: true,
            ..Default::default()
        };
        let materializer = Materializer {
            derived_root: dir.path(),
            staging_root: &staging,
            layout: &MinutesLayout,
            transform: &transform,
        };
        let record = ArtifactRecord::discovered("m5", now(), "x");

        let err = materializer.materialize(&record).unwrap_err();

        assert!(matches!(err, GeoSyncError::Transform { .. }));
        assert!(!dir.path().join("m5").exists());
        assert_eq!(fs::read_dir(&staging).unwrap().count(), 0);
        assert_eq!(transform.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pending_purge_retried_next_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_in(dir.path());
        let leftover = dir.path().join("derived-old").join("m90");
        fs::create_dir_all(leftover.join("3/2")).unwrap();
        engine.pending_purges.push(leftover.clone());

        engine.synchronize().unwrap();

        assert!(!leftover.exists());
        assert!(engine.pending_purges().is_empty());
    }

    #[test]
    fn test_undeletable_eviction_stays_queued_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_in(dir.path());
        // Removing a path below a regular file fails with something other than NotFound
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();
        let stuck = blocker.join("m70");
        let stale = || {
            ArtifactRecord::materialized("m70", now() - ChronoDuration::minutes(70), stuck.clone())
        };

        engine.registry.push_unsorted(stale());
        engine.synchronize().unwrap();

        let stats = engine.last_cycle().unwrap();
        assert_eq!(stats.evicted, 1);
        assert_eq!(stats.purge_deferred, 1);
        assert!(engine.registry().is_empty());
        assert_eq!(engine.pending_purges(), &[stuck.clone()]);

        // Evicting the same entry again, as after a reload, does not queue it twice
        engine.registry.push_unsorted(stale());
        engine.synchronize().unwrap();
        assert_eq!(engine.pending_purges(), &[stuck.clone()]);

        // Once the obstacle is gone the retry drains the queue
        fs::remove_file(&blocker).unwrap();
        engine.synchronize().unwrap();
        assert!(engine.pending_purges().is_empty());
    }

    #[test]
    fn test_inspect_derived_is_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let derived = dir.path().join("derived");
        let in_flight = derived.join(STAGING_DIR_NAME).join("unit-busy");
        for name in ["m10", "m45", "m70", "garbage"] {
            fs::create_dir_all(derived.join(name)).unwrap();
        }
        fs::create_dir_all(&in_flight).unwrap();
        let policy = RetentionPolicy::new(Duration::from_secs(3600)).unwrap();

        let listed = inspect_derived("test", &derived, &MinutesLayout, &policy, now());

        let locations: Vec<_> = listed.iter().map(|m| m.derived_location.clone()).collect();
        assert_eq!(locations, vec![derived.join("m45"), derived.join("m10")]);
        // Expired entries and in-flight staging are left alone
        assert!(derived.join("m70").exists());
        assert!(in_flight.exists());
        let missing = dir.path().join("missing");
        assert!(inspect_derived("test", &missing, &MinutesLayout, &policy, now()).is_empty());
    }

    #[test]
    fn test_remove_path_variants() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("payload.gz");
        let tree = dir.path().join("tiles");
        fs::write(&file, b"x").unwrap();
        fs::create_dir_all(tree.join("3/2")).unwrap();

        remove_path(&file).unwrap();
        remove_path(&tree).unwrap();
        remove_path(&dir.path().join("missing")).unwrap();

        assert!(!file.exists());
        assert!(!tree.exists());
    }
}
