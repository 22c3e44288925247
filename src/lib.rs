/*!
 * GeoSync - incremental sync and retention for geophysical sensor products
 *
 * Keeps a local tile store in step with an upstream archive:
 * - Discovers what the upstream archive currently offers
 * - Retrieves and transforms only what is new
 * - Atomically materializes derived artifacts
 * - Evicts anything older than a sliding time window
 * - Rebuilds its state from disk after a restart
 *
 * Version: 0.3.0
 */

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod sources;

// Re-export commonly used types
pub use config::{GeoSyncConfig, LogLevel, LoggingConfig, SourceConfig, SyncConfig};
pub use core::{
    ArtifactRecord, Catalog, Clock, Collaborators, CycleStats, EngineSettings, Layout,
    Materialized, RetentionPolicy, Scheduler, SyncEngine, SyncLock, Transfer, Transform,
};
pub use error::{GeoSyncError, Result};
pub use sources::NamingScheme;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
