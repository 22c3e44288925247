/*!
 * Core synchronization and retention engine
 */

pub mod artifact;
pub mod collaborator;
pub mod engine;
pub mod pool;
pub mod registry;
pub mod retention;
pub mod scheduler;

pub use artifact::{ArtifactRecord, ArtifactStage, Materialized};
pub use collaborator::{Catalog, Collaborators, Layout, Transfer, Transform};
pub use engine::{inspect_derived, CycleStats, EngineSettings, SyncEngine, STAGING_DIR_NAME};
pub use pool::TransformPool;
pub use registry::Registry;
pub use retention::{Clock, ManualClock, RetentionPolicy, SystemClock};
pub use scheduler::{Scheduler, SourceOutcome, SyncLock};
