/*!
 * Bounded, chunked worker pool for CPU-heavy transforms
 *
 * Units are dispatched in chunks of at most `chunk_size`. Every unit of a
 * chunk resolves, success, error or panic, before the next chunk starts, so
 * peak memory is bounded by `min(width, chunk_size)` live transforms.
 */

use rayon::prelude::*;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::debug;

use crate::error::{GeoSyncError, Result};

/// Worker count used when none is configured.
///
/// Falls back to a single worker if parallelism cannot be detected
/// (restricted containers, cgroup limits).
pub fn detect_width() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or_else(|e| {
            tracing::warn!(
                error = %e,
                "failed to detect available parallelism, using one transform worker"
            );
            1
        })
}

pub struct TransformPool {
    pool: rayon::ThreadPool,
    width: usize,
    chunk_size: usize,
}

impl TransformPool {
    /// Create a pool of `width` workers (0 = auto-detect)
    pub fn new(width: usize, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(GeoSyncError::Config(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        let width = if width == 0 { detect_width() } else { width };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(width)
            .thread_name(|i| format!("geosync-transform-{}", i))
            .build()
            .map_err(|e| GeoSyncError::Parallel(e.to_string()))?;

        Ok(Self {
            pool,
            width,
            chunk_size,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Run `work` over every unit, one chunk at a time.
    ///
    /// Each unit is returned with its outcome. A panicking unit becomes a
    /// `WorkerPanic` error for that unit only; its siblings keep running.
    /// Outcome order within a chunk is unspecified.
    pub fn run_chunked<T, R, F>(&self, units: Vec<T>, work: F) -> Vec<(T, Result<R>)>
    where
        T: Send,
        R: Send,
        F: Fn(&T) -> Result<R> + Sync,
    {
        let total = units.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut remaining = units.into_iter().peekable();
        let mut chunk_index = 0usize;

        while remaining.peek().is_some() {
            let chunk: Vec<T> = remaining.by_ref().take(self.chunk_size).collect();
            debug!(
                chunk = chunk_index,
                units = chunk.len(),
                total,
                "dispatching transform chunk"
            );

            let resolved: Vec<(T, Result<R>)> = self.pool.install(|| {
                chunk
                    .into_par_iter()
                    .map(|unit| {
                        let outcome = run_guarded(&work, &unit);
                        (unit, outcome)
                    })
                    .collect()
            });

            outcomes.extend(resolved);
            chunk_index += 1;
        }

        outcomes
    }
}

fn run_guarded<T, R, F>(work: &F, unit: &T) -> Result<R>
where
    F: Fn(&T) -> Result<R>,
{
    match panic::catch_unwind(AssertUnwindSafe(|| work(unit))) {
        Ok(outcome) => outcome,
        Err(payload) => Err(GeoSyncError::WorkerPanic(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
