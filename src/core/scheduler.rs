/*!
 * Scheduling: the process-wide sync lock and the named-source scheduler
 *
 * Every synchronize() call in the process runs behind one `SyncLock`, since
 * all sources share the host's disk and some share an upstream credential.
 * There is no timeout: a stuck cycle stalls every source until it returns.
 */

use crossbeam_channel::{select, tick, Receiver, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{error, info};

use crate::core::artifact::Materialized;
use crate::core::engine::SyncEngine;
use crate::error::{GeoSyncError, Result};

/// Explicit handle serializing all sync cycles that share it
#[derive(Debug, Clone, Default)]
pub struct SyncLock {
    inner: Arc<Mutex<()>>,
}

impl SyncLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until no other cycle holds the lock
    pub fn acquire(&self) -> MutexGuard<'_, ()> {
        // A panicked cycle must not wedge every other source
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run one cycle of `engine` while holding the lock
    pub fn synchronize(&self, engine: &mut SyncEngine) -> Result<Vec<Materialized>> {
        let _guard = self.acquire();
        engine.synchronize()
    }
}

/// Result of one source's cycle inside `run_all`
#[derive(Debug)]
pub struct SourceOutcome {
    pub source: String,
    pub result: Result<Vec<Materialized>>,
}

/// Named engines driven behind one shared lock
pub struct Scheduler {
    lock: SyncLock,
    engines: Vec<(String, Mutex<SyncEngine>)>,
}

impl Scheduler {
    pub fn new(lock: SyncLock) -> Self {
        Self {
            lock,
            engines: Vec::new(),
        }
    }

    pub fn lock(&self) -> &SyncLock {
        &self.lock
    }

    /// Add an engine under its own name; names must be unique
    pub fn register(&mut self, engine: SyncEngine) -> Result<()> {
        let name = engine.name().to_string();
        if self.engines.iter().any(|(n, _)| *n == name) {
            return Err(GeoSyncError::Config(format!(
                "source {} is already registered",
                name
            )));
        }
        self.engines.push((name, Mutex::new(engine)));
        Ok(())
    }

    pub fn sources(&self) -> Vec<&str> {
        self.engines.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Run one cycle of the named source
    pub fn run_source(&self, name: &str) -> Result<Vec<Materialized>> {
        let engine = self.find(name)?;
        let _guard = self.lock.acquire();
        let mut engine = engine
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        engine.synchronize()
    }

    /// Run every source once, in registration order.
    ///
    /// A fatal error in one source is reported in its outcome and does not
    /// stop the sources after it.
    pub fn run_all(&self) -> Vec<SourceOutcome> {
        self.engines
            .iter()
            .map(|(name, _)| {
                let result = self.run_source(name);
                if let Err(ref e) = result {
                    error!(source = %name, error = %e, category = %e.category(), "sync cycle failed");
                }
                SourceOutcome {
                    source: name.clone(),
                    result,
                }
            })
            .collect()
    }

    /// Read-only access to a registered engine
    pub fn with_engine<R>(&self, name: &str, f: impl FnOnce(&SyncEngine) -> R) -> Result<R> {
        let engine = self.find(name)?;
        let engine = engine
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(f(&engine))
    }

    /// Run all sources now and then on every `interval` tick until
    /// `shutdown` fires or disconnects. Returns the number of rounds run.
    pub fn run_every(
        &self,
        interval: Duration,
        shutdown: Receiver<()>,
        mut on_round: impl FnMut(&[SourceOutcome]),
    ) -> usize {
        let ticker = tick(interval);
        let mut rounds = 0;

        loop {
            let outcomes = self.run_all();
            rounds += 1;
            on_round(&outcomes);

            // A tick left pending by a long round must not win over shutdown
            match shutdown.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => {
                    info!(rounds, "scheduler stopped");
                    return rounds;
                }
                Err(TryRecvError::Empty) => {}
            }

            select! {
                recv(ticker) -> _ => {}
                recv(shutdown) -> _ => {
                    info!(rounds, "scheduler stopped");
                    return rounds;
                }
            }
        }
    }

    fn find(&self, name: &str) -> Result<&Mutex<SyncEngine>> {
        self.engines
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, engine)| engine)
            .ok_or_else(|| GeoSyncError::UnknownSource(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_lock_serializes_callers() {
        let lock = SyncLock::new();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = lock.clone();
                let active = active.clone();
                let peak = peak.clone();
                thread::spawn(move || {
                    let _guard = lock.acquire();
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_poisoned_lock_still_usable() {
        let lock = SyncLock::new();
        let poisoner = lock.clone();
        let _ = thread::spawn(move || {
            let _guard = poisoner.acquire();
            panic!("cycle crashed");
        })
        .join();

        let _guard = lock.acquire();
    }

    #[test]
    fn test_unknown_source() {
        let scheduler = Scheduler::new(SyncLock::new());
        let err = scheduler.run_source("goes").unwrap_err();
        assert!(matches!(err, GeoSyncError::UnknownSource(ref n) if n == "goes"));
        assert!(scheduler.sources().is_empty());
        assert!(scheduler.run_all().is_empty());
    }
}
