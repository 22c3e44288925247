/*!
 * Time-window retention
 *
 * A record is live while its observation time is strictly newer than
 * `now - time_window`. The same predicate gates discovery (nothing outside
 * the window is ever fetched) and eviction (nothing outside the window is
 * ever kept).
 */

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Mutex;
use std::time::Duration;

use crate::core::artifact::ArtifactRecord;
use crate::error::{GeoSyncError, Result};

/// Source of "now" for a cycle
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: ChronoDuration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Keep-within-time-window policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    window: ChronoDuration,
}

impl RetentionPolicy {
    pub fn new(time_window: Duration) -> Result<Self> {
        if time_window.is_zero() {
            return Err(GeoSyncError::Config(
                "retention window must be greater than zero".to_string(),
            ));
        }
        let window = ChronoDuration::from_std(time_window).map_err(|e| {
            GeoSyncError::Config(format!("retention window out of range: {}", e))
        })?;
        Ok(Self { window })
    }

    pub fn window(&self) -> ChronoDuration {
        self.window
    }

    /// Oldest observation time that is no longer live
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.window
    }

    pub fn is_live(&self, record: &ArtifactRecord, now: DateTime<Utc>) -> bool {
        self.is_time_live(record.observation_time, now)
    }

    pub fn is_time_live(&self, observation_time: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        observation_time > self.cutoff(now)
    }
}
