//! Clock abstraction shared by the engine, tasks and services.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, as seen by a [`Clock`].
pub type Millis = i64;

const MILLIS_PER_SECOND: Millis = 1_000;

/// Source of "now" for every scheduling decision.
///
/// Implementations must be cheap to call and safe to share between the
/// engine thread and all worker threads.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds.
    fn now_millis(&self) -> Millis;

    /// Current time in whole seconds.
    fn now_secs(&self) -> i64 {
        self.now_millis() / MILLIS_PER_SECOND
    }
}

/// Wall-clock milliseconds from the operating system.
pub fn system_millis() -> Millis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Millis)
        .unwrap_or_default()
}

/// System clock shifted by an adjustable offset.
///
/// Lets operators run a server in a different time zone than the host, or
/// move game time forward without touching the machine clock.
#[derive(Debug, Default)]
pub struct OffsetClock {
    offset_millis: AtomicI64,
}

impl OffsetClock {
    pub fn new(offset_millis: Millis) -> Self {
        Self {
            offset_millis: AtomicI64::new(offset_millis),
        }
    }

    pub fn offset_millis(&self) -> Millis {
        self.offset_millis.load(Ordering::Acquire)
    }

    pub fn set_offset(&self, offset_millis: Millis) {
        self.offset_millis.store(offset_millis, Ordering::Release);
    }

    /// Shifts the offset so that `now_millis()` reads `target` right now.
    pub fn update_time_to(&self, target: Millis) {
        let diff = target.saturating_sub(self.now_millis());
        self.offset_millis.fetch_add(diff, Ordering::AcqRel);
    }
}

impl Clock for OffsetClock {
    fn now_millis(&self) -> Millis {
        system_millis().saturating_add(self.offset_millis())
    }
}

/// Clock that only moves when told to.
///
/// Drives the engine deterministically in simulations and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Millis) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn set(&self, now: Millis) {
        self.now.store(now, Ordering::Release);
    }

    /// Moves time forward and returns the new reading.
    pub fn advance(&self, delta: Millis) -> Millis {
        self.now.fetch_add(delta, Ordering::AcqRel) + delta
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> Millis {
        self.now.load(Ordering::Acquire)
    }
}
