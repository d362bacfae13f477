//! Fixed-period ticker that tells the engine when the next global tick is due.

use super::clock::Millis;

/// Interval used when a non-positive period is requested.
pub const DEFAULT_TICK_INTERVAL_MS: Millis = 100;

/// Answers "is a tick due now?" for a fixed period.
///
/// Not thread-safe by itself; the engine thread owns its ticker.
#[derive(Debug, Clone)]
pub struct TimeTicker {
    last_timestamp: Millis,
    interval: Millis,
}

impl TimeTicker {
    /// Creates a ticker whose reference point is the epoch, so the first
    /// check against any real timestamp is due.
    pub fn new(interval: Millis) -> Self {
        Self {
            last_timestamp: 0,
            interval: Self::sanitize(interval),
        }
    }

    /// Creates a ticker that first becomes due exactly at `start`.
    pub fn starting_at(interval: Millis, start: Millis) -> Self {
        let interval = Self::sanitize(interval);
        Self {
            last_timestamp: start.saturating_sub(interval),
            interval,
        }
    }

    fn sanitize(interval: Millis) -> Millis {
        if interval <= 0 {
            DEFAULT_TICK_INTERVAL_MS
        } else {
            interval
        }
    }

    /// True when at least one interval has elapsed since the last consumed
    /// tick. The boundary is inclusive.
    ///
    /// A `now` earlier than the last consumed tick means the clock was moved
    /// backwards; that is reported as due so the next [`tick`](Self::tick)
    /// restarts the period from `now`.
    pub fn check(&self, now: Millis) -> bool {
        now < self.last_timestamp || now.saturating_sub(self.last_timestamp) >= self.interval
    }

    /// Like [`check`](Self::check), but consumes the tick by moving the
    /// reference point to `now` when due.
    pub fn tick(&mut self, now: Millis) -> bool {
        if self.check(now) {
            self.last_timestamp = now;
            true
        } else {
            false
        }
    }

    /// Timestamp at which the next tick becomes due.
    pub fn next(&self) -> Millis {
        self.last_timestamp.saturating_add(self.interval)
    }

    /// Milliseconds from `now` until the next tick; negative when overdue
    /// and zero when the clock is behind the last consumed tick.
    pub fn diff_next(&self, now: Millis) -> Millis {
        if now < self.last_timestamp {
            return 0;
        }
        self.next().saturating_sub(now)
    }

    pub fn set_interval(&mut self, interval: Millis) -> &mut Self {
        self.interval = Self::sanitize(interval);
        self
    }

    pub fn set_last_timestamp(&mut self, timestamp: Millis) -> &mut Self {
        self.last_timestamp = timestamp;
        self
    }

    pub fn last_timestamp(&self) -> Millis {
        self.last_timestamp
    }

    pub fn interval(&self) -> Millis {
        self.interval
    }
}
