//! The scheduling unit: one service paired with its frame rate.

use super::executor::{TaskFailure, TaskOutcome};
use crate::service::{ServiceId, Tickable};
use crate::time::{Clock, Millis};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Frame rate used when a non-positive one is requested.
pub const DEFAULT_FRAME_RATE_MS: Millis = 100;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an [`EngineTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Schedules one service at a minimum re-execution interval.
///
/// Created once when the service is registered and kept for its whole life.
/// [`run`](Self::run) moves `last_start` forward; the engine thread reads it
/// through [`require_exe`](Self::require_exe), which only ever pulls it back
/// to an earlier clock reading.
pub struct EngineTask {
    id: TaskId,
    frame_rate: Millis,
    last_start: AtomicI64,
    service: Arc<dyn Tickable>,
    clock: Arc<dyn Clock>,
}

impl EngineTask {
    pub fn new(frame_rate: Millis, service: Arc<dyn Tickable>, clock: Arc<dyn Clock>) -> Self {
        let frame_rate = if frame_rate <= 0 {
            debug!(
                service_id = %service.service_id(),
                requested = frame_rate,
                "Non-positive frame rate, using default of {DEFAULT_FRAME_RATE_MS}ms"
            );
            DEFAULT_FRAME_RATE_MS
        } else {
            frame_rate
        };

        Self {
            id: TaskId::next(),
            frame_rate,
            last_start: AtomicI64::new(clock.now_millis()),
            service,
            clock,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn service_id(&self) -> ServiceId {
        self.service.service_id()
    }

    pub fn service_name(&self) -> &str {
        self.service.name()
    }

    pub fn frame_rate(&self) -> Millis {
        self.frame_rate
    }

    pub fn last_start(&self) -> Millis {
        self.last_start.load(Ordering::Acquire)
    }

    /// Whether a full frame has elapsed since the last run started. The
    /// boundary is inclusive.
    ///
    /// If the clock has been moved back before the last start, the frame is
    /// restarted at `now` and the task becomes due one frame later.
    ///
    /// # Arguments
    ///
    /// * `now` - Current engine time in milliseconds
    ///
    /// # Returns
    ///
    /// `true` when the task should be submitted on this tick.
    pub fn require_exe(&self, now: Millis) -> bool {
        let last_start = self.last_start();
        if now < last_start {
            // Only asked while the task is idle.
            let _ = self.last_start.compare_exchange(
                last_start,
                now,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            debug!(
                task_id = %self.id,
                service_id = %self.service_id(),
                rewound_ms = last_start.saturating_sub(now),
                "Clock moved backwards, restarting frame"
            );
            return false;
        }
        now.saturating_sub(last_start) >= self.frame_rate
    }

    /// Runs one service tick, timestamped when the run actually starts
    /// rather than when the task was submitted.
    pub fn run(&self) -> anyhow::Result<()> {
        let now = self.clock.now_millis();
        self.last_start.store(now, Ordering::Release);
        self.service.tick(now)
    }

    /// Runs the task and folds any error or panic into its outcome.
    pub fn execute(&self) -> TaskOutcome {
        match panic::catch_unwind(AssertUnwindSafe(|| self.run())) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TaskFailure::Failed {
                service_id: self.service_id(),
                message: format!("{e:#}"),
            }),
            Err(payload) => Err(TaskFailure::Panicked {
                service_id: self.service_id(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

impl fmt::Debug for EngineTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineTask")
            .field("id", &self.id)
            .field("service_id", &self.service_id())
            .field("frame_rate", &self.frame_rate)
            .field("last_start", &self.last_start())
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
