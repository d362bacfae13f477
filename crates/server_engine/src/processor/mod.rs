//! The task processor: the engine-thread side of scheduling.
//!
//! Every tick runs three passes in a fixed order:
//!
//! 1. **harvest** completed runs, giving their admission slots back and
//!    logging any failure;
//! 2. **drain** tasks registered since the previous tick;
//! 3. **submit** every due task that is not already running, for as long as
//!    the executor admits work.
//!
//! The task list and the in-flight map belong to the processor alone; other
//! threads only ever touch the lock-free registration queue.

use crate::engine::TickDriver;
use crate::time::{Clock, Millis};
use crossbeam::queue::SegQueue;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, trace};

mod executor;
mod fixed_service;
mod fixed_thread;
mod task;
mod worker;

pub use executor::{
    build_executor, completion_channel, CompletionHandle, CompletionSignal, TaskExecutor,
    TaskFailure, TaskOutcome,
};
pub use fixed_service::FixedServiceExecutor;
pub use fixed_thread::FixedThreadExecutor;
pub use task::{EngineTask, TaskId, DEFAULT_FRAME_RATE_MS};
pub(crate) use task::panic_message;

/// Thread-safe handle for registering tasks with a [`TaskProcessor`].
///
/// Registrations are picked up at the start of the processor's next tick.
#[derive(Clone, Default)]
pub struct TaskRegistrar {
    pending: Arc<SegQueue<Arc<EngineTask>>>,
}

impl TaskRegistrar {
    /// Queues `task` for the processor. Never blocks; safe from any thread.
    pub fn add_engine_task(&self, task: Arc<EngineTask>) {
        debug!(task_id = %task.id(), service_id = %task.service_id(), "Engine task queued for registration");
        self.pending.push(task);
    }

    /// Registrations not yet seen by the processor.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Counters describing what the processor has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    pub registered: usize,
    pub in_flight: usize,
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
}

struct InFlight {
    task: Arc<EngineTask>,
    handle: CompletionHandle,
}

pub struct TaskProcessor {
    executor: Box<dyn TaskExecutor>,
    clock: Arc<dyn Clock>,
    registrar: TaskRegistrar,
    tasks: Vec<Arc<EngineTask>>,
    in_flight: BTreeMap<TaskId, InFlight>,
    submitted: u64,
    completed: u64,
    failed: u64,
}

impl TaskProcessor {
    pub fn new(executor: Box<dyn TaskExecutor>, clock: Arc<dyn Clock>) -> Self {
        Self {
            executor,
            clock,
            registrar: TaskRegistrar::default(),
            tasks: Vec::new(),
            in_flight: BTreeMap::new(),
            submitted: 0,
            completed: 0,
            failed: 0,
        }
    }

    /// A handle other threads can use to register tasks.
    pub fn registrar(&self) -> TaskRegistrar {
        self.registrar.clone()
    }

    pub fn add_engine_task(&self, task: Arc<EngineTask>) {
        self.registrar.add_engine_task(task);
    }

    /// Tasks in the authoritative list. Pending registrations are not counted.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_in_flight(&self, id: TaskId) -> bool {
        self.in_flight.contains_key(&id)
    }

    pub fn stats(&self) -> ProcessorStats {
        ProcessorStats {
            registered: self.tasks.len(),
            in_flight: self.in_flight.len(),
            submitted: self.submitted,
            completed: self.completed,
            failed: self.failed,
        }
    }

    /// Runs one harvest, drain and submit cycle.
    ///
    /// # Arguments
    ///
    /// * `interval` - Time since the previous global tick; only traced
    pub fn tick(&mut self, interval: Millis) {
        trace!(interval, in_flight = self.in_flight.len(), "Task processor tick");
        self.harvest();
        self.drain_pending();
        let now = self.clock.now_millis();
        self.submit_due(now);
    }

    fn harvest(&mut self) {
        let finished: Vec<(TaskId, TaskOutcome)> = self
            .in_flight
            .iter()
            .filter_map(|(id, entry)| entry.handle.poll().map(|outcome| (*id, outcome)))
            .collect();

        for (id, outcome) in finished {
            let Some(entry) = self.in_flight.remove(&id) else {
                continue;
            };
            self.executor.handle_completion(&outcome);
            self.completed += 1;

            if let Err(failure) = outcome {
                self.failed += 1;
                error!(
                    task_id = %id,
                    service_id = %entry.task.service_id(),
                    service = entry.task.service_name(),
                    error = %failure,
                    "Engine task failed"
                );
            }
        }
    }

    fn drain_pending(&mut self) {
        while let Some(task) = self.registrar.pending.pop() {
            debug!(task_id = %task.id(), service_id = %task.service_id(), frame_rate = task.frame_rate(), "Engine task registered");
            self.tasks.push(task);
        }
    }

    fn submit_due(&mut self, now: Millis) {
        for task in &self.tasks {
            if !self.executor.can_submit() {
                break;
            }
            if self.in_flight.contains_key(&task.id()) || !task.require_exe(now) {
                continue;
            }

            let handle = self.executor.submit(Arc::clone(task));
            self.in_flight.insert(
                task.id(),
                InFlight {
                    task: Arc::clone(task),
                    handle,
                },
            );
            self.submitted += 1;
        }
    }
}

impl TickDriver for TaskProcessor {
    fn name(&self) -> &str {
        "task-processor"
    }

    fn tick(&mut self, interval: Millis) {
        TaskProcessor::tick(self, interval);
    }

    fn shutdown(&mut self) {
        info!(
            registered = self.tasks.len(),
            in_flight = self.in_flight.len(),
            "Shutting down task processor"
        );
        self.executor.shutdown();
        // Whatever was still running has now finished; account for it.
        self.harvest();
    }
}
