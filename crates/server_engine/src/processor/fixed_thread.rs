use super::executor::{CompletionHandle, Job, TaskExecutor, TaskOutcome};
use super::task::EngineTask;
use super::worker::Worker;
use crate::error::EngineError;
use crossbeam::channel::{self, Sender};
use std::sync::Arc;
use tracing::info;

/// Shared pool of N workers with a hard global cap of N tasks in flight.
///
/// Every submission takes a slot and every handled completion gives one
/// back, so no more than N completion handles are ever outstanding.
pub struct FixedThreadExecutor {
    jobs: Option<Sender<Job>>,
    workers: Vec<Worker>,
    capacity: usize,
    available: usize,
}

impl FixedThreadExecutor {
    /// Spawns `threads` workers; zero is treated as one.
    pub fn new(threads: usize) -> Result<Self, EngineError> {
        let capacity = threads.max(1);
        let (tx, rx) = channel::unbounded();
        let workers = (0..capacity)
            .map(|i| Worker::spawn(format!("engine-worker-{i}"), rx.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        info!(workers = capacity, "Fixed thread executor started");
        Ok(Self {
            jobs: Some(tx),
            workers,
            capacity,
            available: capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots free for new submissions.
    pub fn available(&self) -> usize {
        self.available
    }
}

impl TaskExecutor for FixedThreadExecutor {
    fn can_submit(&self) -> bool {
        self.available > 0
    }

    fn submit(&mut self, task: Arc<EngineTask>) -> CompletionHandle {
        let (job, handle) = Job::new(task);
        self.available = self.available.saturating_sub(1);
        if let Some(jobs) = &self.jobs {
            // A send only fails once the pool is shut down; the dropped job
            // then reports itself as abandoned through its handle.
            let _ = jobs.send(job);
        }
        handle
    }

    fn handle_completion(&mut self, _outcome: &TaskOutcome) {
        self.available = (self.available + 1).min(self.capacity);
    }

    fn shutdown(&mut self) {
        self.jobs.take();
        for worker in &mut self.workers {
            worker.join();
        }
        info!("Fixed thread executor stopped");
    }
}

impl Drop for FixedThreadExecutor {
    fn drop(&mut self) {
        if self.jobs.is_some() {
            self.shutdown();
        }
    }
}
