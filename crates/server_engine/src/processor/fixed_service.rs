use super::executor::{CompletionHandle, Job, TaskExecutor, TaskOutcome};
use super::task::EngineTask;
use super::worker::Worker;
use crate::error::EngineError;
use crossbeam::channel::{self, Sender};
use std::sync::Arc;
use tracing::info;

/// N single-thread shards; a service always runs on shard `id % N`.
///
/// Since one service only ever lands on one shard, its ticks are strictly
/// sequential. There is no admission limit: every due task is accepted and
/// queues behind whatever its shard is already doing.
pub struct FixedServiceExecutor {
    shards: Vec<Sender<Job>>,
    workers: Vec<Worker>,
}

impl FixedServiceExecutor {
    /// Spawns `shards` workers; zero is treated as one.
    pub fn new(shards: usize) -> Result<Self, EngineError> {
        let count = shards.max(1);
        let mut senders = Vec::with_capacity(count);
        let mut workers = Vec::with_capacity(count);

        for i in 0..count {
            let (tx, rx) = channel::unbounded();
            workers.push(Worker::spawn(format!("engine-shard-{i}"), rx)?);
            senders.push(tx);
        }

        info!(shards = count, "Fixed service executor started");
        Ok(Self {
            shards: senders,
            workers,
        })
    }

    pub fn shard_count(&self) -> usize {
        self.workers.len()
    }
}

impl TaskExecutor for FixedServiceExecutor {
    fn can_submit(&self) -> bool {
        true
    }

    fn submit(&mut self, task: Arc<EngineTask>) -> CompletionHandle {
        let shard = task.service_id().shard(self.workers.len());
        let (job, handle) = Job::new(task);
        if let Some(queue) = self.shards.get(shard) {
            // Only fails after shutdown; the handle then reports abandonment.
            let _ = queue.send(job);
        }
        handle
    }

    fn handle_completion(&mut self, _outcome: &TaskOutcome) {}

    fn shutdown(&mut self) {
        self.shards.clear();
        for worker in &mut self.workers {
            worker.join();
        }
        info!("Fixed service executor stopped");
    }
}

impl Drop for FixedServiceExecutor {
    fn drop(&mut self) {
        if !self.shards.is_empty() {
            self.shutdown();
        }
    }
}
