//! Pluggable execution strategies and their completion handles.

use super::task::{EngineTask, TaskId};
use super::{FixedServiceExecutor, FixedThreadExecutor};
use crate::config::{ExecutorKind, ExecutorSettings};
use crate::error::EngineError;
use crate::service::ServiceId;
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use thiserror::Error;

/// Result of running one task.
pub type TaskOutcome = Result<(), TaskFailure>;

/// Why a task run did not complete cleanly.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskFailure {
    /// The service's tick returned an error.
    #[error("service {service_id} tick failed: {message}")]
    Failed { service_id: ServiceId, message: String },

    /// The service's tick panicked.
    #[error("service {service_id} tick panicked: {message}")]
    Panicked { service_id: ServiceId, message: String },

    /// The worker went away without reporting, e.g. during shutdown.
    #[error("task was dropped before reporting completion")]
    Abandoned,
}

/// Worker-side half of a completion handle.
#[derive(Debug)]
pub struct CompletionSignal {
    tx: Sender<TaskOutcome>,
}

impl CompletionSignal {
    pub fn complete(self, outcome: TaskOutcome) {
        // The processor may already be gone during shutdown.
        let _ = self.tx.send(outcome);
    }
}

/// Engine-side half: a one-shot result polled without blocking.
#[derive(Debug)]
pub struct CompletionHandle {
    task_id: TaskId,
    rx: Receiver<TaskOutcome>,
}

impl CompletionHandle {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// `None` while the task is still queued or running.
    pub fn poll(&self) -> Option<TaskOutcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(TaskFailure::Abandoned)),
        }
    }
}

/// Creates the two halves of a completion handle for `task_id`.
pub fn completion_channel(task_id: TaskId) -> (CompletionSignal, CompletionHandle) {
    let (tx, rx) = channel::bounded(1);
    (CompletionSignal { tx }, CompletionHandle { task_id, rx })
}

/// Unit of work handed to a worker thread.
pub(crate) struct Job {
    pub(crate) task: Arc<EngineTask>,
    pub(crate) signal: CompletionSignal,
}

impl Job {
    pub(crate) fn new(task: Arc<EngineTask>) -> (Self, CompletionHandle) {
        let (signal, handle) = completion_channel(task.id());
        (Self { task, signal }, handle)
    }

    pub(crate) fn run(self) {
        let outcome = self.task.execute();
        self.signal.complete(outcome);
    }
}

/// Admission and submission policy for engine tasks.
///
/// Every method is called from the engine thread through the task
/// processor, which holds the executor by `&mut`; admission state therefore
/// has a single writer and needs no synchronisation.
pub trait TaskExecutor: Send {
    /// Cheap, non-blocking: may another task be submitted right now?
    fn can_submit(&self) -> bool;

    /// Queues `task` for execution. Never blocks the caller.
    fn submit(&mut self, task: Arc<EngineTask>) -> CompletionHandle;

    /// Called exactly once for each completion the processor observes.
    fn handle_completion(&mut self, outcome: &TaskOutcome);

    /// Stops accepting work, lets queued jobs finish and joins the workers.
    fn shutdown(&mut self) {}
}

/// Builds the execution strategy described by `settings`.
///
/// # Arguments
///
/// * `settings` - Strategy kind and worker count; a zero count becomes one
///
/// # Returns
///
/// The executor with its workers already running, or
/// [`EngineError::ThreadSpawn`] if a worker thread could not be started.
///
/// # Example
///
/// ```rust
/// use server_engine::{build_executor, ExecutorKind, ExecutorSettings, TaskExecutor};
///
/// let executor = build_executor(&ExecutorSettings {
///     kind: ExecutorKind::FixedThread,
///     worker_count: 2,
/// })
/// .unwrap();
/// assert!(executor.can_submit());
/// ```
pub fn build_executor(settings: &ExecutorSettings) -> Result<Box<dyn TaskExecutor>, EngineError> {
    Ok(match settings.kind {
        ExecutorKind::FixedThread => Box::new(FixedThreadExecutor::new(settings.worker_count)?),
        ExecutorKind::FixedService => Box::new(FixedServiceExecutor::new(settings.worker_count)?),
    })
}
