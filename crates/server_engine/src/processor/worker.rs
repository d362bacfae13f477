use super::executor::Job;
use crate::error::EngineError;
use crossbeam::channel::Receiver;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// A named OS thread that runs jobs from a queue until the queue closes.
pub(crate) struct Worker {
    name: String,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn spawn(name: String, jobs: Receiver<Job>) -> Result<Self, EngineError> {
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                // Ends once every sender is dropped and the queue is empty.
                for job in jobs.iter() {
                    job.run();
                }
            })
            .map_err(|source| EngineError::ThreadSpawn {
                name: name.clone(),
                source,
            })?;

        debug!(worker = %name, "Worker thread started");
        Ok(Self {
            name,
            thread: Some(thread),
        })
    }

    pub(crate) fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!(worker = %self.name, "Worker thread panicked outside of a task");
            } else {
                debug!(worker = %self.name, "Worker thread stopped");
            }
        }
    }
}
