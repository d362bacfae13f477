//! Registration of services with a running engine.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::processor::{EngineTask, TaskRegistrar, DEFAULT_FRAME_RATE_MS};
use crate::service::{
    MessageDispatcher, Service, ServiceContext, ServiceDirectory, ServiceEndpoint, ServiceId,
    ServiceMessage, ServiceRunner, Tickable, DEFAULT_MAILBOX_DRAIN_CAP,
};
use crate::time::{Clock, Millis};
use std::sync::Arc;
use tracing::{error, info};

/// Turns services into scheduled engine tasks.
///
/// A host is cheap to clone and can be used from any thread, before or after
/// the engine starts. New services become visible to the processor on its
/// next tick.
#[derive(Clone)]
pub struct ServiceHost {
    directory: ServiceDirectory,
    registrar: TaskRegistrar,
    clock: Arc<dyn Clock>,
    drain_cap: usize,
    default_frame_rate: Millis,
}

impl ServiceHost {
    pub fn new(registrar: TaskRegistrar, clock: Arc<dyn Clock>) -> Self {
        Self {
            directory: ServiceDirectory::new(),
            registrar,
            clock,
            drain_cap: DEFAULT_MAILBOX_DRAIN_CAP,
            default_frame_rate: DEFAULT_FRAME_RATE_MS,
        }
    }

    pub fn from_config(registrar: TaskRegistrar, clock: Arc<dyn Clock>, config: &EngineConfig) -> Self {
        Self::new(registrar, clock)
            .with_drain_cap(config.mailbox_drain_cap)
            .with_default_frame_rate(config.default_frame_rate_ms)
    }

    pub fn with_drain_cap(mut self, drain_cap: usize) -> Self {
        self.drain_cap = drain_cap.max(1);
        self
    }

    pub fn with_default_frame_rate(mut self, frame_rate: Millis) -> Self {
        self.default_frame_rate = frame_rate;
        self
    }

    pub fn directory(&self) -> &ServiceDirectory {
        &self.directory
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Registers `service` under `id` and schedules it.
    ///
    /// The service is added to the directory before `init` runs so that it
    /// can already look itself and others up. If `init` fails the service is
    /// removed again and never scheduled.
    ///
    /// # Arguments
    ///
    /// * `id` - Directory key; must not already be registered
    /// * `name` - Human-readable name used in logs
    /// * `service` - The service state, moved into its runner
    /// * `dispatcher` - Handles every message drained from the mailbox
    /// * `frame_rate` - Minimum time between two runs, `None` for the host default
    ///
    /// # Returns
    ///
    /// The runner, shared with the scheduled task, or
    /// [`EngineError::DuplicateService`] / [`EngineError::ServiceInit`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use server_engine::{
    ///     ManualClock, MessageRouter, Service, ServiceContext, ServiceHost, ServiceId,
    ///     TaskRegistrar,
    /// };
    /// use std::sync::Arc;
    ///
    /// struct Idle;
    ///
    /// impl Service for Idle {
    ///     fn tick_logic(&mut self, _ctx: &ServiceContext, _now: i64) -> anyhow::Result<()> {
    ///         Ok(())
    ///     }
    /// }
    ///
    /// let host = ServiceHost::new(TaskRegistrar::default(), Arc::new(ManualClock::new(0)));
    /// host.spawn_service(ServiceId(1), "idle", Idle, Arc::new(MessageRouter::<Idle>::new()), Some(50))
    ///     .unwrap();
    /// assert!(host.directory().contains(ServiceId(1)));
    /// ```
    pub fn spawn_service<S: Service>(
        &self,
        id: ServiceId,
        name: impl Into<String>,
        service: S,
        dispatcher: Arc<dyn MessageDispatcher<S>>,
        frame_rate: Option<Millis>,
    ) -> Result<Arc<ServiceRunner<S>>, EngineError> {
        let endpoint = Arc::new(ServiceEndpoint::new(id, name));
        self.directory.register(Arc::clone(&endpoint))?;

        let context = ServiceContext::new(endpoint, self.directory.clone(), Arc::clone(&self.clock));
        let runner = Arc::new(ServiceRunner::new(context, service, dispatcher, self.drain_cap));

        if let Err(e) = runner.init() {
            self.directory.remove(id);
            let message = format!("{e:#}");
            error!(service_id = %id, error = %message, "Service failed to initialise");
            return Err(EngineError::ServiceInit { id, message });
        }

        let frame_rate = frame_rate.unwrap_or(self.default_frame_rate);
        let task = Arc::new(EngineTask::new(
            frame_rate,
            Arc::clone(&runner) as Arc<dyn Tickable>,
            Arc::clone(&self.clock),
        ));
        info!(
            service_id = %id,
            service = runner.endpoint().name(),
            frame_rate = task.frame_rate(),
            "✅ Service registered"
        );
        self.registrar.add_engine_task(task);
        Ok(runner)
    }

    /// Delivers a message from outside any service, e.g. an operator console.
    ///
    /// The message carries no source. It is queued and handled on the
    /// target's next run.
    ///
    /// # Returns
    ///
    /// [`EngineError::UnknownService`] if nothing is registered under `target`.
    pub fn deliver(&self, target: ServiceId, message: ServiceMessage) -> Result<(), EngineError> {
        let endpoint = self
            .directory
            .get(target)
            .ok_or(EngineError::UnknownService(target))?;
        endpoint.receive_message(None, message);
        Ok(())
    }
}
