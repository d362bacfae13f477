use super::{MessageDispatcher, Service, ServiceContext, ServiceEndpoint, ServiceId};
use crate::time::Millis;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Type-erased view of a service that the scheduler can tick.
pub trait Tickable: Send + Sync {
    fn service_id(&self) -> ServiceId;

    fn name(&self) -> &str;

    /// Runs one tick at `now`.
    fn tick(&self, now: Millis) -> anyhow::Result<()>;
}

/// Drives one [`Service`]: mailbox drain, then logic step.
///
/// The state mutex is never contended in practice because the task
/// processor keeps at most one task per service in flight. It uses
/// `parking_lot` so that a panic inside a tick does not poison the service
/// for later frames.
pub struct ServiceRunner<S: Service> {
    context: ServiceContext,
    state: Mutex<S>,
    dispatcher: Arc<dyn MessageDispatcher<S>>,
    drain_cap: usize,
}

impl<S: Service> ServiceRunner<S> {
    pub fn new(
        context: ServiceContext,
        service: S,
        dispatcher: Arc<dyn MessageDispatcher<S>>,
        drain_cap: usize,
    ) -> Self {
        Self {
            context,
            state: Mutex::new(service),
            dispatcher,
            drain_cap: drain_cap.max(1),
        }
    }

    pub fn context(&self) -> &ServiceContext {
        &self.context
    }

    pub fn endpoint(&self) -> &Arc<ServiceEndpoint> {
        self.context.endpoint()
    }

    /// Runs [`Service::init`] on the wrapped service.
    pub fn init(&self) -> anyhow::Result<()> {
        self.state.lock().init(&self.context)
    }

    /// Gives direct access to the service state, e.g. for inspection.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.state.lock())
    }

    /// Hands up to `drain_cap` queued messages to the dispatcher in FIFO
    /// order. Returns the number handled; the rest wait for the next tick.
    fn drain_mailbox(&self, service: &mut S) -> usize {
        let endpoint = self.context.endpoint();
        let mut handled = 0;
        while handled < self.drain_cap {
            let Some(message) = endpoint.poll_message() else {
                break;
            };
            let mark = message.mark();
            self.dispatcher.dispatch(mark, service, &self.context, message);
            handled += 1;
        }
        handled
    }
}

impl<S: Service> Tickable for ServiceRunner<S> {
    fn service_id(&self) -> ServiceId {
        self.context.service_id()
    }

    fn name(&self) -> &str {
        self.context.endpoint().name()
    }

    fn tick(&self, now: Millis) -> anyhow::Result<()> {
        let mut service = self.state.lock();
        let handled = self.drain_mailbox(&mut service);
        if handled == self.drain_cap {
            debug!(
                service_id = %self.service_id(),
                remaining = self.context.endpoint().pending_messages(),
                "Mailbox drain cap reached, deferring the rest"
            );
        }
        service.tick_logic(&self.context, now)
    }
}
