//! Services: units of business logic with an inbound mailbox.
//!
//! A service is split in two halves:
//!
//! * [`ServiceEndpoint`] is the shareable address of a service. It owns the
//!   mailbox and may be used from any thread to deliver messages.
//! * The business state implements [`Service`] and is only ever touched by
//!   the worker currently running that service's task, through a
//!   [`ServiceRunner`].
//!
//! Each tick of a service first drains a bounded number of messages from the
//! mailbox into a [`MessageDispatcher`], then runs [`Service::tick_logic`].

use crate::error::EngineError;
use crate::time::{Clock, Millis};
use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

mod dispatch;
mod message;
mod module;
mod runner;

pub use dispatch::{MessageDispatcher, MessageRouter};
pub use message::{MessageMark, ServiceMessage};
pub use module::{Module, ModuleSet};
pub use runner::{ServiceRunner, Tickable};

/// Default number of mailbox messages a service handles per tick.
pub const DEFAULT_MAILBOX_DRAIN_CAP: usize = 1000;

/// Stable identity of a service. Also decides its shard under
/// shard-per-worker execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(pub u64);

impl ServiceId {
    /// Index of the worker that owns this service among `shards` workers.
    pub fn shard(&self, shards: usize) -> usize {
        (self.0 % shards.max(1) as u64) as usize
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Business logic driven by the engine.
pub trait Service: Send + 'static {
    /// Called once during registration, before the first tick.
    fn init(&mut self, ctx: &ServiceContext) -> anyhow::Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Service-specific step, run after this tick's mailbox drain.
    fn tick_logic(&mut self, ctx: &ServiceContext, now: Millis) -> anyhow::Result<()>;
}

/// Address and mailbox of a service.
///
/// The mailbox is an unbounded lock-free queue: any number of producers may
/// enqueue concurrently while the owning service drains it.
pub struct ServiceEndpoint {
    id: ServiceId,
    name: String,
    mailbox: SegQueue<ServiceMessage>,
}

impl ServiceEndpoint {
    pub fn new(id: ServiceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            mailbox: SegQueue::new(),
        }
    }

    pub fn id(&self) -> ServiceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sends `message` from this service to `target`.
    pub fn send_message(&self, target: &ServiceEndpoint, message: ServiceMessage) {
        target.receive_message(Some(self.id), message);
    }

    /// Stamps and enqueues a message arriving from `source`, which is `None`
    /// when the sender is not a service.
    pub fn receive_message(&self, source: Option<ServiceId>, mut message: ServiceMessage) {
        message.stamp(source, self.id);
        trace!(target_service = %self.id, mark = %message.mark(), "message enqueued");
        self.mailbox.push(message);
    }

    /// Messages currently waiting in the mailbox.
    pub fn pending_messages(&self) -> usize {
        self.mailbox.len()
    }

    pub(crate) fn poll_message(&self) -> Option<ServiceMessage> {
        self.mailbox.pop()
    }
}

impl fmt::Debug for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceEndpoint")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("pending_messages", &self.mailbox.len())
            .finish()
    }
}

/// Concurrent lookup of service endpoints by id.
#[derive(Clone, Default)]
pub struct ServiceDirectory {
    endpoints: Arc<DashMap<ServiceId, Arc<ServiceEndpoint>>>,
}

impl ServiceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an endpoint; fails if its id is already taken.
    pub fn register(&self, endpoint: Arc<ServiceEndpoint>) -> Result<(), EngineError> {
        use dashmap::mapref::entry::Entry;

        match self.endpoints.entry(endpoint.id()) {
            Entry::Occupied(_) => Err(EngineError::DuplicateService(endpoint.id())),
            Entry::Vacant(slot) => {
                slot.insert(endpoint);
                Ok(())
            }
        }
    }

    pub fn get(&self, id: ServiceId) -> Option<Arc<ServiceEndpoint>> {
        self.endpoints.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, id: ServiceId) -> Option<Arc<ServiceEndpoint>> {
        self.endpoints.remove(&id).map(|(_, endpoint)| endpoint)
    }

    pub fn contains(&self, id: ServiceId) -> bool {
        self.endpoints.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// Everything a running service may reach: its own endpoint, other
/// services through the directory, and the shared clock.
#[derive(Clone)]
pub struct ServiceContext {
    endpoint: Arc<ServiceEndpoint>,
    directory: ServiceDirectory,
    clock: Arc<dyn Clock>,
}

impl ServiceContext {
    pub fn new(
        endpoint: Arc<ServiceEndpoint>,
        directory: ServiceDirectory,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            endpoint,
            directory,
            clock,
        }
    }

    pub fn service_id(&self) -> ServiceId {
        self.endpoint.id()
    }

    pub fn endpoint(&self) -> &Arc<ServiceEndpoint> {
        &self.endpoint
    }

    pub fn directory(&self) -> &ServiceDirectory {
        &self.directory
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Sends `message` from this service straight into `target`'s mailbox.
    pub fn send_message(&self, target: &ServiceEndpoint, message: ServiceMessage) {
        self.endpoint.send_message(target, message);
    }

    /// Sends `message` to the service registered under `target`.
    ///
    /// The message is stamped with this service as its source.
    ///
    /// # Returns
    ///
    /// [`EngineError::UnknownService`] if `target` is not in the directory.
    pub fn send_to(&self, target: ServiceId, message: ServiceMessage) -> Result<(), EngineError> {
        let endpoint = self
            .directory
            .get(target)
            .ok_or(EngineError::UnknownService(target))?;
        self.send_message(&endpoint, message);
        Ok(())
    }
}

impl fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContext")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}
