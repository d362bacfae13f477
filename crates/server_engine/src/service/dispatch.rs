//! Routing of drained mailbox messages to handlers.

use super::{MessageMark, ServiceContext, ServiceMessage};
use crate::error::EngineError;
use std::collections::HashMap;
use tracing::{error, warn};

/// Receives every message a service drains from its mailbox.
///
/// Implementations must absorb their own failures: one bad message must not
/// abort the rest of the drain.
pub trait MessageDispatcher<S>: Send + Sync {
    fn dispatch(
        &self,
        mark: MessageMark,
        service: &mut S,
        ctx: &ServiceContext,
        message: ServiceMessage,
    );
}

type Handler<S> =
    Box<dyn Fn(&mut S, &ServiceContext, ServiceMessage) -> anyhow::Result<()> + Send + Sync>;

/// Dispatch table from message mark to handler, built explicitly at
/// service-setup time.
///
/// Unknown marks are logged and dropped; handler errors are logged and the
/// drain continues.
pub struct MessageRouter<S> {
    handlers: HashMap<MessageMark, Handler<S>>,
}

impl<S> Default for MessageRouter<S> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<S> MessageRouter<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler for `mark`. Each mark has exactly one handler.
    ///
    /// # Arguments
    ///
    /// * `mark` - Message kind the handler answers to
    /// * `handler` - Called with the service state, its context and the message
    ///
    /// # Returns
    ///
    /// The router for chaining, or [`EngineError::DuplicateHandler`] if
    /// `mark` already has a handler.
    ///
    /// # Example
    ///
    /// ```rust
    /// use server_engine::{MessageMark, MessageRouter};
    ///
    /// #[derive(Default)]
    /// struct Counter {
    ///     pings: u32,
    /// }
    ///
    /// let mut router = MessageRouter::<Counter>::new();
    /// router
    ///     .on(1, |counter: &mut Counter, _ctx, _message| {
    ///         counter.pings += 1;
    ///         Ok(())
    ///     })
    ///     .unwrap();
    /// assert!(router.handles(MessageMark(1)));
    /// assert!(router.on(1, |_: &mut Counter, _ctx, _message| Ok(())).is_err());
    /// ```
    pub fn on<F>(&mut self, mark: impl Into<MessageMark>, handler: F) -> Result<&mut Self, EngineError>
    where
        F: Fn(&mut S, &ServiceContext, ServiceMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mark = mark.into();
        if self.handlers.contains_key(&mark) {
            return Err(EngineError::DuplicateHandler(mark));
        }
        self.handlers.insert(mark, Box::new(handler));
        Ok(self)
    }

    pub fn handles(&self, mark: MessageMark) -> bool {
        self.handlers.contains_key(&mark)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl<S: Send> MessageDispatcher<S> for MessageRouter<S> {
    fn dispatch(
        &self,
        mark: MessageMark,
        service: &mut S,
        ctx: &ServiceContext,
        message: ServiceMessage,
    ) {
        let Some(handler) = self.handlers.get(&mark) else {
            warn!(
                service_id = %ctx.service_id(),
                %mark,
                source = ?message.source(),
                "No handler registered for message, dropping it"
            );
            return;
        };

        if let Err(e) = handler(service, ctx, message) {
            error!(
                service_id = %ctx.service_id(),
                %mark,
                "Message handler failed: {e:#}"
            );
        }
    }
}
