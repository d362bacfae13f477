//! Messages exchanged between services.

use super::ServiceId;
use std::any::Any;
use std::fmt;

/// Identifies a kind of message, not a message instance.
///
/// Business code should keep its marks in one place (a constants module or
/// an enum converted into marks) so that handlers and senders agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageMark(pub i32);

impl fmt::Display for MessageMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for MessageMark {
    fn from(mark: i32) -> Self {
        Self(mark)
    }
}

/// A single message travelling through a service mailbox.
///
/// Created fresh for every send and consumed exactly once by the receiving
/// service's dispatcher, which is why it is deliberately not `Clone`.
pub struct ServiceMessage {
    mark: MessageMark,
    source: Option<ServiceId>,
    target: Option<ServiceId>,
    payload: Box<dyn Any + Send>,
}

impl ServiceMessage {
    pub fn new<T: Any + Send>(mark: impl Into<MessageMark>, payload: T) -> Self {
        Self {
            mark: mark.into(),
            source: None,
            target: None,
            payload: Box::new(payload),
        }
    }

    /// A message that carries nothing but its mark.
    pub fn signal(mark: impl Into<MessageMark>) -> Self {
        Self::new(mark, ())
    }

    pub fn mark(&self) -> MessageMark {
        self.mark
    }

    /// Sender, stamped at send time. `None` for messages injected from
    /// outside any service.
    pub fn source(&self) -> Option<ServiceId> {
        self.source
    }

    /// Receiver, stamped when the message enters a mailbox.
    pub fn target(&self) -> Option<ServiceId> {
        self.target
    }

    pub(crate) fn stamp(&mut self, source: Option<ServiceId>, target: ServiceId) {
        self.source = source;
        self.target = Some(target);
    }

    /// Borrows the payload if it has type `T`.
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Takes the payload out if it has type `T`, giving the message back
    /// otherwise.
    pub fn into_payload<T: Any>(self) -> Result<T, Self> {
        let Self {
            mark,
            source,
            target,
            payload,
        } = self;
        match payload.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(payload) => Err(Self {
                mark,
                source,
                target,
                payload,
            }),
        }
    }
}

impl fmt::Debug for ServiceMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceMessage")
            .field("mark", &self.mark)
            .field("source", &self.source)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_access() {
        let message = ServiceMessage::new(7, String::from("hello"));
        assert_eq!(message.mark(), MessageMark(7));
        assert_eq!(message.payload::<String>().map(String::as_str), Some("hello"));
        assert!(message.payload::<u32>().is_none());

        let message = match message.into_payload::<u32>() {
            Ok(_) => panic!("payload is not a u32"),
            Err(message) => message,
        };
        assert_eq!(message.into_payload::<String>().unwrap(), "hello");
    }

    #[test]
    fn test_fresh_message_is_unstamped() {
        let mut message = ServiceMessage::signal(1);
        assert!(message.source().is_none());
        assert!(message.target().is_none());

        message.stamp(Some(ServiceId(3)), ServiceId(4));
        assert_eq!(message.source(), Some(ServiceId(3)));
        assert_eq!(message.target(), Some(ServiceId(4)));
    }
}
