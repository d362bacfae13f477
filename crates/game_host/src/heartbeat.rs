//! A service that reports its liveness to the world every frame.

use crate::world::marks;
use server_engine::{Millis, Service, ServiceContext, ServiceId, ServiceMessage};

pub const HEARTBEAT_SERVICE_ID: ServiceId = ServiceId(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub sequence: u64,
    pub sent_at: Millis,
}

pub struct HeartbeatService {
    target: ServiceId,
    sequence: u64,
}

impl HeartbeatService {
    pub fn new(target: ServiceId) -> Self {
        Self { target, sequence: 0 }
    }

    pub fn sent(&self) -> u64 {
        self.sequence
    }
}

impl Service for HeartbeatService {
    fn init(&mut self, ctx: &ServiceContext) -> anyhow::Result<()> {
        if !ctx.directory().contains(self.target) {
            anyhow::bail!("heartbeat target {} is not registered", self.target);
        }
        Ok(())
    }

    fn tick_logic(&mut self, ctx: &ServiceContext, now: Millis) -> anyhow::Result<()> {
        self.sequence += 1;
        let heartbeat = Heartbeat {
            sequence: self.sequence,
            sent_at: now,
        };
        ctx.send_to(self.target, ServiceMessage::new(marks::HEARTBEAT, heartbeat))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use server_engine::{ManualClock, ServiceDirectory, ServiceEndpoint};
    use std::sync::Arc;

    #[test]
    fn test_sends_numbered_heartbeats() {
        let directory = ServiceDirectory::new();
        let world = Arc::new(ServiceEndpoint::new(ServiceId(1), "world"));
        directory.register(Arc::clone(&world)).unwrap();
        let ctx = ServiceContext::new(
            Arc::new(ServiceEndpoint::new(HEARTBEAT_SERVICE_ID, "heartbeat")),
            directory,
            Arc::new(ManualClock::new(0)),
        );

        let mut service = HeartbeatService::new(ServiceId(1));
        service.init(&ctx).unwrap();
        service.tick_logic(&ctx, 10).unwrap();
        service.tick_logic(&ctx, 20).unwrap();

        assert_eq!(service.sent(), 2);
        assert_eq!(world.pending_messages(), 2);
    }

    #[test]
    fn test_init_fails_without_target() {
        let ctx = ServiceContext::new(
            Arc::new(ServiceEndpoint::new(HEARTBEAT_SERVICE_ID, "heartbeat")),
            ServiceDirectory::new(),
            Arc::new(ManualClock::new(0)),
        );
        assert!(HeartbeatService::new(ServiceId(1)).init(&ctx).is_err());
    }
}
