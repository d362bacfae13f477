use crate::heartbeat::Heartbeat;
use server_engine::{Millis, Module, ServiceContext, ServiceId};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{info, warn};

/// What the world knows about one service's liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceStatus {
    Unknown,
    Alive { last_seen: Millis },
    Stale { last_seen: Millis },
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "never seen"),
            Self::Alive { last_seen } => write!(f, "alive, last seen at {last_seen}"),
            Self::Stale { last_seen } => write!(f, "stale, last seen at {last_seen}"),
        }
    }
}

/// Tracks which services are alive from the heartbeats they send.
pub struct PresenceModule {
    timeout: Millis,
    last_seen: BTreeMap<ServiceId, Millis>,
    last_sequence: BTreeMap<ServiceId, u64>,
    stale: BTreeSet<ServiceId>,
    received: u64,
}

impl PresenceModule {
    /// A service counts as stale once `timeout` passes without a heartbeat.
    pub fn new(timeout: Millis) -> Self {
        Self {
            timeout,
            last_seen: BTreeMap::new(),
            last_sequence: BTreeMap::new(),
            stale: BTreeSet::new(),
            received: 0,
        }
    }

    pub fn record(&mut self, source: ServiceId, heartbeat: &Heartbeat, now: Millis) {
        self.received += 1;
        self.last_seen.insert(source, now);

        if let Some(previous) = self.last_sequence.insert(source, heartbeat.sequence) {
            if heartbeat.sequence != previous + 1 {
                warn!(
                    service_id = %source,
                    expected = previous + 1,
                    got = heartbeat.sequence,
                    "Heartbeat sequence gap"
                );
            }
        }
        if self.stale.remove(&source) {
            info!(service_id = %source, "💓 Service is alive again");
        }
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn last_seen(&self, service: ServiceId) -> Option<Millis> {
        self.last_seen.get(&service).copied()
    }

    pub fn is_stale(&self, service: ServiceId) -> bool {
        self.stale.contains(&service)
    }

    pub fn status(&self, service: ServiceId) -> PresenceStatus {
        match self.last_seen(service) {
            None => PresenceStatus::Unknown,
            Some(last_seen) if self.is_stale(service) => PresenceStatus::Stale { last_seen },
            Some(last_seen) => PresenceStatus::Alive { last_seen },
        }
    }
}

impl Module for PresenceModule {
    fn name(&self) -> &'static str {
        "presence"
    }

    fn tick(&mut self, _ctx: &ServiceContext, now: Millis) -> anyhow::Result<()> {
        for (&service, &seen) in &self.last_seen {
            if now.saturating_sub(seen) >= self.timeout && self.stale.insert(service) {
                warn!(service_id = %service, silent_ms = now - seen, "Service stopped sending heartbeats");
            }
        }
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use server_engine::{ManualClock, ServiceDirectory, ServiceEndpoint};
    use std::sync::Arc;

    fn ctx() -> ServiceContext {
        ServiceContext::new(
            Arc::new(ServiceEndpoint::new(ServiceId(1), "world")),
            ServiceDirectory::new(),
            Arc::new(ManualClock::new(0)),
        )
    }

    #[test]
    fn test_service_goes_stale_and_recovers() {
        let mut presence = PresenceModule::new(100);
        let ctx = ctx();
        let source = ServiceId(2);

        presence.record(source, &Heartbeat { sequence: 1, sent_at: 0 }, 0);
        presence.tick(&ctx, 99).unwrap();
        assert!(!presence.is_stale(source));

        presence.tick(&ctx, 100).unwrap();
        assert!(presence.is_stale(source));

        presence.record(source, &Heartbeat { sequence: 2, sent_at: 150 }, 150);
        assert!(!presence.is_stale(source));
        assert_eq!(presence.last_seen(source), Some(150));
        assert_eq!(presence.received(), 2);
    }

    #[test]
    fn test_status_reports_liveness() {
        let mut presence = PresenceModule::new(100);
        let ctx = ctx();
        let source = ServiceId(2);
        assert_eq!(presence.status(source), PresenceStatus::Unknown);

        presence.record(source, &Heartbeat { sequence: 1, sent_at: 40 }, 40);
        assert_eq!(presence.status(source), PresenceStatus::Alive { last_seen: 40 });

        presence.tick(&ctx, 140).unwrap();
        let status = presence.status(source);
        assert_eq!(status, PresenceStatus::Stale { last_seen: 40 });
        assert_eq!(status.to_string(), "stale, last seen at 40");
    }
}
