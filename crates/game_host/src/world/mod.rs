//! The world service: system-level game logic, split into modules.

use crate::heartbeat::Heartbeat;
use anyhow::{anyhow, Context};
use server_engine::{
    EngineError, Millis, Module, ModuleSet, MessageRouter, OffsetClock, Service,
    ServiceContext, ServiceId, ServiceMessage,
};
use std::sync::Arc;
use tracing::debug;

pub mod gm;
pub mod presence;

pub use gm::{GmCommand, GmModule};
pub use presence::PresenceModule;

pub const WORLD_SERVICE_ID: ServiceId = ServiceId(1);

/// Message marks understood by the world service.
pub mod marks {
    pub const HEARTBEAT: i32 = 100;
    pub const GM_COMMAND: i32 = 101;
}

/// Every world module. Declaration order is tick order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldModuleType {
    Gm,
    Presence,
}

impl WorldModuleType {
    pub const ALL: [Self; 2] = [Self::Gm, Self::Presence];

    pub fn describe(self) -> &'static str {
        match self {
            Self::Gm => "World gm logic module",
            Self::Presence => "Heartbeat based service presence",
        }
    }

    fn create(self, settings: &WorldSettings) -> Box<dyn Module> {
        debug!("Creating world module: {}", self.describe());
        match self {
            Self::Gm => Box::new(GmModule::new(Arc::clone(&settings.clock))),
            Self::Presence => Box::new(PresenceModule::new(settings.presence_timeout)),
        }
    }
}

/// What the world modules need to be built.
#[derive(Clone)]
pub struct WorldSettings {
    pub clock: Arc<OffsetClock>,
    pub presence_timeout: Millis,
}

pub struct WorldService {
    modules: ModuleSet,
    ticks: u64,
}

impl WorldService {
    pub fn new(settings: WorldSettings) -> Self {
        let modules = ModuleSet::from_creators(WorldModuleType::ALL.into_iter().map(|kind| {
            let settings = settings.clone();
            move || kind.create(&settings)
        }));
        Self { modules, ticks: 0 }
    }

    /// Handlers for every mark the world service accepts.
    pub fn router() -> Result<MessageRouter<Self>, EngineError> {
        let mut router = MessageRouter::new();
        router
            .on(marks::HEARTBEAT, Self::on_heartbeat)?
            .on(marks::GM_COMMAND, Self::on_gm_command)?;
        Ok(router)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn module_names(&self) -> Vec<&'static str> {
        self.modules.names()
    }

    pub fn module_mut<M: Module>(&mut self) -> Option<&mut M> {
        self.modules.get_mut::<M>()
    }

    fn on_heartbeat(&mut self, ctx: &ServiceContext, message: ServiceMessage) -> anyhow::Result<()> {
        let source = message
            .source()
            .ok_or_else(|| anyhow!("heartbeat without a sending service"))?;
        let heartbeat = message
            .payload::<Heartbeat>()
            .context("heartbeat payload has the wrong type")?;
        let now = ctx.clock().now_millis();
        self.presence()?.record(source, heartbeat, now);
        Ok(())
    }

    fn on_gm_command(&mut self, _ctx: &ServiceContext, message: ServiceMessage) -> anyhow::Result<()> {
        let command = match message.into_payload::<GmCommand>() {
            Ok(command) => command,
            Err(message) => message
                .into_payload::<String>()
                .map_err(|_| anyhow!("GM command payload has the wrong type"))?
                .parse()?,
        };
        self.gm()?.execute(command);
        Ok(())
    }

    fn gm(&mut self) -> anyhow::Result<&mut GmModule> {
        self.modules
            .get_mut::<GmModule>()
            .ok_or_else(|| anyhow!("gm module is not loaded"))
    }

    fn presence(&mut self) -> anyhow::Result<&mut PresenceModule> {
        self.modules
            .get_mut::<PresenceModule>()
            .ok_or_else(|| anyhow!("presence module is not loaded"))
    }
}

impl Service for WorldService {
    fn init(&mut self, ctx: &ServiceContext) -> anyhow::Result<()> {
        self.modules.init_all(ctx)
    }

    fn tick_logic(&mut self, ctx: &ServiceContext, now: Millis) -> anyhow::Result<()> {
        self.ticks += 1;
        self.modules.tick_all(ctx, now)
    }
}
