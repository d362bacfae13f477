//! # server_engine
//!
//! A tick-driven scheduling engine for long-running game services.
//!
//! One engine thread wakes at a fixed period and drives a [`TaskProcessor`].
//! The processor hands due services to a pluggable [`TaskExecutor`] without
//! ever blocking, and reconciles finished runs on the next tick. Services
//! talk to each other through per-service mailboxes that any thread may
//! write to.
//!
//! ```no_run
//! use server_engine::{
//!     build_executor, Engine, EngineConfig, MessageRouter, OffsetClock, Service,
//!     ServiceContext, ServiceHost, ServiceId, TaskProcessor, TimeTicker,
//! };
//! use std::sync::Arc;
//!
//! struct Idle;
//!
//! impl Service for Idle {
//!     fn tick_logic(&mut self, _ctx: &ServiceContext, _now: i64) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = EngineConfig::default();
//! let clock = Arc::new(OffsetClock::new(config.clock_offset_ms));
//! let processor = TaskProcessor::new(build_executor(&config.executor)?, clock.clone());
//! let host = ServiceHost::from_config(processor.registrar(), clock.clone(), &config);
//!
//! host.spawn_service(ServiceId(1), "idle", Idle, Arc::new(MessageRouter::<Idle>::new()), None)?;
//!
//! let mut engine = Engine::new(clock).with_ticker(TimeTicker::new(config.tick_interval()));
//! engine.add_driver(processor);
//! let handle = engine.start()?;
//! let report = handle.stop()?;
//! println!("engine ran {} ticks", report.ticks);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod processor;
pub mod service;
pub mod time;

pub use config::{EngineConfig, ExecutorKind, ExecutorSettings};
pub use engine::{Engine, EngineHandle, EngineReport, TickDriver};
pub use error::{ConfigError, EngineError};
pub use host::ServiceHost;
pub use processor::{
    build_executor, EngineTask, FixedServiceExecutor, FixedThreadExecutor, ProcessorStats,
    TaskExecutor, TaskFailure, TaskId, TaskOutcome, TaskProcessor, TaskRegistrar,
};
pub use service::{
    MessageDispatcher, MessageMark, MessageRouter, Module, ModuleSet, Service, ServiceContext,
    ServiceDirectory, ServiceEndpoint, ServiceId, ServiceMessage, ServiceRunner, Tickable,
};
pub use time::{Clock, ManualClock, Millis, OffsetClock, TimeTicker};
