//! Engine configuration.

use crate::error::ConfigError;
use crate::processor::DEFAULT_FRAME_RATE_MS;
use crate::service::DEFAULT_MAILBOX_DRAIN_CAP;
use crate::time::Millis;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Floor for the default worker count, so one busy service cannot hold the
/// only slot.
pub const MIN_DEFAULT_WORKERS: usize = 2;

/// Which execution strategy drives engine tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    /// Shared pool with a global cap on in-flight tasks.
    #[default]
    FixedThread,
    /// One worker per shard; a service always runs on the same worker.
    FixedService,
}

impl FromStr for ExecutorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fixed_thread" => Ok(Self::FixedThread),
            "fixed_service" => Ok(Self::FixedService),
            _ => Err(ConfigError::UnknownExecutorKind(s.to_string())),
        }
    }
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FixedThread => write!(f, "fixed_thread"),
            Self::FixedService => write!(f, "fixed_service"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorSettings {
    #[serde(default)]
    pub kind: ExecutorKind,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            kind: ExecutorKind::default(),
            worker_count: default_worker_count(),
        }
    }
}

/// Tunables for the engine, the task processor and hosted services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Period of the global engine tick.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Frame rate given to services that do not ask for one.
    #[serde(default = "default_frame_rate")]
    pub default_frame_rate_ms: Millis,
    /// Messages a service handles per tick at most.
    #[serde(default = "default_drain_cap")]
    pub mailbox_drain_cap: usize,
    /// Initial offset applied to the system clock.
    #[serde(default)]
    pub clock_offset_ms: Millis,
    #[serde(default)]
    pub executor: ExecutorSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            default_frame_rate_ms: default_frame_rate(),
            mailbox_drain_cap: default_drain_cap(),
            clock_offset_ms: 0,
            executor: ExecutorSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Checks every value the engine cannot run with.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is usable, otherwise the first
    /// [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidTickInterval);
        }
        if self.default_frame_rate_ms <= 0 {
            return Err(ConfigError::InvalidFrameRate(self.default_frame_rate_ms));
        }
        if self.mailbox_drain_cap == 0 {
            return Err(ConfigError::InvalidDrainCap);
        }
        if self.executor.worker_count == 0 {
            return Err(ConfigError::InvalidWorkerCount);
        }
        Ok(())
    }

    /// The tick interval as the signed millisecond type the ticker uses.
    pub fn tick_interval(&self) -> Millis {
        Millis::try_from(self.tick_interval_ms).unwrap_or(Millis::MAX)
    }
}

fn default_tick_interval() -> u64 {
    50
}

fn default_frame_rate() -> Millis {
    DEFAULT_FRAME_RATE_MS
}

fn default_drain_cap() -> usize {
    DEFAULT_MAILBOX_DRAIN_CAP
}

fn default_worker_count() -> usize {
    num_cpus::get().max(MIN_DEFAULT_WORKERS)
}
