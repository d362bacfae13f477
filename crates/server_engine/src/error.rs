//! Error types for the scheduling engine.
//!
//! Infrastructure failures are typed with `thiserror`. Business code running
//! inside services (tick logic, message handlers) reports failures through
//! `anyhow::Result` and never reaches these types directly.

use crate::service::{MessageMark, ServiceId};
use thiserror::Error;

/// Errors raised while building, registering into, or running the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine was started without a ticker to pace it.
    #[error("engine has no time ticker configured")]
    MissingTicker,

    /// A worker or the engine thread itself could not be spawned.
    #[error("failed to spawn thread {name}: {source}")]
    ThreadSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine thread panicked and could not be joined cleanly.
    #[error("engine thread terminated abnormally: {0}")]
    EngineThread(String),

    #[error("service {0} is already registered")]
    DuplicateService(ServiceId),

    #[error("service {0} is not registered")]
    UnknownService(ServiceId),

    /// A service refused to initialise.
    #[error("service {id} failed to initialise: {message}")]
    ServiceInit { id: ServiceId, message: String },

    #[error("a handler for message mark {0} is already registered")]
    DuplicateHandler(MessageMark),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration values that cannot be used to boot an engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("tick interval must be greater than 0ms")]
    InvalidTickInterval,

    #[error("default frame rate must be greater than 0ms, got {0}")]
    InvalidFrameRate(i64),

    #[error("executor worker count must be greater than 0")]
    InvalidWorkerCount,

    #[error("mailbox drain cap must be greater than 0")]
    InvalidDrainCap,

    #[error("unknown executor kind: {0}")]
    UnknownExecutorKind(String),
}
