//! Main application entry point for the game host.
//!
//! Loads configuration, boots the scheduling engine with the world and
//! heartbeat services, and runs until a shutdown signal arrives.

mod cli;
mod config;
mod console;
mod heartbeat;
mod logging;
mod signals;
mod world;

use anyhow::Context;
use cli::CliArgs;
use config::AppConfig;
use heartbeat::{HeartbeatService, HEARTBEAT_SERVICE_ID};
use server_engine::{
    build_executor, Engine, MessageRouter, OffsetClock, ServiceHost, ServiceRunner, TaskProcessor,
    TimeTicker,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use world::{GmModule, PresenceModule, WorldService, WorldSettings, WORLD_SERVICE_ID};

/// Heartbeats missed before the world considers a service stale.
const MISSED_HEARTBEATS: i64 = 3;

/// The booted process: an engine ready to start plus the services it runs.
pub struct Application {
    config: AppConfig,
    engine: Engine,
    host: ServiceHost,
    world: Arc<ServiceRunner<WorldService>>,
    heartbeat: Option<Arc<ServiceRunner<HeartbeatService>>>,
}

impl Application {
    /// Loads and validates configuration, sets up logging and registers
    /// every service. Nothing runs until [`run`](Self::run).
    pub async fn new(args: CliArgs) -> anyhow::Result<Self> {
        // Configuration is loaded before logging exists.
        let mut config = AppConfig::load_from_file(&args.config_path)
            .await
            .with_context(|| format!("failed to load {}", args.config_path.display()))?;
        config.apply_overrides(&args)?;
        let validation = config.validate();
        if validation.is_err() {
            config.logging.level = "info".to_string();
        }
        if let Err(e) = logging::setup_logging(&config.logging) {
            eprintln!("⚠️  Logging was already initialized: {e}");
        }

        if let Err(e) = validation {
            error!("❌ Configuration validation failed: {}", e);
            anyhow::bail!("configuration validation failed: {e}");
        }
        info!("✅ Configuration is valid ({})", args.config_path.display());

        let engine_config = &config.engine;
        let clock = Arc::new(OffsetClock::new(engine_config.clock_offset_ms));
        let executor = build_executor(&engine_config.executor)?;
        let processor = TaskProcessor::new(executor, clock.clone());
        let host = ServiceHost::from_config(processor.registrar(), clock.clone(), engine_config);

        let world = host.spawn_service(
            WORLD_SERVICE_ID,
            "world",
            WorldService::new(WorldSettings {
                clock: Arc::clone(&clock),
                presence_timeout: config
                    .services
                    .heartbeat_frame_rate_ms
                    .saturating_mul(MISSED_HEARTBEATS),
            }),
            Arc::new(WorldService::router()?),
            Some(config.services.world_frame_rate_ms),
        )?;

        let heartbeat = if config.services.heartbeat_enabled {
            Some(host.spawn_service(
                HEARTBEAT_SERVICE_ID,
                "heartbeat",
                HeartbeatService::new(WORLD_SERVICE_ID),
                Arc::new(MessageRouter::<HeartbeatService>::new()),
                Some(config.services.heartbeat_frame_rate_ms),
            )?)
        } else {
            warn!("Heartbeat service disabled");
            None
        };

        let mut engine = Engine::new(clock).with_ticker(TimeTicker::new(engine_config.tick_interval()));
        engine.add_driver(processor);

        Ok(Self {
            config,
            engine,
            host,
            world,
            heartbeat,
        })
    }

    /// Starts the engine and blocks until a shutdown signal.
    pub async fn run(self) -> anyhow::Result<()> {
        let engine_config = &self.config.engine;
        info!("🚀 Game host v{}", env!("CARGO_PKG_VERSION"));
        info!("📋 Configuration Summary:");
        info!("  ⏱️  Engine tick: {}ms", engine_config.tick_interval_ms);
        info!(
            "  ⚡ Executor: {} x{}",
            engine_config.executor.kind, engine_config.executor.worker_count
        );
        info!("  📬 Mailbox drain cap: {}", engine_config.mailbox_drain_cap);
        info!("  🌍 World frame rate: {}ms", self.config.services.world_frame_rate_ms);
        self.world.with_state(|world| {
            info!("  🧩 World modules: {}", world.module_names().join(", "));
        });

        let handle = self.engine.start()?;
        // Detached: a read still pending on stdin must not delay exit.
        match console::spawn_console(self.host.clone()) {
            Ok(_console) => info!("✅ Game host is now running, type GM commands on stdin"),
            Err(e) => warn!("⚠️  GM console unavailable: {}", e),
        }
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        let signal = signals::wait_for_shutdown().await?;
        info!("🛑 {} received, initiating graceful shutdown...", signal);

        let report = tokio::task::spawn_blocking(move || handle.stop()).await??;

        info!("📊 Final Statistics:");
        info!("  - Engine ticks: {}", report.ticks);
        self.world.with_state(|world| {
            info!("  - World ticks: {}", world.ticks());
            if let Some(gm) = world.module_mut::<GmModule>() {
                info!("  - GM commands executed: {}", gm.executed());
                if let Some(reply) = gm.history().last() {
                    info!("  - Last GM reply: {}", reply);
                }
            }
            if let Some(presence) = world.module_mut::<PresenceModule>() {
                info!("  - Heartbeats received: {}", presence.received());
                info!("  - Heartbeat service: {}", presence.status(HEARTBEAT_SERVICE_ID));
            }
        });
        if let Some(heartbeat) = &self.heartbeat {
            info!("  - Heartbeats sent: {}", heartbeat.with_state(|service| service.sent()));
        }
        info!("👋 Game host shutdown complete");
        Ok(())
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let args = CliArgs::parse();

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:#}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("❌ Failed to start application: {e:#}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn args(config_path: PathBuf) -> CliArgs {
        CliArgs {
            config_path,
            log_level: None,
            json_logs: false,
            workers: Some(2),
            executor: None,
        }
    }

    #[tokio::test]
    async fn test_application_boots_with_default_config() {
        let dir = TempDir::new().unwrap();
        let app = Application::new(args(dir.path().join("config.toml"))).await.unwrap();

        assert_eq!(app.engine.driver_count(), 1);
        assert!(app.host.directory().contains(WORLD_SERVICE_ID));
        assert!(app.host.directory().contains(HEARTBEAT_SERVICE_ID));
        assert!(app.heartbeat.is_some());
        assert_eq!(app.config.engine.executor.worker_count, 2);
        assert_eq!(
            app.world.with_state(|world| world.module_names()),
            vec!["gm", "presence"]
        );
    }

    #[tokio::test]
    async fn test_invalid_override_fails_boot() {
        let dir = TempDir::new().unwrap();
        let mut args = args(dir.path().join("config.toml"));
        args.workers = Some(0);
        assert!(Application::new(args).await.is_err());
    }
}
