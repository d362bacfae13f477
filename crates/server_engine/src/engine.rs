//! The engine: the single thread that paces everything else.
//!
//! The engine owns a [`TimeTicker`] and a list of [`TickDriver`]s. Whenever
//! the ticker becomes due it drives every driver once, in registration order,
//! and otherwise sleeps for half the remaining time to the next tick. A stop
//! request is only ever observed between global ticks.

use crate::error::EngineError;
use crate::processor::panic_message;
use crate::time::{Clock, Millis, TimeTicker};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Name of the engine's own OS thread.
pub const ENGINE_THREAD_NAME: &str = "server-engine";

/// Something the engine drives once per global tick.
pub trait TickDriver: Send {
    fn name(&self) -> &str;

    /// Runs one step. `interval` is the time since the previous global tick.
    fn tick(&mut self, interval: Millis);

    /// Called once on the engine thread after the loop has stopped.
    fn shutdown(&mut self) {}
}

/// What the engine did over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineReport {
    pub ticks: u64,
}

pub struct Engine {
    clock: Arc<dyn Clock>,
    ticker: Option<TimeTicker>,
    drivers: Vec<Box<dyn TickDriver>>,
    last_tick: Option<Millis>,
    ticks: u64,
}

impl Engine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            ticker: None,
            drivers: Vec::new(),
            last_tick: None,
            ticks: 0,
        }
    }

    pub fn with_ticker(mut self, ticker: TimeTicker) -> Self {
        self.ticker = Some(ticker);
        self
    }

    pub fn set_ticker(&mut self, ticker: TimeTicker) -> &mut Self {
        self.ticker = Some(ticker);
        self
    }

    pub fn ticker(&self) -> Option<&TimeTicker> {
        self.ticker.as_ref()
    }

    /// Appends a driver. Drivers are ticked in the order they were added.
    pub fn add_driver(&mut self, driver: impl TickDriver + 'static) -> &mut Self {
        debug!(driver = driver.name(), "Tick driver added");
        self.drivers.push(Box::new(driver));
        self
    }

    pub fn driver_count(&self) -> usize {
        self.drivers.len()
    }

    /// Global ticks driven so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Drives one global tick if the ticker is due at `now`.
    ///
    /// Returns whether a tick happened. Never sleeps.
    pub fn step(&mut self, now: Millis) -> bool {
        let Some(ticker) = self.ticker.as_mut() else {
            return false;
        };
        if !ticker.tick(now) {
            return false;
        }

        // A clock moved backwards counts as one regular interval.
        let interval = match self.last_tick {
            Some(previous) if now >= previous => now - previous,
            _ => ticker.interval(),
        };
        self.last_tick = Some(now);
        self.ticks += 1;

        trace!(tick = self.ticks, now, interval, "Engine tick");
        for driver in &mut self.drivers {
            driver.tick(interval);
        }
        true
    }

    /// How long the loop should wait at `now` before checking again.
    ///
    /// Half the time left until the next tick, at least 1ms and never more
    /// than one tick interval, so a clock jump cannot park the loop.
    pub fn idle_wait(&self, now: Millis) -> Duration {
        let (until_due, interval) = self
            .ticker
            .as_ref()
            .map_or((1, 1), |ticker| (ticker.diff_next(now), ticker.interval()));
        let millis = (until_due / 2).clamp(1, interval.max(1));
        Duration::from_millis(u64::try_from(millis).unwrap_or(1))
    }

    /// Moves the engine onto its own thread and starts the loop.
    ///
    /// # Returns
    ///
    /// A handle that stops and joins the thread, or
    /// [`EngineError::MissingTicker`] if no ticker was set and
    /// [`EngineError::ThreadSpawn`] if the thread could not be started.
    ///
    /// # Example
    ///
    /// ```rust
    /// use server_engine::{Engine, OffsetClock, TimeTicker};
    /// use std::sync::Arc;
    ///
    /// let engine = Engine::new(Arc::new(OffsetClock::default())).with_ticker(TimeTicker::new(10));
    /// let handle = engine.start().unwrap();
    /// assert!(handle.stop().is_ok());
    /// ```
    pub fn start(self) -> Result<EngineHandle, EngineError> {
        let Some(ticker) = self.ticker.as_ref() else {
            warn!("⚠️  Server engine has no time ticker, refusing to start");
            return Err(EngineError::MissingTicker);
        };
        let interval = ticker.interval();
        let drivers = self.drivers.len();

        let (shutdown_tx, shutdown_rx) = channel::bounded(1);
        let thread = thread::Builder::new()
            .name(ENGINE_THREAD_NAME.to_string())
            .spawn(move || self.run(shutdown_rx))
            .map_err(|source| EngineError::ThreadSpawn {
                name: ENGINE_THREAD_NAME.to_string(),
                source,
            })?;

        info!(interval_ms = interval, drivers, "🚀 Server engine thread started");
        Ok(EngineHandle {
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    fn run(mut self, shutdown: Receiver<()>) -> EngineReport {
        loop {
            let now = self.clock.now_millis();
            if self.step(now) {
                match shutdown.try_recv() {
                    Err(TryRecvError::Empty) => continue,
                    Ok(()) | Err(TryRecvError::Disconnected) => break,
                }
            }

            match shutdown.recv_timeout(self.idle_wait(now)) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        info!(ticks = self.ticks, "🛑 Server engine loop stopped");
        self.shutdown_drivers();
        EngineReport { ticks: self.ticks }
    }

    fn shutdown_drivers(&mut self) {
        for driver in &mut self.drivers {
            debug!(driver = driver.name(), "Shutting down tick driver");
            driver.shutdown();
        }
    }
}

/// Control handle for a running engine.
///
/// Dropping the handle also asks the engine to stop, but does not wait.
pub struct EngineHandle {
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<EngineReport>>,
}

impl EngineHandle {
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Signals the engine, waits for its loop and drivers to finish, and
    /// returns its report.
    ///
    /// # Returns
    ///
    /// The [`EngineReport`], or [`EngineError::EngineThread`] if the engine
    /// thread panicked.
    pub fn stop(mut self) -> Result<EngineReport, EngineError> {
        if let Some(shutdown) = self.shutdown.take() {
            // The engine may already be gone; either way the join below ends it.
            let _ = shutdown.try_send(());
        }

        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|payload| EngineError::EngineThread(panic_message(payload.as_ref()))),
            None => Ok(EngineReport::default()),
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.try_send(());
        }
    }
}
