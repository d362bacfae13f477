//! Signal handling for graceful shutdown.
//!
//! The host runs until the operating system asks it to stop. Which signal
//! arrived is reported back so the shutdown log says why the host stopped.

use std::fmt;
use tokio::signal;

/// The termination request that ended the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT, or Ctrl+C on Windows.
    Interrupt,
    /// SIGTERM, usually from a process supervisor.
    #[cfg_attr(not(unix), allow(dead_code))]
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => write!(f, "SIGINT"),
            Self::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Waits for the first termination request.
///
/// # Platform Support
///
/// * **Unix platforms**: SIGINT and SIGTERM
/// * **Windows**: Ctrl+C
///
/// # Returns
///
/// The signal that arrived, or an error if the handlers could not be
/// installed.
///
/// # Example
///
/// ```ignore
/// let signal = wait_for_shutdown().await?;
/// info!("🛑 {} received", signal);
/// handle.stop()?;
/// ```
pub async fn wait_for_shutdown() -> anyhow::Result<ShutdownSignal> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;

        let received = tokio::select! {
            _ = interrupt.recv() => ShutdownSignal::Interrupt,
            _ = terminate.recv() => ShutdownSignal::Terminate,
        };
        Ok(received)
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        Ok(ShutdownSignal::Interrupt)
    }
}
