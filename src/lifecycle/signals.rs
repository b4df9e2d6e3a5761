//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT)
//! - Translate the first signal into a graceful drain
//! - Force exit on a second signal
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Multiple SIGTERM/SIGINT triggers forced shutdown

use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::Shutdown;

/// Spawn a task that turns termination signals into shutdown events.
pub fn spawn_signal_handler(shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(name) => {
                if shutdown.trigger() {
                    tracing::info!(signal = name, "Termination signal received, draining");
                } else {
                    tracing::info!(signal = name, "Termination signal received, drain already in progress");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handlers");
                return;
            }
        }

        if let Ok(name) = wait_for_signal().await {
            tracing::warn!(signal = name, "Second termination signal, forcing exit");
            std::process::exit(1);
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = terminate.recv() => Ok("SIGTERM"),
        _ = interrupt.recv() => Ok("SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
