//! OS signal wiring for the foreground supervisor.
//!
//! - **SIGINT**, **SIGTERM**, **SIGQUIT** request a stop
//! - **SIGHUP** requests an operator restart of the child

use crate::process::SupervisorHandle;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;

/// Install the handlers and forward signals to `handle` until it stops
pub fn forward_signals(handle: SupervisorHandle) -> std::io::Result<JoinHandle<()>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;
    let mut sighup = signal(SignalKind::hangup())?;

    Ok(tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                _ = sigint.recv() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
                _ = sigquit.recv() => "SIGQUIT",
                _ = sighup.recv() => {
                    tracing::info!("Received SIGHUP, restarting managed process");
                    if handle.restart().await.is_err() {
                        break;
                    }
                    continue;
                }
            };

            tracing::info!("Received {}, stopping", name);
            handle.stop();
            break;
        }
    }))
}
