use crate::error::{Result, VigilError};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::Child;

/// Signal names accepted for the graceful stop
pub const VALID_SIGNALS: [&str; 7] = [
    "SIGTERM", "SIGINT", "SIGQUIT", "SIGKILL", "SIGHUP", "SIGUSR1", "SIGUSR2",
];

/// Graceful-then-forceful termination settings
#[derive(Debug, Clone)]
pub struct ShutdownSettings {
    /// Signal sent first
    pub kill_signal: Signal,
    /// Grace period before escalating to SIGKILL
    pub kill_timeout: Duration,
    /// Signal the child's whole process group instead of just the child
    pub treekill: bool,
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            kill_signal: Signal::SIGINT,
            kill_timeout: Duration::from_millis(1600),
            treekill: true,
        }
    }
}

/// How a termination sequence ended
#[derive(Debug)]
pub struct ShutdownReport {
    pub status: Option<ExitStatus>,
    /// SIGKILL had to be sent
    pub forced: bool,
}

pub fn parse_signal(signal_name: &str) -> Result<Signal> {
    match signal_name {
        "SIGTERM" => Ok(Signal::SIGTERM),
        "SIGINT" => Ok(Signal::SIGINT),
        "SIGQUIT" => Ok(Signal::SIGQUIT),
        "SIGKILL" => Ok(Signal::SIGKILL),
        "SIGHUP" => Ok(Signal::SIGHUP),
        "SIGUSR1" => Ok(Signal::SIGUSR1),
        "SIGUSR2" => Ok(Signal::SIGUSR2),
        _ => Err(VigilError::SignalError(format!(
            "Invalid signal name: {}. Must be one of: {}",
            signal_name,
            VALID_SIGNALS.join(", ")
        ))),
    }
}

/// Deliver `sig` to the child (or its process group). A child that is
/// already gone is not an error.
pub fn send_signal(pid: u32, sig: Signal, treekill: bool) -> Result<()> {
    let nix_pid = Pid::from_raw(pid as i32);

    let sent = if treekill {
        signal::killpg(nix_pid, sig)
    } else {
        signal::kill(nix_pid, sig)
    };

    match sent {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(VigilError::SignalError(format!(
            "Failed to send {} to {}: {}",
            sig, pid, e
        ))),
    }
}

/// Stop `child`: graceful signal, wait up to `kill_timeout`, then SIGKILL once
pub async fn terminate(
    child: &mut Child,
    pid: u32,
    name: &str,
    settings: &ShutdownSettings,
) -> Result<ShutdownReport> {
    if let Some(status) = child.try_wait()? {
        tracing::debug!("Process {} already exited with {}", name, status);
        return Ok(ShutdownReport {
            status: Some(status),
            forced: false,
        });
    }

    tracing::info!(
        "Gracefully stopping process {} (PID: {}) with {}",
        name,
        pid,
        settings.kill_signal
    );
    send_signal(pid, settings.kill_signal, settings.treekill)?;

    match tokio::time::timeout(settings.kill_timeout, child.wait()).await {
        Ok(status) => {
            let status = status?;
            tracing::info!("Process {} exited gracefully with status: {}", name, status);
            Ok(ShutdownReport {
                status: Some(status),
                forced: false,
            })
        }
        Err(_) => {
            let timeout = VigilError::ShutdownTimeout(
                name.to_string(),
                settings.kill_timeout.as_millis() as u64,
            );
            tracing::error!("{}", timeout);

            send_signal(pid, Signal::SIGKILL, settings.treekill)?;
            let status = child.wait().await?;

            tracing::error!("Process {} killed with status: {}", name, status);
            Ok(ShutdownReport {
                status: Some(status),
                forced: true,
            })
        }
    }
}
