use crate::error::{Result, VigilError};
use crate::logs::{LogCapture, LogSettings};
use crate::process::limits::ResourceLimits;
use crate::process::monitor::{MemorySampler, SysinfoSampler};
use crate::process::pid::PidFile;
use crate::process::restart::{RestartDecision, RestartPolicy};
use crate::process::shutdown::{self, ShutdownSettings};
use crate::process::spawner::spawn_process;
use crate::process::types::{ManagedProcessSpec, RuntimeState};
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::{Duration, Instant};
use tokio::process::Child;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 256;
const COMMAND_CAPACITY: usize = 8;

/// Everything the supervisor needs to manage one child
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub spec: ManagedProcessSpec,
    pub restart: RestartPolicy,
    pub limits: ResourceLimits,
    pub logs: LogSettings,
    pub shutdown: ShutdownSettings,
}

/// Why a new child instance is being started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartCause {
    Crash,
    SpawnFailure,
    MemoryLimit,
    Manual,
}

impl std::fmt::Display for RestartCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestartCause::Crash => write!(f, "process exited"),
            RestartCause::SpawnFailure => write!(f, "spawn failed"),
            RestartCause::MemoryLimit => write!(f, "memory limit exceeded"),
            RestartCause::Manual => write!(f, "operator request"),
        }
    }
}

/// How supervision ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Stopped on request
    Stopped,
    /// The child exited and autorestart is disabled
    ChildExited { code: Option<i32> },
    /// Too many restarts within the window
    BudgetExhausted { restarts: u32 },
}

impl Outcome {
    /// Exit code for the supervisor process
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Stopped => 0,
            Outcome::ChildExited { code: Some(0) } => 0,
            Outcome::ChildExited { .. } => 1,
            Outcome::BudgetExhausted { .. } => 1,
        }
    }
}

/// Lifecycle notifications published by a running supervisor
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEvent {
    Spawned { pid: u32 },
    SpawnFailed { reason: String },
    /// `last_memory` is the most recent resident-memory sample, if any
    Exited {
        code: Option<i32>,
        signal: Option<i32>,
        last_memory: Option<u64>,
    },
    /// The child reached `min_uptime`; the restart counter was reset
    Stable,
    MemoryLimitExceeded { sample: u64, limit: u64 },
    /// `attempt` is 0 for operator restarts, which do not use the budget
    RestartScheduled {
        attempt: u32,
        delay: Duration,
        cause: RestartCause,
    },
    RestartBudgetExhausted { restarts: u32 },
    /// The graceful signal was ignored and SIGKILL was sent
    ShutdownEscalated { pid: u32 },
    /// `restarts` counts every restart over the supervisor's lifetime
    Terminated { outcome: Outcome, restarts: u64 },
}

#[derive(Debug)]
enum SupervisorCommand {
    Restart,
}

/// Cloneable control surface for a supervisor running on another task
#[derive(Clone)]
pub struct SupervisorHandle {
    commands: mpsc::Sender<SupervisorCommand>,
    events: broadcast::Sender<SupervisorEvent>,
    cancel: CancellationToken,
}

impl SupervisorHandle {
    /// Request a stop; pending backoff waits and memory checks are abandoned
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop the current child and start a fresh one without using the budget
    pub async fn restart(&self) -> Result<()> {
        self.commands
            .send(SupervisorCommand::Restart)
            .await
            .map_err(|_| VigilError::SupervisorGone)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }

}

enum WatchEvent {
    Stop,
    Command(SupervisorCommand),
    Exited(Option<ExitStatus>),
    Stable,
    SampleMemory,
}

enum RunEnd {
    StopRequested,
    RestartRequested,
    Exited(Option<ExitStatus>),
    MemoryLimit,
}

/// Owns the lifecycle of one child process
pub struct Supervisor {
    settings: SupervisorSettings,
    state: RuntimeState,
    sampler: Box<dyn MemorySampler>,
    commands_tx: mpsc::Sender<SupervisorCommand>,
    commands_rx: mpsc::Receiver<SupervisorCommand>,
    events: broadcast::Sender<SupervisorEvent>,
    cancel: CancellationToken,
}

impl Supervisor {
    pub fn new(settings: SupervisorSettings) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            settings,
            state: RuntimeState::new(),
            sampler: Box::new(SysinfoSampler::new()),
            commands_tx,
            commands_rx,
            events,
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the memory sampler
    pub fn with_sampler(mut self, sampler: impl MemorySampler + 'static) -> Self {
        self.sampler = Box::new(sampler);
        self
    }

    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            commands: self.commands_tx.clone(),
            events: self.events.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Supervise the child until it is stopped or can no longer be restarted
    pub async fn run(mut self) -> Result<Outcome> {
        let capture = LogCapture::open(&self.settings.logs).await?;
        let pid_file = self.settings.spec.pid_file.as_ref().map(PidFile::with_path);

        info!("Supervising process '{}'", self.settings.spec.name);

        let outcome = self.supervise(&capture, pid_file.as_ref()).await;
        self.state.mark_terminated();

        if let Some(ref pid_file) = pid_file {
            if let Err(e) = pid_file.remove() {
                warn!("Failed to remove pid file {}: {}", pid_file.path().display(), e);
            }
        }
        capture.close().await;

        match &outcome {
            Ok(ended) => {
                let restarts = self.state.total_restarts;
                info!(
                    "Supervision of '{}' ended: {:?} after {} restart(s)",
                    self.settings.spec.name, ended, restarts
                );
                self.emit(SupervisorEvent::Terminated {
                    outcome: *ended,
                    restarts,
                });
            }
            Err(e) => error!("Supervision of '{}' failed: {}", self.settings.spec.name, e),
        }

        outcome
    }

    async fn supervise(
        &mut self,
        capture: &LogCapture,
        pid_file: Option<&PidFile>,
    ) -> Result<Outcome> {
        let name = self.settings.spec.name.clone();

        loop {
            if self.cancel.is_cancelled() {
                return Ok(Outcome::Stopped);
            }

            self.state.mark_starting();

            let cause = match spawn_process(&self.settings.spec).await {
                Ok(spawned) => {
                    let mut child = spawned.child;
                    let pid = spawned.pid;

                    if let Err(e) = capture.attach(&mut child) {
                        warn!("Output of '{}' will not be captured: {}", name, e);
                    }
                    if let Some(pid_file) = pid_file {
                        if let Err(e) = pid_file.write(pid) {
                            warn!("Failed to write pid file {}: {}", pid_file.path().display(), e);
                        }
                    }

                    self.state.mark_running(pid);
                    info!("Process '{}' started (PID: {})", name, pid);
                    self.emit(SupervisorEvent::Spawned { pid });

                    match self.watch(&mut child, pid).await {
                        RunEnd::StopRequested => {
                            info!("Stop requested for '{}'", name);
                            self.stop_child(&mut child, pid).await?;
                            return Ok(Outcome::Stopped);
                        }
                        RunEnd::RestartRequested => {
                            info!("Restarting '{}' on operator request", name);
                            self.stop_child(&mut child, pid).await?;
                            self.state.total_restarts += 1;
                            self.emit(SupervisorEvent::RestartScheduled {
                                attempt: 0,
                                delay: Duration::ZERO,
                                cause: RestartCause::Manual,
                            });
                            continue;
                        }
                        RunEnd::MemoryLimit => {
                            self.stop_child(&mut child, pid).await?;
                            RestartCause::MemoryLimit
                        }
                        RunEnd::Exited(status) => {
                            let code = self.report_exit(status);
                            if !self.settings.restart.enabled {
                                info!("Autorestart disabled, not restarting '{}'", name);
                                return Ok(Outcome::ChildExited { code });
                            }
                            RestartCause::Crash
                        }
                    }
                }
                Err(e) => {
                    error!("{}", e);
                    self.emit(SupervisorEvent::SpawnFailed {
                        reason: e.to_string(),
                    });
                    if !self.settings.restart.enabled {
                        return Err(e);
                    }
                    RestartCause::SpawnFailure
                }
            };

            self.state.mark_crashed();

            let decision = self.state.restarts.on_crash(
                &self.settings.restart,
                Instant::now(),
                self.state.uptime(),
            );

            match decision {
                RestartDecision::Restart { attempt, delay } => {
                    info!(
                        "Restarting '{}' in {:?} (attempt {}, reason: {})",
                        name, delay, attempt, cause
                    );
                    self.emit(SupervisorEvent::RestartScheduled {
                        attempt,
                        delay,
                        cause,
                    });

                    if !self.backoff(delay).await {
                        info!("Stop requested for '{}' during backoff", name);
                        return Ok(Outcome::Stopped);
                    }
                    self.state.total_restarts += 1;
                }
                RestartDecision::Exhausted { restarts } => {
                    let exhausted = VigilError::RestartBudgetExhausted {
                        name: name.clone(),
                        restarts,
                        window_secs: self.settings.restart.window.as_secs(),
                    };
                    error!("{}", exhausted);
                    self.emit(SupervisorEvent::RestartBudgetExhausted { restarts });
                    return Ok(Outcome::BudgetExhausted { restarts });
                }
            }
        }
    }

    /// Wait for the running child to exit, breach its limits or be told to stop
    async fn watch(&mut self, child: &mut Child, pid: u32) -> RunEnd {
        let stable = tokio::time::sleep(self.settings.restart.min_uptime);
        tokio::pin!(stable);
        let mut stable_reached = false;

        let watch_memory = self.settings.limits.watches_memory();
        let mut memory_tick = tokio::time::interval(self.settings.limits.check_interval);
        memory_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => WatchEvent::Stop,
                Some(command) = self.commands_rx.recv() => WatchEvent::Command(command),
                status = child.wait() => WatchEvent::Exited(status.ok()),
                _ = &mut stable, if !stable_reached => WatchEvent::Stable,
                _ = memory_tick.tick(), if watch_memory => WatchEvent::SampleMemory,
            };

            match event {
                WatchEvent::Stop => return RunEnd::StopRequested,
                WatchEvent::Command(SupervisorCommand::Restart) => return RunEnd::RestartRequested,
                WatchEvent::Exited(status) => return RunEnd::Exited(status),
                WatchEvent::Stable => {
                    stable_reached = true;
                    self.state.restarts.mark_stable();
                    debug!(
                        "Process '{}' is stable after {:?}, restart counter reset",
                        self.settings.spec.name,
                        self.state.uptime()
                    );
                    self.emit(SupervisorEvent::Stable);
                }
                WatchEvent::SampleMemory => {
                    let Some(sample) = self.sampler.sample(pid) else {
                        continue;
                    };
                    self.state.last_memory = Some(sample);

                    if let Some(limit) = self.settings.limits.memory_breach(sample) {
                        let breach = VigilError::MemoryLimitExceeded {
                            name: self.settings.spec.name.clone(),
                            sample,
                            limit,
                        };
                        warn!("{}, forcing restart", breach);
                        self.emit(SupervisorEvent::MemoryLimitExceeded { sample, limit });
                        return RunEnd::MemoryLimit;
                    }
                }
            }
        }
    }

    /// Sleep out a backoff delay. Returns false if a stop arrived first.
    async fn backoff(&mut self, delay: Duration) -> bool {
        if delay.is_zero() {
            return !self.cancel.is_cancelled();
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            Some(SupervisorCommand::Restart) = self.commands_rx.recv() => true,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn stop_child(&mut self, child: &mut Child, pid: u32) -> Result<()> {
        self.state.mark_stopping();

        let report = shutdown::terminate(
            child,
            pid,
            &self.settings.spec.name,
            &self.settings.shutdown,
        )
        .await?;

        if report.forced {
            self.emit(SupervisorEvent::ShutdownEscalated { pid });
        }
        Ok(())
    }

    fn report_exit(&mut self, status: Option<ExitStatus>) -> Option<i32> {
        let name = &self.settings.spec.name;
        let code = status.and_then(|s| s.code());
        let signal = status.and_then(|s| s.signal());

        match (code, signal) {
            (Some(0), _) => info!("Process '{}' exited with code 0", name),
            (Some(code), _) => warn!(
                "{}",
                VigilError::UnexpectedExit(name.clone(), format!("exit code {}", code))
            ),
            (None, Some(signal)) => warn!(
                "{}",
                VigilError::UnexpectedExit(name.clone(), format!("killed by signal {}", signal))
            ),
            (None, None) => warn!(
                "{}",
                VigilError::UnexpectedExit(name.clone(), "unknown status".to_string())
            ),
        }

        let last_memory = self.state.last_memory;
        if let Some(rss) = last_memory {
            debug!("Last memory sample of '{}' was {} bytes", name, rss);
        }

        self.emit(SupervisorEvent::Exited {
            code,
            signal,
            last_memory,
        });
        code
    }

    fn emit(&self, event: SupervisorEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
