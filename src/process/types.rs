use crate::process::restart::RestartTracker;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Immutable description of the supervised child, loaded once from config
#[derive(Debug, Clone)]
pub struct ManagedProcessSpec {
    /// Process name used in logs and events
    pub name: String,
    /// Entry script (or executable when no interpreter is set)
    pub script: PathBuf,
    /// Interpreter that runs the script, `None` to exec the script directly
    pub interpreter: Option<PathBuf>,
    /// Extra arguments passed after the script
    pub args: Vec<String>,
    /// Working directory of the child
    pub cwd: Option<PathBuf>,
    /// Extra environment variables
    pub env: HashMap<String, String>,
    /// Where to record the current child PID
    pub pid_file: Option<PathBuf>,
}

/// Lifecycle phase of the supervised child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Starting,
    Running,
    Stopping,
    Crashed,
    Terminated,
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessState::Starting => write!(f, "starting"),
            ProcessState::Running => write!(f, "running"),
            ProcessState::Stopping => write!(f, "stopping"),
            ProcessState::Crashed => write!(f, "crashed"),
            ProcessState::Terminated => write!(f, "terminated"),
        }
    }
}

/// Mutable runtime state, owned and mutated only by the supervisor
#[derive(Debug)]
pub struct RuntimeState {
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub started_at: Option<Instant>,
    pub last_memory: Option<u64>,
    pub restarts: RestartTracker,
    /// Restarts of any cause over the supervisor's lifetime
    pub total_restarts: u64,
}

impl RuntimeState {
    pub fn new() -> Self {
        Self {
            state: ProcessState::Starting,
            pid: None,
            started_at: None,
            last_memory: None,
            restarts: RestartTracker::new(),
            total_restarts: 0,
        }
    }

    pub fn mark_starting(&mut self) {
        self.state = ProcessState::Starting;
        self.pid = None;
        self.started_at = None;
        self.last_memory = None;
    }

    pub fn mark_running(&mut self, pid: u32) {
        self.state = ProcessState::Running;
        self.pid = Some(pid);
        self.started_at = Some(Instant::now());
    }

    pub fn mark_stopping(&mut self) {
        self.state = ProcessState::Stopping;
    }

    pub fn mark_crashed(&mut self) {
        self.state = ProcessState::Crashed;
    }

    pub fn mark_terminated(&mut self) {
        self.state = ProcessState::Terminated;
        self.pid = None;
    }

    pub fn uptime(&self) -> Duration {
        self.started_at
            .map(|started| started.elapsed())
            .unwrap_or(Duration::ZERO)
    }
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::new()
    }
}
