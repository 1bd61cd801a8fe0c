use std::time::{Duration, Instant};

/// Restart policy configuration
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    /// Whether automatic restart after an exit is enabled
    pub enabled: bool,
    /// Delay applied to every restart
    pub base_delay: Duration,
    /// Extra delay added per consecutive restart attempt
    pub backoff_increment: Duration,
    /// Optional ceiling on the computed delay
    pub max_delay: Option<Duration>,
    /// Maximum number of restarts within the time window
    pub max_restarts: u32,
    /// Time window for counting restarts
    pub window: Duration,
    /// Continuous uptime after which the process counts as stable
    pub min_uptime: Duration,
}

impl RestartPolicy {
    /// Create a new restart policy with default values
    pub fn new() -> Self {
        Self {
            enabled: true,
            base_delay: Duration::ZERO,
            backoff_increment: Duration::ZERO,
            max_delay: None,
            max_restarts: 16,
            window: Duration::from_secs(60),
            min_uptime: Duration::from_secs(1),
        }
    }

    /// Delay before restart attempt `attempt` (1-based): `base + attempt * increment`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self
            .base_delay
            .saturating_add(self.backoff_increment.saturating_mul(attempt));

        match self.max_delay {
            Some(ceiling) => delay.min(ceiling),
            None => delay,
        }
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// What the supervisor should do after a crash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Spawn again after `delay`; `attempt` is the consecutive restart number
    Restart { attempt: u32, delay: Duration },
    /// Budget for the current window is spent
    Exhausted { restarts: u32 },
}

/// Tracks consecutive restarts and the window they are counted in
#[derive(Debug, Clone, Default)]
pub struct RestartTracker {
    count: u32,
    window_start: Option<Instant>,
}

impl RestartTracker {
    /// Create a new restart tracker
    pub fn new() -> Self {
        Self {
            count: 0,
            window_start: None,
        }
    }

    /// Consecutive restarts in the current window
    pub fn count(&self) -> u32 {
        self.count
    }

    /// The process ran for at least `min_uptime`: hand it a fresh budget
    pub fn mark_stable(&mut self) {
        self.count = 0;
        self.window_start = None;
    }

    /// Record a crash (or spawn failure) at `now` after `uptime` of running
    pub fn on_crash(
        &mut self,
        policy: &RestartPolicy,
        now: Instant,
        uptime: Duration,
    ) -> RestartDecision {
        if uptime >= policy.min_uptime {
            self.mark_stable();
        }

        match self.window_start {
            Some(start) if now.saturating_duration_since(start) < policy.window => {}
            _ => {
                self.window_start = Some(now);
                self.count = 0;
            }
        }

        if self.count >= policy.max_restarts {
            return RestartDecision::Exhausted {
                restarts: self.count,
            };
        }

        self.count += 1;
        RestartDecision::Restart {
            attempt: self.count,
            delay: policy.delay_for(self.count),
        }
    }
}
