use std::time::Duration;

/// Resource limits enforced on the supervised child
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    /// Resident memory in bytes at which the child is restarted
    pub max_memory: Option<u64>,
    /// How often resident memory is sampled
    pub check_interval: Duration,
}

impl ResourceLimits {
    pub fn new(max_memory: Option<u64>, check_interval: Duration) -> Self {
        Self {
            max_memory,
            check_interval,
        }
    }

    /// Whether the memory-watch loop has anything to enforce
    pub fn watches_memory(&self) -> bool {
        self.max_memory.is_some()
    }

    /// Returns the configured ceiling if `sample` reaches it
    pub fn memory_breach(&self, sample: u64) -> Option<u64> {
        self.max_memory.filter(|limit| sample >= *limit)
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::new(None, Duration::from_secs(1))
    }
}
