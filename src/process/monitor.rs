use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Source of resident-memory samples for a PID
pub trait MemorySampler: Send {
    /// Resident memory of `pid` in bytes, `None` if the process is gone
    fn sample(&mut self, pid: u32) -> Option<u64>;
}

/// Memory sampler backed by `sysinfo`
pub struct SysinfoSampler {
    system: System,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler for SysinfoSampler {
    fn sample(&mut self, pid: u32) -> Option<u64> {
        let sys_pid = Pid::from_u32(pid);

        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            ProcessRefreshKind::new().with_memory(),
        );

        self.system.process(sys_pid).map(|process| process.memory())
    }
}
