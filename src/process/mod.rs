// Process module - Lifecycle of the supervised child

pub mod limits;
pub mod monitor;
pub mod pid;
pub mod restart;
pub mod shutdown;
pub mod spawner;
pub mod supervisor;
mod types;

pub use limits::ResourceLimits;
pub use monitor::{MemorySampler, SysinfoSampler};
pub use restart::{RestartDecision, RestartPolicy, RestartTracker};
pub use shutdown::ShutdownSettings;
pub use spawner::{spawn_process, SpawnedProcess};
pub use supervisor::{
    Outcome, RestartCause, Supervisor, SupervisorEvent, SupervisorHandle, SupervisorSettings,
};
pub use types::{ManagedProcessSpec, ProcessState, RuntimeState};
