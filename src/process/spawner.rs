use crate::error::{Result, VigilError};
use crate::process::types::ManagedProcessSpec;
use std::process::Stdio;
use tokio::process::{Child, Command};

/// Metadata returned when spawning a process
#[derive(Debug)]
pub struct SpawnedProcess {
    /// The child process handle
    pub child: Child,

    /// Process ID assigned by the OS
    pub pid: u32,
}

/// Spawn the managed child described by `spec`
///
/// The script runs under its interpreter when one is set. The child gets its
/// own process group so stop signals can reach its descendants, its stdout
/// and stderr are piped for log capture, and it is killed if the handle is
/// dropped so a supervisor never leaks a second instance.
pub async fn spawn_process(spec: &ManagedProcessSpec) -> Result<SpawnedProcess> {
    if !spec.script.exists() {
        return Err(VigilError::SpawnFailure(format!(
            "Script does not exist: {}",
            spec.script.display()
        )));
    }

    let mut command = match spec.interpreter {
        Some(ref interpreter) => {
            let mut command = Command::new(interpreter);
            command.arg(&spec.script);
            command
        }
        None => Command::new(&spec.script),
    };

    command.args(&spec.args);

    if let Some(ref cwd) = spec.cwd {
        command.current_dir(cwd);
    }

    command.envs(&spec.env);

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);

    let child = command.spawn().map_err(|e| {
        VigilError::SpawnFailure(format!("Failed to spawn process '{}': {}", spec.name, e))
    })?;

    let pid = child.id().ok_or_else(|| {
        VigilError::SpawnFailure(format!("Failed to get PID for process '{}'", spec.name))
    })?;

    Ok(SpawnedProcess { child, pid })
}
