use crate::error::LaunchError;
use crate::process::types::{ProcessHandle, ProcessSpec};
use std::process::Stdio;
use tokio::process::Command;

/// Spawn an OS process for `spec`.
///
/// The child inherits the supervisor's environment with the spec's
/// variables layered on top, and runs in its own process group so that a
/// terminal Ctrl-C reaches only the supervisor. Returns as soon as the OS
/// has created the process; readiness is not checked.
pub fn launch(spec: &ProcessSpec) -> Result<ProcessHandle, LaunchError> {
    let mut command = Command::new(&spec.command);

    command
        .args(&spec.args)
        .current_dir(&spec.cwd)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    #[cfg(unix)]
    command.process_group(0);

    let child = command.spawn().map_err(|cause| LaunchError::SpawnFailed {
        name: spec.name.clone(),
        cause,
    })?;

    let pid = child
        .id()
        .ok_or_else(|| LaunchError::MissingPid(spec.name.clone()))?;

    tracing::debug!(
        process_name = %spec.name,
        pid,
        command = %spec.command.display(),
        "Spawned process"
    );

    Ok(ProcessHandle::new(spec.name.clone(), pid, child))
}
