use crate::config::StopSignal;
use crate::process::restart::RestartPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tokio::process::Child;

/// Immutable description of how to launch one supervised process
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSpec {
    /// Unique identifier
    pub name: String,
    /// Executable to run (the interpreter, when one is configured)
    pub command: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Overrides for the inherited environment
    pub env: HashMap<String, String>,
    pub auto_restart: bool,
    /// Disabled specs are loaded but never launched by `start_all`
    pub enabled: bool,
    pub stop_signal: StopSignal,
    /// Grace period between the stop signal and SIGKILL
    pub stop_timeout: Duration,
    pub restart: RestartPolicy,
}

impl ProcessSpec {
    /// Build a spec with default lifecycle settings
    pub fn new(name: impl Into<String>, command: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            cwd: PathBuf::from("."),
            env: HashMap::new(),
            auto_restart: true,
            enabled: true,
            stop_signal: StopSignal::default(),
            stop_timeout: Duration::from_secs(10),
            restart: RestartPolicy::default(),
        }
    }
}

/// Externally visible state of a supervised process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    Idle,
    Starting,
    Running,
    Exited(ExitStatus),
    /// Waiting on a backoff timer before relaunching
    Restarting { delay_ms: u64 },
    /// Needs manual intervention
    Failed(String),
    /// Stop signal sent, waiting out the grace period
    Stopping,
    Stopped,
}

impl ProcessState {
    pub fn is_live(&self) -> bool {
        matches!(self, ProcessState::Starting | ProcessState::Running)
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessState::Idle => write!(f, "idle"),
            ProcessState::Starting => write!(f, "starting"),
            ProcessState::Running => write!(f, "running"),
            ProcessState::Exited(status) => write!(f, "exited ({})", status),
            ProcessState::Restarting { delay_ms } => write!(f, "restarting in {}ms", delay_ms),
            ProcessState::Failed(reason) => write!(f, "failed: {}", reason),
            ProcessState::Stopping => write!(f, "stopping"),
            ProcessState::Stopped => write!(f, "stopped"),
        }
    }
}

/// How a process terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitStatus {
    Code(i32),
    Signal(i32),
    /// The wait itself failed, so the outcome is not known
    Unknown,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Code(0))
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ExitStatus::Code(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitStatus::Signal(signal);
            }
        }

        ExitStatus::Unknown
    }
}

impl std::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitStatus::Code(code) => write!(f, "code {}", code),
            ExitStatus::Signal(signal) => write!(f, "signal {}", signal),
            ExitStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Terminal notification for one process handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitEvent {
    pub name: String,
    pub pid: u32,
    pub started_at: SystemTime,
    pub status: ExitStatus,
    pub timestamp: SystemTime,
}

impl ExitEvent {
    /// How long the process ran before exiting
    pub fn run_duration(&self) -> Duration {
        self.timestamp
            .duration_since(self.started_at)
            .unwrap_or(Duration::from_secs(0))
    }
}

/// Live reference to a running OS process instance of a spec.
///
/// The spec is referenced by name; the store owns it.
#[derive(Debug)]
pub struct ProcessHandle {
    name: String,
    pid: u32,
    started_at: SystemTime,
    pub(crate) child: Option<Child>,
}

impl ProcessHandle {
    pub(crate) fn new(name: String, pid: u32, child: Child) -> Self {
        Self {
            name,
            pid,
            started_at: SystemTime::now(),
            child: Some(child),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    pub fn uptime(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.started_at)
            .unwrap_or(Duration::from_secs(0))
    }

    /// Whether a monitor has already taken ownership of the child
    pub fn is_watched(&self) -> bool {
        self.child.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_state_display() {
        assert_eq!(ProcessState::Running.to_string(), "running");
        assert_eq!(
            ProcessState::Exited(ExitStatus::Code(1)).to_string(),
            "exited (code 1)"
        );
        assert_eq!(
            ProcessState::Restarting { delay_ms: 2000 }.to_string(),
            "restarting in 2000ms"
        );
        assert_eq!(
            ProcessState::Failed("too many failures".to_string()).to_string(),
            "failed: too many failures"
        );
    }

    #[test]
    fn test_exit_event_run_duration() {
        let started_at = SystemTime::now();
        let event = ExitEvent {
            name: "bot".to_string(),
            pid: 42,
            started_at,
            status: ExitStatus::Code(1),
            timestamp: started_at + Duration::from_secs(3),
        };
        assert_eq!(event.run_duration(), Duration::from_secs(3));
    }

    #[test]
    fn test_exit_event_clock_skew_is_zero() {
        let timestamp = SystemTime::now();
        let event = ExitEvent {
            name: "bot".to_string(),
            pid: 42,
            started_at: timestamp + Duration::from_secs(5),
            status: ExitStatus::Code(0),
            timestamp,
        };
        assert_eq!(event.run_duration(), Duration::from_secs(0));
    }

    #[test]
    fn test_live_states() {
        assert!(ProcessState::Starting.is_live());
        assert!(ProcessState::Running.is_live());
        assert!(!ProcessState::Stopped.is_live());
        assert!(!ProcessState::Stopping.is_live());
        assert!(!ProcessState::Restarting { delay_ms: 10 }.is_live());
    }
}
