//! Stop signal configuration.

use serde::{Deserialize, Serialize};

/// Signal sent to request graceful termination
#[allow(clippy::upper_case_acronyms)]
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Serialize, Deserialize)]
pub enum StopSignal {
    #[default]
    SIGTERM,
    SIGINT,
    SIGQUIT,
    SIGHUP,
    SIGUSR1,
    SIGUSR2,
}

impl std::fmt::Display for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StopSignal::SIGTERM => "SIGTERM",
            StopSignal::SIGINT => "SIGINT",
            StopSignal::SIGQUIT => "SIGQUIT",
            StopSignal::SIGHUP => "SIGHUP",
            StopSignal::SIGUSR1 => "SIGUSR1",
            StopSignal::SIGUSR2 => "SIGUSR2",
        };
        f.write_str(name)
    }
}

#[cfg(unix)]
impl From<StopSignal> for nix::sys::signal::Signal {
    fn from(signal: StopSignal) -> Self {
        match signal {
            StopSignal::SIGTERM => Self::SIGTERM,
            StopSignal::SIGINT => Self::SIGINT,
            StopSignal::SIGQUIT => Self::SIGQUIT,
            StopSignal::SIGHUP => Self::SIGHUP,
            StopSignal::SIGUSR1 => Self::SIGUSR1,
            StopSignal::SIGUSR2 => Self::SIGUSR2,
        }
    }
}
