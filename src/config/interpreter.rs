//! Per-platform interpreter selection.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Operating system family the supervisor runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Unix,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }
}

/// Capability for picking the interpreter binary on a given platform
pub trait ResolveInterpreter {
    /// Returns `None` when no interpreter applies, in which case the
    /// script is executed directly.
    fn resolve_interpreter(&self, platform: Platform) -> Option<PathBuf>;
}

/// Interpreter as written in the config file: either one path for every
/// platform or a table keyed by platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InterpreterConfig {
    Single(PathBuf),
    PerPlatform {
        #[serde(default)]
        unix: Option<PathBuf>,
        #[serde(default)]
        windows: Option<PathBuf>,
    },
}

impl ResolveInterpreter for InterpreterConfig {
    fn resolve_interpreter(&self, platform: Platform) -> Option<PathBuf> {
        match self {
            InterpreterConfig::Single(path) => Some(path.clone()),
            InterpreterConfig::PerPlatform { unix, windows } => match platform {
                Platform::Unix => unix.clone(),
                Platform::Windows => windows.clone(),
            },
        }
    }
}

impl<T: ResolveInterpreter> ResolveInterpreter for Option<T> {
    fn resolve_interpreter(&self, platform: Platform) -> Option<PathBuf> {
        self.as_ref()
            .and_then(|inner| inner.resolve_interpreter(platform))
    }
}
