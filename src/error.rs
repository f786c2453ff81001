use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating process specifications
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration field '{0}': {1}")]
    Invalid(String, String),

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(String),

    #[error("Unsupported config file format: '{0}'. Use .toml or .json")]
    UnsupportedFormat(String),
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid(field.into(), reason.into())
    }
}

/// Errors raised while spawning an OS process
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Failed to spawn process '{name}': {cause}")]
    SpawnFailed {
        name: String,
        #[source]
        cause: std::io::Error,
    },

    #[error("Process '{0}' exited before its PID could be read")]
    MissingPid(String),

    #[error("Process '{0}' is already being monitored")]
    AlreadyWatched(String),
}

/// Internal restart policy failures. These never escape the policy engine;
/// they are converted into a give-up decision.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("no exit history to evaluate")]
    EmptyHistory,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Process not found: {0}")]
pub struct NotFoundError(pub String);

/// Launch failures collected across a batch start
#[derive(Debug, Default, Error)]
#[error("{} process(es) failed to launch: {}", .failures.len(), summarize(.failures))]
pub struct AggregateError {
    pub failures: Vec<(String, LaunchError)>,
}

impl AggregateError {
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn push(&mut self, name: String, error: LaunchError) {
        self.failures.push((name, error));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|(name, _)| name.as_str())
    }
}

fn summarize(failures: &[(String, LaunchError)]) -> String {
    failures
        .iter()
        .map(|(name, e)| format!("{} ({})", name, e))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Control socket errors
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("Supervisor not running (no control socket at {0})")]
    NotRunning(PathBuf),

    #[error("Another supervisor is already listening on {0}")]
    AlreadyRunning(PathBuf),

    #[error("Failed to connect to supervisor: {0}")]
    Connection(String),

    #[error("Control socket error: {0}")]
    Socket(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Top-level error type for the supervisor
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error(transparent)]
    Ipc(#[from] IpcError),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for supervisor operations
pub type Result<T> = std::result::Result<T, Error>;
