// Config module - Loading process specifications from TOML or JSON files

mod interpreter;
mod signal;

pub use interpreter::{InterpreterConfig, Platform, ResolveInterpreter};
pub use signal::StopSignal;

use crate::error::ConfigError;
use crate::process::restart::{BackoffStrategy, RestartPolicy, DEFAULT_MAX_DELAY};
use crate::process::ProcessSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default control socket path
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/keeper.sock";

/// Raw shape of a supervisor config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub supervisor: SupervisorSettings,

    /// Restart defaults applied to every app
    #[serde(default)]
    pub restart: RestartConfig,

    #[serde(default, alias = "processes")]
    pub apps: Vec<AppConfig>,
}

/// Settings for the supervisor itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorSettings {
    /// Control socket path
    #[serde(default)]
    pub socket_path: Option<PathBuf>,

    /// Append-only exit history file
    #[serde(default)]
    pub history_log: Option<PathBuf>,
}

impl SupervisorSettings {
    pub fn socket_path(&self) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Exponential,
    Fixed,
}

/// Restart parameters; unset fields fall back to the enclosing level
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartConfig {
    #[serde(default)]
    pub base_delay_ms: Option<u64>,
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
    #[serde(default)]
    pub max_consecutive_failures: Option<usize>,
    #[serde(default)]
    pub failure_window_secs: Option<u64>,
    #[serde(default)]
    pub healthy_run_secs: Option<u64>,
    #[serde(default)]
    pub backoff: Option<BackoffKind>,
}

impl RestartConfig {
    /// Overlay these settings on top of `base`
    pub fn apply(&self, base: &RestartPolicy) -> RestartPolicy {
        let base_max_delay = match base.backoff {
            BackoffStrategy::Exponential { max_delay } => max_delay,
            BackoffStrategy::Fixed => DEFAULT_MAX_DELAY,
        };
        let max_delay = self
            .max_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(base_max_delay);

        let backoff = match (self.backoff, base.backoff) {
            (Some(BackoffKind::Fixed), _) => BackoffStrategy::Fixed,
            (Some(BackoffKind::Exponential), _) | (None, BackoffStrategy::Exponential { .. }) => {
                BackoffStrategy::Exponential { max_delay }
            }
            (None, BackoffStrategy::Fixed) => BackoffStrategy::Fixed,
        };

        RestartPolicy {
            base_delay: self
                .base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(base.base_delay),
            max_consecutive_failures: self
                .max_consecutive_failures
                .unwrap_or(base.max_consecutive_failures),
            failure_window: self
                .failure_window_secs
                .map(Duration::from_secs)
                .unwrap_or(base.failure_window),
            healthy_run: self
                .healthy_run_secs
                .map(Duration::from_secs)
                .unwrap_or(base.healthy_run),
            backoff,
        }
    }
}

/// One app entry as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Process name (unique identifier)
    pub name: String,

    /// Script or executable to run
    pub script: PathBuf,

    /// Command-line arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory, relative to the config file
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Interpreter used to run the script
    #[serde(default)]
    pub interpreter: Option<InterpreterConfig>,

    /// Environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Whether to automatically restart on exit
    #[serde(default = "default_true")]
    pub autorestart: bool,

    /// Whether `start` launches this app
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Signal to send on stop
    #[serde(default)]
    pub stop_signal: StopSignal,

    /// Grace period before force kill (in seconds)
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,

    /// Per-app restart overrides
    #[serde(default)]
    pub restart: Option<RestartConfig>,
}

fn default_true() -> bool {
    true
}

fn default_stop_timeout() -> u64 {
    10
}

impl AppConfig {
    /// Resolve this entry into a launch specification.
    ///
    /// `base_dir` anchors relative working directories.
    pub fn to_spec(
        &self,
        base_dir: &Path,
        defaults: &RestartPolicy,
        platform: Platform,
    ) -> ProcessSpec {
        let script = expand_env_in_path(&self.script);
        let mut args: Vec<String> = self.args.iter().map(|a| expand_env(a)).collect();

        let command = match self.interpreter.resolve_interpreter(platform) {
            Some(interpreter) => {
                args.insert(0, script.to_string_lossy().into_owned());
                expand_env_in_path(&interpreter)
            }
            None => script,
        };

        let cwd = match &self.cwd {
            Some(cwd) => base_dir.join(expand_env_in_path(cwd)),
            None => base_dir.to_path_buf(),
        };

        let restart = match &self.restart {
            Some(overrides) => overrides.apply(defaults),
            None => defaults.clone(),
        };

        ProcessSpec {
            name: self.name.clone(),
            command,
            args,
            cwd,
            env: self
                .env
                .iter()
                .map(|(k, v)| (k.clone(), expand_env(v)))
                .collect(),
            auto_restart: self.autorestart,
            enabled: self.enabled,
            stop_signal: self.stop_signal,
            stop_timeout: Duration::from_secs(self.stop_timeout_secs),
            restart,
        }
    }
}

/// Loaded configuration: supervisor settings plus unvalidated specs
#[derive(Debug, Clone)]
pub struct Config {
    pub supervisor: SupervisorSettings,
    pub specs: Vec<ProcessSpec>,
}

impl Config {
    /// Load from a file (TOML or JSON, chosen by extension)
    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let base_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        let file = match extension {
            "toml" => parse_toml(&contents)?,
            "json" => parse_json(&contents)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };

        Ok(Self::from_parsed(file, &base_dir, Platform::current()))
    }

    /// Resolve a parsed file into specs
    pub fn from_parsed(file: ConfigFile, base_dir: &Path, platform: Platform) -> Config {
        let defaults = file.restart.apply(&RestartPolicy::default());
        let specs = file
            .apps
            .iter()
            .map(|app| app.to_spec(base_dir, &defaults, platform))
            .collect();

        Config {
            supervisor: file.supervisor,
            specs,
        }
    }
}

pub fn parse_toml(contents: &str) -> Result<ConfigFile, ConfigError> {
    let file: ConfigFile = toml::from_str(contents)
        .map_err(|e| ConfigError::Parse(format!("Failed to parse TOML: {}", e)))?;
    ensure_apps(file)
}

pub fn parse_json(contents: &str) -> Result<ConfigFile, ConfigError> {
    let file: ConfigFile = serde_json::from_str(contents)
        .map_err(|e| ConfigError::Parse(format!("Failed to parse JSON: {}", e)))?;
    ensure_apps(file)
}

fn ensure_apps(file: ConfigFile) -> Result<ConfigFile, ConfigError> {
    if file.apps.is_empty() {
        return Err(ConfigError::invalid(
            "apps",
            "no process configuration found in file",
        ));
    }
    Ok(file)
}

/// Expand `$VAR` and `${VAR}` from the supervisor's environment.
/// Unknown variables are left untouched.
fn expand_env(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        match std::env::var(name) {
            Ok(value) if !name.is_empty() => out.push_str(&value),
            _ => out.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &after[consumed..];
    }

    out.push_str(rest);
    out
}

fn expand_env_in_path(path: &Path) -> PathBuf {
    PathBuf::from(expand_env(&path.to_string_lossy()))
}
