// CLI module - User-facing command-line interface

mod output;

use crate::config::{Config, DEFAULT_SOCKET_PATH};
use crate::error::{Error, Result};
use crate::history::HistoryLog;
use crate::ipc::{Command, ControlHandler, IpcClient, IpcServer, ResponseData};
use crate::process::{SpecStore, Supervisor};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Default configuration file, relative to the working directory
const DEFAULT_CONFIG_PATH: &str = "supervisor.toml";

/// Exit code when any process fails to launch (or a control command fails)
const EXIT_FAILURE: u8 = 1;

/// Exit code for configuration errors
const EXIT_CONFIG_ERROR: u8 = 2;

/// Supervisor - launches, monitors, and restarts a fixed set of processes
#[derive(Parser)]
#[command(name = "supervisor")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (.toml or .json)
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Control socket path (overrides the config file)
    #[arg(short, long, global = true)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start every enabled process and supervise until interrupted
    Start {
        /// Append one line per process exit to this file
        #[arg(long)]
        history_log: Option<PathBuf>,
    },

    /// Stop a supervised process
    Stop {
        /// Process name
        name: String,
    },

    /// Show process status
    Status {
        /// Process name (all processes when omitted)
        name: Option<String>,
    },

    /// Validate a configuration file without starting anything
    Check,
}

impl Cli {
    /// Run the CLI application
    pub async fn run() -> ExitCode {
        let cli = Cli::parse();

        match cli.execute().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(Error::Aggregate(failures)) => {
                output::print_launch_failures(&failures);
                ExitCode::from(EXIT_FAILURE)
            }
            Err(e) => {
                output::print_error(&e.to_string());
                ExitCode::from(exit_code(&e))
            }
        }
    }

    async fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Start { history_log } => {
                self.start(&self.config, history_log.as_deref()).await
            }

            Commands::Stop { name } => {
                let spinner = output::create_spinner(&format!("Stopping {}...", name));
                let result = self
                    .send(Command::Stop { name: name.clone() })
                    .await;
                spinner.finish_and_clear();
                output::print_success(&result?);
                Ok(())
            }

            Commands::Status { name } => {
                let data = self.send(Command::Status { name: name.clone() }).await?;
                output::print_success(&data);
                Ok(())
            }

            Commands::Check => {
                let (_, store) = load_config(&self.config)?;
                output::print_info(&format!(
                    "Configuration OK: {} process(es) ({} enabled)",
                    store.len(),
                    store.iter().filter(|s| s.enabled).count()
                ));
                Ok(())
            }
        }
    }

    /// Run the supervisor in the foreground until SIGINT or SIGTERM
    async fn start(&self, config_path: &Path, history_override: Option<&Path>) -> Result<()> {
        let (config, store) = load_config(config_path)?;

        let history_log = match history_override
            .map(Path::to_path_buf)
            .or(config.supervisor.history_log.clone())
        {
            Some(path) => Some(HistoryLog::open(&path).await?),
            None => None,
        };

        let socket_path = self
            .socket
            .clone()
            .unwrap_or_else(|| config.supervisor.socket_path());

        let enabled = store.iter().filter(|s| s.enabled).count();
        let supervisor = Supervisor::with_history_log(store, history_log);

        let mut server = IpcServer::with_socket_path(&socket_path);
        server.start()?;
        tracing::info!(socket = %socket_path.display(), "Control socket listening");

        let launch_failures = supervisor.start_all().await.err();

        if launch_failures
            .as_ref()
            .is_some_and(|failures| failures.failures.len() == enabled)
        {
            tracing::error!("No process could be launched");
            supervisor.shutdown().await;
            server.stop()?;
            return launch_failures.map_or(Ok(()), |failures| Err(Error::Aggregate(failures)));
        }

        let handler = ControlHandler::new(supervisor.clone());
        tokio::select! {
            result = server.run(move |command| {
                let handler = handler.clone();
                async move { handler.handle(command).await }
            }) => result?,
            result = shutdown_signal() => {
                result?;
                tracing::info!("Shutdown signal received");
            }
        }

        supervisor.shutdown().await;
        server.stop()?;
        tracing::info!("Supervisor shutdown complete");

        match launch_failures {
            Some(failures) => Err(Error::Aggregate(failures)),
            None => Ok(()),
        }
    }

    /// Send one command to the running supervisor
    async fn send(&self, command: Command) -> Result<ResponseData> {
        let socket_path = client_socket_path(self.socket.as_deref(), &self.config)?;
        let client = IpcClient::with_socket_path(socket_path);

        let response = client.send_command(command).await?;
        response.result.map_err(Error::Remote)
    }
}

/// Load and validate the config file
fn load_config(path: &Path) -> Result<(Config, SpecStore)> {
    let mut config = Config::from_file(path)?;
    let specs = std::mem::take(&mut config.specs);
    let store = SpecStore::load(specs)?;
    Ok((config, store))
}

/// Socket a client command connects to: `--socket`, else the config
/// file's `socket_path` when the file exists, else the default
fn client_socket_path(explicit: Option<&Path>, config_path: &Path) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    if config_path.exists() {
        let config = Config::from_file(config_path)?;
        return Ok(config.supervisor.socket_path());
    }

    Ok(PathBuf::from(DEFAULT_SOCKET_PATH))
}

fn exit_code(error: &Error) -> u8 {
    match error {
        Error::Config(_) => EXIT_CONFIG_ERROR,
        _ => EXIT_FAILURE,
    }
}

async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = sigterm.recv() => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AggregateError, ConfigError};

    #[test]
    fn test_config_errors_exit_with_two() {
        let err = Error::Config(ConfigError::invalid("name", "duplicate"));
        assert_eq!(exit_code(&err), EXIT_CONFIG_ERROR);
    }

    #[test]
    fn test_other_errors_exit_with_one() {
        assert_eq!(exit_code(&Error::Remote("nope".to_string())), EXIT_FAILURE);
        assert_eq!(
            exit_code(&Error::Aggregate(AggregateError::default())),
            EXIT_FAILURE
        );
    }

    #[test]
    fn test_parse_commands() {
        let cli = Cli::try_parse_from(["supervisor", "status"]).unwrap();
        assert!(matches!(cli.command, Commands::Status { name: None }));

        let cli = Cli::try_parse_from(["supervisor", "stop", "bicisi-bot"]).unwrap();
        assert!(matches!(cli.command, Commands::Stop { ref name } if name == "bicisi-bot"));

        let cli = Cli::try_parse_from(["supervisor", "start", "-c", "apps.json", "-s", "/tmp/x.sock"])
            .unwrap();
        assert_eq!(cli.socket, Some(PathBuf::from("/tmp/x.sock")));
        assert_eq!(cli.config, PathBuf::from("apps.json"));
        match cli.command {
            Commands::Start { history_log } => assert!(history_log.is_none()),
            _ => panic!("expected start"),
        }

        let cli = Cli::try_parse_from(["supervisor", "status", "-c", "prod.toml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("prod.toml"));
        assert!(cli.socket.is_none());
    }

    #[test]
    fn test_client_socket_path_resolution() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("supervisor.toml");
        std::fs::write(
            &path,
            r#"
            [supervisor]
            socket_path = "/tmp/keeper-custom.sock"

            [[apps]]
            name = "web"
            script = "/bin/true"
            "#,
        )
        .unwrap();

        // The config file's socket wins over the default.
        assert_eq!(
            client_socket_path(None, &path).unwrap(),
            PathBuf::from("/tmp/keeper-custom.sock")
        );

        // An explicit --socket wins over the config file.
        assert_eq!(
            client_socket_path(Some(Path::new("/tmp/flag.sock")), &path).unwrap(),
            PathBuf::from("/tmp/flag.sock")
        );

        // No config file: fall back to the default.
        assert_eq!(
            client_socket_path(None, &dir.path().join("missing.toml")).unwrap(),
            PathBuf::from(DEFAULT_SOCKET_PATH)
        );
    }

    #[test]
    fn test_client_socket_path_without_supervisor_table() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("supervisor.toml");
        std::fs::write(
            &path,
            r#"
            [[apps]]
            name = "web"
            script = "/bin/true"
            "#,
        )
        .unwrap();

        assert_eq!(
            client_socket_path(None, &path).unwrap(),
            PathBuf::from(DEFAULT_SOCKET_PATH)
        );
    }

    #[test]
    fn test_check_requires_valid_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("supervisor.toml");
        std::fs::write(
            &path,
            r#"
            [[apps]]
            name = "web"
            script = "/bin/true"

            [[apps]]
            name = "web"
            script = "/bin/true"
            "#,
        )
        .unwrap();

        let err = load_config(&path).unwrap_err();
        assert_eq!(exit_code(&err), EXIT_CONFIG_ERROR);
    }
}
