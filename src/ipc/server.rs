// IPC Server - Listens on the control socket and dispatches commands

use crate::error::{Error, IpcError};
use crate::ipc::{Command, ProcessInfo, Request, Response, ResponseData};
use crate::process::{ResourceSampler, Supervisor};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;

/// Control socket server
#[derive(Debug)]
pub struct IpcServer {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
}

impl IpcServer {
    pub fn with_socket_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            socket_path: path.as_ref().to_path_buf(),
            listener: None,
        }
    }

    /// Bind the control socket, replacing a stale socket file. Refuses to
    /// start if another supervisor still answers on the path.
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self) -> Result<(), IpcError> {
        if self.socket_path.exists() {
            self.remove_stale_socket()?;
        }

        let listener = UnixListener::bind(&self.socket_path)
            .map_err(|e| IpcError::Socket(format!("Failed to bind to socket: {}", e)))?;

        // Owner-only access
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.socket_path, permissions).map_err(|e| {
                IpcError::Socket(format!("Failed to set socket permissions: {}", e))
            })?;
        }

        self.listener = Some(listener);
        Ok(())
    }

    fn remove_stale_socket(&self) -> Result<(), IpcError> {
        match std::os::unix::net::UnixStream::connect(&self.socket_path) {
            Ok(_) => return Err(IpcError::AlreadyRunning(self.socket_path.clone())),
            Err(e)
                if e.kind() == std::io::ErrorKind::ConnectionRefused
                    || e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(IpcError::Socket(format!(
                    "Failed to probe existing socket: {}",
                    e
                )))
            }
        }

        tracing::debug!(socket = %self.socket_path.display(), "Removing stale control socket");
        std::fs::remove_file(&self.socket_path)
            .map_err(|e| IpcError::Socket(format!("Failed to remove existing socket: {}", e)))
    }

    /// Accept connections until the future is dropped, handling each on
    /// its own task
    pub async fn run<F, Fut>(&self, handler: F) -> Result<(), IpcError>
    where
        F: Fn(Command) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResponseData, Error>> + Send + 'static,
    {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| IpcError::Socket("Server not started".to_string()))?;
        let handler = Arc::new(handler);

        loop {
            let stream = match listener.accept().await {
                Ok((stream, _addr)) => stream,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to accept control connection");
                    continue;
                }
            };

            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, handler.as_ref()).await {
                    tracing::warn!(error = %e, "Control connection failed");
                }
            });
        }
    }

    /// Remove the socket file if this server bound it
    pub fn stop(&mut self) -> Result<(), IpcError> {
        if self.listener.take().is_some() && self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| {
                IpcError::Socket(format!("Failed to remove socket file: {}", e))
            })?;
        }

        Ok(())
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Read one request, run the handler, and write one response
async fn handle_connection<F, Fut>(stream: UnixStream, handler: &F) -> Result<(), IpcError>
where
    F: Fn(Command) -> Fut,
    Fut: Future<Output = Result<ResponseData, Error>>,
{
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut request_line = String::new();
    reader
        .read_line(&mut request_line)
        .await
        .map_err(|e| IpcError::Socket(format!("Failed to read request: {}", e)))?;

    let request: Request = serde_json::from_str(&request_line)
        .map_err(|e| IpcError::Protocol(format!("Failed to deserialize request: {}", e)))?;

    tracing::debug!(request_id = request.id, command = ?request.command, "Control request");

    let response = match handler(request.command).await {
        Ok(data) => Response::success(request.id, data),
        Err(e) => Response::error(request.id, e.to_string()),
    };

    let mut response_json = serde_json::to_string(&response)
        .map_err(|e| IpcError::Protocol(format!("Failed to serialize response: {}", e)))?;
    response_json.push('\n');

    write_half
        .write_all(response_json.as_bytes())
        .await
        .map_err(|e| IpcError::Socket(format!("Failed to write response: {}", e)))?;
    write_half
        .flush()
        .await
        .map_err(|e| IpcError::Socket(format!("Failed to flush stream: {}", e)))?;

    Ok(())
}

/// Executes control commands against a supervisor
#[derive(Clone)]
pub struct ControlHandler {
    supervisor: Supervisor,
    sampler: Arc<Mutex<ResourceSampler>>,
}

impl ControlHandler {
    pub fn new(supervisor: Supervisor) -> Self {
        Self {
            supervisor,
            sampler: Arc::new(Mutex::new(ResourceSampler::new())),
        }
    }

    pub async fn handle(&self, command: Command) -> Result<ResponseData, Error> {
        match command {
            Command::Status { name } => {
                let snapshots = match name {
                    Some(name) => vec![self.supervisor.snapshot_of(&name).await?],
                    None => self.supervisor.snapshot().await,
                };

                let mut sampler = self.sampler.lock().await;
                let processes = snapshots
                    .into_iter()
                    .map(|process| {
                        let usage = process.pid.and_then(|pid| sampler.sample(pid));
                        ProcessInfo {
                            process,
                            cpu_usage: usage.map(|u| u.cpu_usage),
                            memory: usage.map(|u| u.memory),
                        }
                    })
                    .collect();

                Ok(ResponseData::Status(processes))
            }
            Command::Stop { name } => {
                self.supervisor.stop(&name).await?;
                Ok(ResponseData::Stopped { name })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_server_start_stop() {
        let dir = TempDir::new().unwrap();
        let socket_path = dir.path().join("keeper.sock");
        let mut server = IpcServer::with_socket_path(&socket_path);

        assert!(server.start().is_ok());
        assert!(socket_path.exists());

        assert!(server.stop().is_ok());
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn test_server_replaces_stale_socket() {
        let dir = TempDir::new().unwrap();
        let socket_path = dir.path().join("keeper.sock");
        std::fs::write(&socket_path, "stale").unwrap();

        let mut server = IpcServer::with_socket_path(&socket_path);
        assert!(server.start().is_ok());
    }

    #[tokio::test]
    async fn test_server_refuses_live_socket() {
        let dir = TempDir::new().unwrap();
        let socket_path = dir.path().join("keeper.sock");

        let mut first = IpcServer::with_socket_path(&socket_path);
        first.start().unwrap();

        let mut second = IpcServer::with_socket_path(&socket_path);
        let result = second.start();
        assert!(matches!(result, Err(IpcError::AlreadyRunning(path)) if path == socket_path));
        assert!(socket_path.exists());

        // The first server still owns the socket.
        std::os::unix::net::UnixStream::connect(&socket_path).unwrap();

        // Dropping the refused server must not delete the live socket.
        drop(second);
        assert!(socket_path.exists());
    }

    #[tokio::test]
    async fn test_server_replaces_dead_socket() {
        let dir = TempDir::new().unwrap();
        let socket_path = dir.path().join("keeper.sock");

        // Bound once, then abandoned without cleanup.
        let listener = std::os::unix::net::UnixListener::bind(&socket_path).unwrap();
        drop(listener);
        assert!(socket_path.exists());

        let mut server = IpcServer::with_socket_path(&socket_path);
        assert!(server.start().is_ok());
    }

    #[tokio::test]
    async fn test_server_cleanup_on_drop() {
        let dir = TempDir::new().unwrap();
        let socket_path = dir.path().join("keeper.sock");
        {
            let mut server = IpcServer::with_socket_path(&socket_path);
            server.start().unwrap();
            assert!(socket_path.exists());
        }
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn test_run_requires_start() {
        let server = IpcServer::with_socket_path("/tmp/keeper-never-bound.sock");
        let result = server
            .run(|_command| async { Ok(ResponseData::Status(Vec::new())) })
            .await;
        assert!(matches!(result, Err(IpcError::Socket(_))));
    }
}
