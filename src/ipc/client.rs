// IPC Client - Talks to a running supervisor over its control socket

use crate::error::IpcError;
use crate::ipc::{Command, Request, Response};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Maximum number of connection retry attempts
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Delay between retry attempts
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Control socket client
#[derive(Debug)]
pub struct IpcClient {
    socket_path: PathBuf,
    request_id: AtomicU64,
}

impl IpcClient {
    pub fn with_socket_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            socket_path: path.as_ref().to_path_buf(),
            request_id: AtomicU64::new(1),
        }
    }

    /// Send a command and wait for the response
    pub async fn send_command(&self, command: Command) -> Result<Response, IpcError> {
        let request_id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = Request::new(request_id, command);

        let mut last_error = None;
        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            match self.try_send_request(&request).await {
                Ok(response) => {
                    if response.id != request_id {
                        return Err(IpcError::Protocol(format!(
                            "Response ID mismatch: expected {}, got {}",
                            request_id, response.id
                        )));
                    }
                    return Ok(response);
                }
                // Nobody is listening; retrying will not help.
                Err(e @ IpcError::NotRunning(_)) => return Err(e),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < MAX_RETRY_ATTEMPTS {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            IpcError::Connection("Failed to connect after retries".to_string())
        }))
    }

    async fn try_send_request(&self, request: &Request) -> Result<Response, IpcError> {
        let stream = self.connect().await?;
        let (read_half, mut write_half) = stream.into_split();

        let mut request_json = serde_json::to_string(request)
            .map_err(|e| IpcError::Protocol(format!("Failed to serialize request: {}", e)))?;
        request_json.push('\n');

        write_half
            .write_all(request_json.as_bytes())
            .await
            .map_err(|e| IpcError::Socket(format!("Failed to write request: {}", e)))?;
        write_half
            .flush()
            .await
            .map_err(|e| IpcError::Socket(format!("Failed to flush stream: {}", e)))?;

        let mut reader = BufReader::new(read_half);
        let mut response_line = String::new();
        reader
            .read_line(&mut response_line)
            .await
            .map_err(|e| IpcError::Socket(format!("Failed to read response: {}", e)))?;

        serde_json::from_str(&response_line)
            .map_err(|e| IpcError::Protocol(format!("Failed to deserialize response: {}", e)))
    }

    async fn connect(&self) -> Result<UnixStream, IpcError> {
        if !self.socket_path.exists() {
            return Err(IpcError::NotRunning(self.socket_path.clone()));
        }

        UnixStream::connect(&self.socket_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::ConnectionRefused
                || e.kind() == std::io::ErrorKind::NotFound
            {
                IpcError::NotRunning(self.socket_path.clone())
            } else {
                IpcError::Connection(e.to_string())
            }
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}
