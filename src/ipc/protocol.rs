// Control socket protocol: newline-delimited JSON requests and responses

use crate::process::ProcessSnapshot;
use serde::{Deserialize, Serialize};

/// Commands accepted by a running supervisor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Status of one process, or of every process when `name` is empty
    Status { name: Option<String> },
    /// Gracefully stop one process
    Stop { name: String },
}

/// Process information returned in status responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    #[serde(flatten)]
    pub process: ProcessSnapshot,
    pub cpu_usage: Option<f32>,
    pub memory: Option<u64>,
}

/// Response data variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponseData {
    Status(Vec<ProcessInfo>),
    Stopped { name: String },
}

/// Request message from client to supervisor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub command: Command,
}

/// Response message from supervisor to client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub result: Result<ResponseData, String>,
}

impl Request {
    pub fn new(id: u64, command: Command) -> Self {
        Self { id, command }
    }
}

impl Response {
    pub fn success(id: u64, data: ResponseData) -> Self {
        Self {
            id,
            result: Ok(data),
        }
    }

    pub fn error(id: u64, error: String) -> Self {
        Self {
            id,
            result: Err(error),
        }
    }
}
