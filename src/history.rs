use crate::process::{ExitEvent, ExitStatus};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// One line of the history log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub timestamp: DateTime<Local>,
    pub name: String,
    pub pid: u32,
    pub status: ExitStatus,
    pub run_ms: u64,
    /// The exit was requested through `stop`
    pub manual: bool,
}

impl HistoryRecord {
    pub fn from_event(event: &ExitEvent, manual: bool) -> Self {
        Self {
            timestamp: DateTime::<Local>::from(event.timestamp),
            name: event.name.clone(),
            pid: event.pid,
            status: event.status,
            run_ms: event.run_duration().as_millis() as u64,
            manual,
        }
    }
}

/// Append-only exit history, one JSON object per line
#[derive(Debug)]
pub struct HistoryLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl HistoryLog {
    /// Open (or create) the log in append mode
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, event: &ExitEvent, manual: bool) -> std::io::Result<()> {
        let record = HistoryRecord::from_event(event, manual);
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }

    /// Read back every record in the file
    pub async fn read_all(path: impl AsRef<Path>) -> std::io::Result<Vec<HistoryRecord>> {
        let contents = tokio::fs::read_to_string(path).await?;
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(std::io::Error::from))
            .collect()
    }
}
