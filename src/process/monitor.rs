use crate::process::types::{ExitEvent, ExitStatus, ProcessHandle};
use std::time::SystemTime;
use tokio::sync::watch;

/// Push-based exit notification for a single process handle.
///
/// Yields exactly one [`ExitEvent`] and then ends. A new handle (after a
/// restart) needs a new watch.
#[derive(Debug)]
pub struct ExitWatch {
    rx: watch::Receiver<Option<ExitEvent>>,
    delivered: bool,
}

impl ExitWatch {
    /// Wait for the exit event. Returns `None` once the event has been
    /// delivered, or if the monitor went away without reporting.
    pub async fn next(&mut self) -> Option<ExitEvent> {
        if self.delivered {
            return None;
        }

        let event = self
            .rx
            .wait_for(|event| event.is_some())
            .await
            .ok()
            .and_then(|event| event.clone());
        self.delivered = true;
        event
    }

    /// Independent subscriber to the same handle's exit
    pub fn subscribe(&self) -> ExitWatch {
        ExitWatch {
            rx: self.rx.clone(),
            delivered: false,
        }
    }

    pub fn has_exited(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

/// Start monitoring `handle`.
///
/// Takes ownership of the child and reaps it on a dedicated task. Returns
/// `None` if the handle is already being watched.
pub fn watch(handle: &mut ProcessHandle) -> Option<ExitWatch> {
    let mut child = handle.child.take()?;
    let (tx, rx) = watch::channel(None);

    let name = handle.name().to_string();
    let pid = handle.pid();
    let started_at = handle.started_at();

    tokio::spawn(async move {
        let status = match child.wait().await {
            Ok(status) => ExitStatus::from(status),
            Err(e) => {
                tracing::warn!(process_name = %name, pid, error = %e, "Failed to wait on process");
                ExitStatus::Unknown
            }
        };

        tracing::debug!(process_name = %name, pid, %status, "Process exited");

        // Nobody listening is fine; the handle may have been discarded.
        let _ = tx.send(Some(ExitEvent {
            name,
            pid,
            started_at,
            status,
            timestamp: SystemTime::now(),
        }));
    });

    Some(ExitWatch { rx, delivered: false })
}
