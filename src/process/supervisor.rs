use crate::config::StopSignal;
use crate::error::{AggregateError, LaunchError, NotFoundError};
use crate::history::HistoryLog;
use crate::process::monitor::{self, ExitWatch};
use crate::process::restart::{self, GiveUpReason, RestartDecision};
use crate::process::spawner::launch;
use crate::process::store::SpecStore;
use crate::process::types::{ExitEvent, ProcessHandle, ProcessSpec, ProcessState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// Minimum number of exit events kept per process. Raised per spec so the
/// retained history can always hold a streak one longer than the limit.
const HISTORY_LIMIT: usize = 64;

/// Point-in-time view of one supervised process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub name: String,
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub uptime: Option<Duration>,
    pub restarts: usize,
}

/// Process that is currently alive, together with its exit notification
#[derive(Debug)]
struct Live {
    handle: ProcessHandle,
    exits: ExitWatch,
}

/// Per-name entry in the process table
#[derive(Debug)]
struct Slot {
    state: ProcessState,
    live: Option<Live>,
    history: Vec<ExitEvent>,
    restarts: usize,
    restart_timer: Option<JoinHandle<()>>,
    /// Bumped by `stop`; monitor and timer tasks from an older
    /// generation leave the slot alone.
    generation: u64,
}

impl Slot {
    fn new() -> Self {
        Self {
            state: ProcessState::Idle,
            live: None,
            history: Vec::new(),
            restarts: 0,
            restart_timer: None,
            generation: 0,
        }
    }

    fn record_exit(&mut self, event: ExitEvent, limit: usize) {
        self.history.push(event);
        if self.history.len() > limit {
            let excess = self.history.len() - limit;
            self.history.drain(..excess);
        }
    }
}

/// History needed by `spec`'s policy to see a streak past its threshold
fn history_limit(spec: &ProcessSpec) -> usize {
    HISTORY_LIMIT.max(spec.restart.max_consecutive_failures.saturating_add(1))
}

#[derive(Debug)]
struct Inner {
    store: SpecStore,
    /// Fixed at construction: one slot per spec name
    slots: HashMap<String, Arc<Mutex<Slot>>>,
    history_log: Option<HistoryLog>,
}

/// Launches, monitors, and restarts the processes in a [`SpecStore`].
///
/// All state transitions for a name happen with that name's slot locked,
/// so a manual `stop` and an automatic restart never interleave.
#[derive(Debug, Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    pub fn new(store: SpecStore) -> Self {
        Self::with_history_log(store, None)
    }

    pub fn with_history_log(store: SpecStore, history_log: Option<HistoryLog>) -> Self {
        let slots = store
            .names()
            .map(|name| (name.to_string(), Arc::new(Mutex::new(Slot::new()))))
            .collect();

        Self {
            inner: Arc::new(Inner {
                store,
                slots,
                history_log,
            }),
        }
    }

    pub fn store(&self) -> &SpecStore {
        &self.inner.store
    }

    /// Launch every enabled spec. Failures are collected; the remaining
    /// specs are still launched.
    pub async fn start_all(&self) -> Result<(), AggregateError> {
        let mut failures = AggregateError::default();

        for spec in self.inner.store.iter() {
            if !spec.enabled {
                debug!(process_name = %spec.name, "Skipping disabled process");
                continue;
            }

            let slot_lock = self.slot(&spec.name);
            let mut slot = slot_lock.lock().await;

            if slot.live.is_some()
                || matches!(
                    slot.state,
                    ProcessState::Restarting { .. }
                        | ProcessState::Stopping
                        | ProcessState::Stopped
                )
            {
                debug!(process_name = %spec.name, state = %slot.state, "Process already supervised");
                continue;
            }

            if let Err(e) = self.launch_locked(spec, &mut slot) {
                failures.push(spec.name.clone(), e);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures)
        }
    }

    /// Stop `name`: cancel any pending restart, send the configured stop
    /// signal, and force-kill after the grace period.
    ///
    /// The slot is only locked while detaching the live process, so
    /// `status` keeps answering (as `Stopping`) during the grace period.
    pub async fn stop(&self, name: &str) -> Result<(), NotFoundError> {
        let (spec, slot_lock) = self.lookup(name)?;

        let (live, generation) = {
            let mut slot = slot_lock.lock().await;
            slot.generation += 1;

            if let Some(timer) = slot.restart_timer.take() {
                timer.abort();
                info!(process_name = %name, "Cancelled pending restart");
            }

            let live = slot.live.take();
            slot.state = if live.is_some() {
                ProcessState::Stopping
            } else {
                ProcessState::Stopped
            };
            (live, slot.generation)
        };

        if let Some(live) = live {
            if let Some((event, manual)) = terminate(&spec, live).await {
                self.append_history(&event, manual).await;
            }

            let mut slot = slot_lock.lock().await;
            // Unless a later stop has taken over the slot.
            if slot.generation == generation {
                slot.state = ProcessState::Stopped;
            }
        }

        info!(process_name = %name, "Process stopped");
        Ok(())
    }

    /// Stop every process concurrently
    pub async fn shutdown(&self) {
        let names: Vec<String> = self.inner.store.names().map(String::from).collect();
        info!("Stopping {} process(es)", names.len());

        let mut tasks = JoinSet::new();
        for name in names {
            let supervisor = self.clone();
            tasks.spawn(async move {
                // Names come from the store, so the lookup cannot fail.
                let _ = supervisor.stop(&name).await;
            });
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Stop task failed");
            }
        }
    }

    pub async fn status(&self, name: &str) -> Result<ProcessState, NotFoundError> {
        let (_, slot_lock) = self.lookup(name)?;
        let slot = slot_lock.lock().await;
        Ok(slot.state.clone())
    }

    /// Exit history used by the restart policy, oldest first
    pub async fn history(&self, name: &str) -> Result<Vec<ExitEvent>, NotFoundError> {
        let (_, slot_lock) = self.lookup(name)?;
        let slot = slot_lock.lock().await;
        Ok(slot.history.clone())
    }

    pub async fn snapshot_of(&self, name: &str) -> Result<ProcessSnapshot, NotFoundError> {
        let (_, slot_lock) = self.lookup(name)?;
        let slot = slot_lock.lock().await;

        Ok(ProcessSnapshot {
            name: name.to_string(),
            state: slot.state.clone(),
            pid: slot.live.as_ref().map(|l| l.handle.pid()),
            uptime: slot.live.as_ref().map(|l| l.handle.uptime()),
            restarts: slot.restarts,
        })
    }

    /// Snapshot of every process, in config order
    pub async fn snapshot(&self) -> Vec<ProcessSnapshot> {
        let mut snapshots = Vec::with_capacity(self.inner.store.len());
        for name in self.inner.store.names() {
            if let Ok(snapshot) = self.snapshot_of(name).await {
                snapshots.push(snapshot);
            }
        }
        snapshots
    }

    fn lookup(&self, name: &str) -> Result<(Arc<ProcessSpec>, Arc<Mutex<Slot>>), NotFoundError> {
        let spec = self
            .inner
            .store
            .get(name)
            .ok_or_else(|| NotFoundError(name.to_string()))?;
        Ok((spec, self.slot(name)))
    }

    fn slot(&self, name: &str) -> Arc<Mutex<Slot>> {
        // Every store name has a slot.
        Arc::clone(&self.inner.slots[name])
    }

    /// Launch `spec` into a locked slot and start its monitoring task
    fn launch_locked(&self, spec: &Arc<ProcessSpec>, slot: &mut Slot) -> Result<(), LaunchError> {
        slot.state = ProcessState::Starting;

        let mut handle = match launch(spec) {
            Ok(handle) => handle,
            Err(e) => {
                error!(process_name = %spec.name, error = %e, "Failed to launch process");
                slot.state = ProcessState::Failed(e.to_string());
                return Err(e);
            }
        };

        let Some(exits) = monitor::watch(&mut handle) else {
            let e = LaunchError::AlreadyWatched(spec.name.clone());
            slot.state = ProcessState::Failed(e.to_string());
            return Err(e);
        };

        info!(process_name = %spec.name, pid = handle.pid(), "Process started");

        let watcher = exits.subscribe();
        slot.live = Some(Live { handle, exits });
        slot.state = ProcessState::Running;

        tokio::spawn(
            self.clone()
                .supervise(spec.name.clone(), slot.generation, watcher),
        );

        Ok(())
    }

    /// Monitoring task: waits for the single exit of one handle and
    /// applies the restart policy.
    async fn supervise(self, name: String, generation: u64, mut exits: ExitWatch) {
        let Some(event) = exits.next().await else {
            return;
        };

        let (spec, slot_lock) = match self.lookup(&name) {
            Ok(found) => found,
            Err(_) => return,
        };
        let mut slot = slot_lock.lock().await;

        let current = slot.live.as_ref().map(|l| l.handle.pid());
        if slot.generation != generation || current != Some(event.pid) {
            debug!(process_name = %name, pid = event.pid, "Ignoring exit handled by stop");
            return;
        }

        info!(
            process_name = %name,
            pid = event.pid,
            status = %event.status,
            run_ms = event.run_duration().as_millis() as u64,
            "Process exited"
        );

        slot.live = None;
        slot.state = ProcessState::Exited(event.status);
        self.append_history(&event, false).await;
        slot.record_exit(event, history_limit(&spec));

        match restart::decide(&spec, &slot.history) {
            RestartDecision::RestartNow => {
                info!(process_name = %name, "Restarting process");
                slot.restarts += 1;
                let _ = self.launch_locked(&spec, &mut slot);
            }
            RestartDecision::RestartAfter(delay) => {
                let delay_ms = delay.as_millis() as u64;
                info!(process_name = %name, delay_ms, "Scheduling restart");
                slot.state = ProcessState::Restarting { delay_ms };

                let supervisor = self.clone();
                slot.restart_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    supervisor.relaunch(&name, generation).await;
                }));
            }
            RestartDecision::GiveUp(GiveUpReason::PolicyDisabled) => {
                info!(process_name = %name, "Auto-restart disabled, not restarting");
            }
            RestartDecision::GiveUp(reason) => {
                warn!(process_name = %name, %reason, "Giving up on process");
                slot.state = ProcessState::Failed(reason.to_string());
            }
        }
    }

    /// Timer callback for a delayed restart
    async fn relaunch(&self, name: &str, generation: u64) {
        let Ok((spec, slot_lock)) = self.lookup(name) else {
            return;
        };
        let mut slot = slot_lock.lock().await;

        if slot.generation != generation
            || !matches!(slot.state, ProcessState::Restarting { .. })
        {
            return;
        }

        slot.restart_timer = None;
        slot.restarts += 1;
        let _ = self.launch_locked(&spec, &mut slot);
    }

    async fn append_history(&self, event: &ExitEvent, manual: bool) {
        if let Some(log) = &self.inner.history_log {
            if let Err(e) = log.append(event, manual).await {
                warn!(path = %log.path().display(), error = %e, "Failed to write history log");
            }
        }
    }
}

/// Signal a live process and wait for it to exit, escalating to SIGKILL
/// once the grace period runs out.
///
/// Returns the exit event and whether the exit was caused by the stop.
/// A process that had already exited on its own is reported as not manual.
async fn terminate(spec: &ProcessSpec, live: Live) -> Option<(ExitEvent, bool)> {
    let Live { handle, mut exits } = live;

    if exits.has_exited() {
        return exits.next().await.map(|event| (event, false));
    }

    info!(
        process_name = %spec.name,
        pid = handle.pid(),
        signal = %spec.stop_signal,
        "Gracefully stopping process"
    );
    signal_group(handle.pid(), Some(spec.stop_signal));

    let event = match tokio::time::timeout(spec.stop_timeout, exits.next()).await {
        Ok(event) => event,
        Err(_) => {
            warn!(
                process_name = %spec.name,
                pid = handle.pid(),
                timeout = ?spec.stop_timeout,
                "Process did not exit in time, sending SIGKILL"
            );
            signal_group(handle.pid(), None);
            exits.next().await
        }
    };

    event.map(|event| (event, true))
}

/// Send `signal` (or SIGKILL for `None`) to the process group led by `pid`
#[cfg(unix)]
fn signal_group(pid: u32, signal: Option<StopSignal>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let signal = signal.map(Signal::from).unwrap_or(Signal::SIGKILL);
    if let Err(e) = killpg(Pid::from_raw(pid as i32), signal) {
        // ESRCH just means the group is already gone.
        debug!(pid, %signal, error = %e, "Failed to signal process group");
    }
}

#[cfg(not(unix))]
fn signal_group(pid: u32, _signal: Option<StopSignal>) {
    warn!(pid, "Process signals are not supported on this platform");
}
