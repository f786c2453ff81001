// Integration tests for the supervisor lifecycle

use keeper::history::HistoryLog;
use keeper::process::{
    BackoffStrategy, ExitStatus, ProcessSpec, ProcessState, SpecStore, Supervisor,
};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn shell_spec(name: &str, script: &str) -> ProcessSpec {
    let mut spec = ProcessSpec::new(name, "/bin/sh");
    spec.args = vec!["-c".to_string(), script.to_string()];
    spec.cwd = std::env::temp_dir();
    spec.stop_timeout = Duration::from_secs(2);
    spec.restart.base_delay = Duration::from_millis(20);
    spec
}

async fn wait_for_state<F>(supervisor: &Supervisor, name: &str, pred: F) -> ProcessState
where
    F: Fn(&ProcessState) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let state = supervisor.status(name).await.unwrap();
        if pred(&state) || Instant::now() > deadline {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_one_handle_per_enabled_spec() {
    let mut disabled = shell_spec("reports", "sleep 30");
    disabled.enabled = false;
    let store = SpecStore::load(vec![
        shell_spec("bot", "sleep 30"),
        shell_spec("web", "sleep 30"),
        disabled,
    ])
    .unwrap();
    let supervisor = Supervisor::new(store);

    supervisor.start_all().await.unwrap();

    let snapshots = supervisor.snapshot().await;
    let names: Vec<&str> = snapshots.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["bot", "web", "reports"]);

    assert_eq!(snapshots[0].state, ProcessState::Running);
    assert_eq!(snapshots[1].state, ProcessState::Running);
    assert_ne!(snapshots[0].pid, snapshots[1].pid);
    assert_eq!(snapshots[2].state, ProcessState::Idle);
    assert!(snapshots[2].pid.is_none());

    supervisor.shutdown().await;
    assert_eq!(supervisor.status("bot").await.unwrap(), ProcessState::Stopped);
    assert_eq!(supervisor.status("web").await.unwrap(), ProcessState::Stopped);
}

#[tokio::test]
async fn test_launch_failure_does_not_block_others() {
    let broken = ProcessSpec {
        cwd: std::env::temp_dir(),
        ..ProcessSpec::new("broken", "/nonexistent/keeper-binary")
    };
    let store = SpecStore::load(vec![broken, shell_spec("healthy", "sleep 30")]).unwrap();
    let supervisor = Supervisor::new(store);

    let failures = supervisor.start_all().await.unwrap_err();
    assert_eq!(failures.names().collect::<Vec<_>>(), vec!["broken"]);

    assert!(matches!(
        supervisor.status("broken").await.unwrap(),
        ProcessState::Failed(_)
    ));
    assert_eq!(
        supervisor.status("healthy").await.unwrap(),
        ProcessState::Running
    );

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_autorestart_disabled_is_never_relaunched() {
    let mut spec = shell_spec("oneshot", "exit 3");
    spec.auto_restart = false;
    let store = SpecStore::load(vec![spec]).unwrap();
    let supervisor = Supervisor::new(store);

    supervisor.start_all().await.unwrap();
    let state = wait_for_state(&supervisor, "oneshot", |s| {
        matches!(s, ProcessState::Exited(_))
    })
    .await;
    assert_eq!(state, ProcessState::Exited(ExitStatus::Code(3)));

    tokio::time::sleep(Duration::from_millis(300)).await;

    let snapshot = supervisor.snapshot_of("oneshot").await.unwrap();
    assert_eq!(snapshot.state, ProcessState::Exited(ExitStatus::Code(3)));
    assert_eq!(snapshot.restarts, 0);
    assert_eq!(supervisor.history("oneshot").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_crash_loop_gives_up() {
    let mut spec = shell_spec("crashy", "exit 1");
    spec.restart.max_consecutive_failures = 3;
    spec.restart.backoff = BackoffStrategy::Exponential {
        max_delay: Duration::from_secs(1),
    };
    let store = SpecStore::load(vec![spec]).unwrap();
    let supervisor = Supervisor::new(store);

    let started = Instant::now();
    supervisor.start_all().await.unwrap();

    let state = wait_for_state(&supervisor, "crashy", |s| {
        matches!(s, ProcessState::Failed(_))
    })
    .await;

    match state {
        ProcessState::Failed(reason) => assert!(reason.contains("too many failures")),
        other => panic!("expected Failed, got {:?}", other),
    }

    // Backoff of 20ms, 40ms, 80ms between the four runs
    assert!(started.elapsed() >= Duration::from_millis(140));

    let snapshot = supervisor.snapshot_of("crashy").await.unwrap();
    assert_eq!(snapshot.restarts, 3);
    assert!(snapshot.pid.is_none());

    let history = supervisor.history("crashy").await.unwrap();
    assert_eq!(history.len(), 4);
    assert!(history
        .iter()
        .all(|event| event.status == ExitStatus::Code(1)));

    // Failed stays put until someone intervenes.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(matches!(
        supervisor.status("crashy").await.unwrap(),
        ProcessState::Failed(_)
    ));
}

#[tokio::test]
async fn test_stop_during_backoff_prevents_relaunch() {
    let mut spec = shell_spec("flaky", "exit 1");
    spec.restart.base_delay = Duration::from_millis(300);
    let store = SpecStore::load(vec![spec]).unwrap();
    let supervisor = Supervisor::new(store);

    supervisor.start_all().await.unwrap();
    wait_for_state(&supervisor, "flaky", |s| {
        matches!(s, ProcessState::Restarting { .. })
    })
    .await;

    supervisor.stop("flaky").await.unwrap();

    // Outlive the cancelled timer.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let snapshot = supervisor.snapshot_of("flaky").await.unwrap();
    assert_eq!(snapshot.state, ProcessState::Stopped);
    assert_eq!(snapshot.restarts, 0);
    assert!(snapshot.pid.is_none());

    // A stopped process is left alone by a later batch start.
    supervisor.start_all().await.unwrap();
    assert_eq!(
        supervisor.status("flaky").await.unwrap(),
        ProcessState::Stopped
    );
}

#[tokio::test]
async fn test_graceful_stop_is_not_a_failure() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("history.jsonl");
    let log = HistoryLog::open(&log_path).await.unwrap();

    let store = SpecStore::load(vec![shell_spec("server", "exec sleep 30")]).unwrap();
    let supervisor = Supervisor::with_history_log(store, Some(log));

    supervisor.start_all().await.unwrap();
    let pid = supervisor.snapshot_of("server").await.unwrap().pid.unwrap();

    let started = Instant::now();
    supervisor.stop("server").await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    assert_eq!(
        supervisor.status("server").await.unwrap(),
        ProcessState::Stopped
    );
    assert!(supervisor.history("server").await.unwrap().is_empty());

    let records = HistoryLog::read_all(&log_path).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "server");
    assert_eq!(records[0].pid, pid);
    assert_eq!(records[0].status, ExitStatus::Signal(15));
    assert!(records[0].manual);
}

#[tokio::test]
async fn test_stop_escalates_to_sigkill() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("history.jsonl");
    let log = HistoryLog::open(&log_path).await.unwrap();

    let mut spec = shell_spec("stubborn", "trap '' TERM; while true; do sleep 0.1; done");
    spec.stop_timeout = Duration::from_millis(300);
    let store = SpecStore::load(vec![spec]).unwrap();
    let supervisor = Supervisor::with_history_log(store, Some(log));

    supervisor.start_all().await.unwrap();
    // Let the shell install its trap.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    supervisor.stop("stubborn").await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(300));

    assert_eq!(
        supervisor.status("stubborn").await.unwrap(),
        ProcessState::Stopped
    );

    let records = HistoryLog::read_all(&log_path).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ExitStatus::Signal(9));
}

#[tokio::test]
async fn test_crash_exits_are_logged() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("logs").join("history.jsonl");
    let log = HistoryLog::open(&log_path).await.unwrap();

    let mut spec = shell_spec("worker", "exit 7");
    spec.auto_restart = false;
    let store = SpecStore::load(vec![spec]).unwrap();
    let supervisor = Supervisor::with_history_log(store, Some(log));

    supervisor.start_all().await.unwrap();
    wait_for_state(&supervisor, "worker", |s| matches!(s, ProcessState::Exited(_))).await;

    let records = HistoryLog::read_all(&log_path).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ExitStatus::Code(7));
    assert!(!records[0].manual);
}

#[tokio::test]
async fn test_status_answers_while_stopping() {
    let mut spec = shell_spec("slow-exit", "trap '' TERM; while true; do sleep 0.1; done");
    spec.stop_timeout = Duration::from_secs(2);
    let store = SpecStore::load(vec![spec]).unwrap();
    let supervisor = Supervisor::new(store);

    supervisor.start_all().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let stopper = supervisor.clone();
    let stopping = tokio::spawn(async move { stopper.stop("slow-exit").await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let state = tokio::time::timeout(Duration::from_millis(500), supervisor.status("slow-exit"))
        .await
        .expect("status blocked behind stop")
        .unwrap();
    assert_eq!(state, ProcessState::Stopping);

    let snapshots = tokio::time::timeout(Duration::from_millis(500), supervisor.snapshot())
        .await
        .expect("snapshot blocked behind stop");
    assert_eq!(snapshots[0].state, ProcessState::Stopping);

    // Stopping must not be mistaken for an idle slot.
    supervisor.start_all().await.unwrap();

    stopping.await.unwrap().unwrap();
    assert_eq!(
        supervisor.status("slow-exit").await.unwrap(),
        ProcessState::Stopped
    );
    assert!(supervisor.snapshot_of("slow-exit").await.unwrap().pid.is_none());
}
