mod common;

use std::time::Duration;

use procwatch::{
    AnnouncementChannel, ExitOutcome, OutputLog, SpawnError, SupervisorError,
    SupervisorHandleError, WorkerHandle,
};
use tokio::time::{pause, Instant};

use common::{builder, ScriptedLauncher};

#[test]
fn test_empty_pool_is_rejected() {
    let result = builder(0).build(ScriptedLauncher::new(), AnnouncementChannel::sink());
    assert!(matches!(result, Err(SupervisorError::EmptyPool)));
}

#[test]
fn test_privileged_index_must_be_a_worker() {
    for index in [0, 4] {
        let result = builder(3)
            .with_privileged_index(index)
            .build(ScriptedLauncher::new(), AnnouncementChannel::sink());
        assert!(matches!(
            result,
            Err(SupervisorError::InvalidPrivilegedIndex { pool_size: 3, .. })
        ));
    }
}

#[tokio::test]
async fn test_custom_privileged_index() {
    pause();
    let launcher = ScriptedLauncher::new();
    let handle = builder(3)
        .with_privileged_index(2)
        .build(launcher.clone(), AnnouncementChannel::sink())
        .unwrap()
        .run();
    handle.workers().await.unwrap();

    launcher.exit(WorkerHandle::new(1001), ExitOutcome::Stopped);
    handle.workers().await.unwrap();

    let kills: Vec<_> = launcher.kills().iter().map(|h| h.raw()).collect();
    assert_eq!(kills, vec![1000, 1002]);
    assert_eq!(launcher.spawns().len(), 6);
}

#[tokio::test]
async fn test_initial_spawns_are_paced() {
    pause();
    let started = Instant::now();
    let handle = builder(3)
        .with_spawn_pacing(Duration::from_millis(300))
        .build(ScriptedLauncher::new(), AnnouncementChannel::sink())
        .unwrap()
        .run();

    handle.workers().await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(900));
}

#[tokio::test]
async fn test_spawn_failure_during_startup_is_fatal() {
    pause();
    let launcher = ScriptedLauncher::new();
    launcher.fail_next_spawn_of(2);
    let handle = builder(3)
        .build(launcher.clone(), AnnouncementChannel::sink())
        .unwrap()
        .run();

    let result = handle.wait().await;
    assert!(matches!(
        result,
        Err(SupervisorHandleError::Supervisor(SupervisorError::Spawn(
            SpawnError::NoPid { index: 2 }
        )))
    ));
    assert_eq!(launcher.spawns().len(), 1);
}

#[tokio::test]
async fn test_spawn_failure_during_restart_keeps_supervising() {
    pause();
    let launcher = ScriptedLauncher::new();
    let handle = builder(2)
        .build(launcher.clone(), AnnouncementChannel::sink())
        .unwrap()
        .run();
    handle.workers().await.unwrap();

    launcher.fail_next_spawn_of(2);
    launcher.exit(WorkerHandle::new(1001), ExitOutcome::Stopped);

    let workers = handle.workers().await.unwrap();
    assert_eq!(workers.len(), 3);
    assert_eq!(workers[2].1.raw(), 1001);

    // The slot still holds the dead instance, so a later report retries it.
    launcher.exit(WorkerHandle::new(1001), ExitOutcome::Stopped);
    let workers = handle.workers().await.unwrap();
    assert_eq!(workers[2].1.raw(), 1002);
}

#[tokio::test]
async fn test_full_restart_skips_slot_left_by_failed_spawn() {
    pause();
    let launcher = ScriptedLauncher::new();
    let handle = builder(3)
        .build(launcher.clone(), AnnouncementChannel::sink())
        .unwrap()
        .run();
    handle.workers().await.unwrap();

    launcher.fail_next_spawn_of(2);
    launcher.exit(WorkerHandle::new(1001), ExitOutcome::Stopped);
    handle.workers().await.unwrap();

    launcher.exit(WorkerHandle::new(1000), ExitOutcome::Stopped);
    let workers = handle.workers().await.unwrap();

    // 1001 was reaped and never replaced; only 1002 is still running.
    assert_eq!(launcher.terminate_attempts(), vec![WorkerHandle::new(1002)]);
    let pids: Vec<_> = workers.iter().skip(1).map(|(_, h)| h.raw()).collect();
    assert_eq!(pids, vec![1003, 1004, 1005]);
}

#[tokio::test]
async fn test_output_files() {
    pause();
    let dir = tempfile::tempdir().unwrap();
    let supervisor_output = OutputLog::new(dir.path().join("watchdog_output"));
    let worker_output = OutputLog::new(dir.path().join("process_output"));
    worker_output.emit("left over from a previous run").unwrap();

    let launcher = ScriptedLauncher::new();
    let handle = builder(2)
        .with_output(supervisor_output.clone())
        .with_worker_output(worker_output.clone())
        .build(launcher.clone(), AnnouncementChannel::sink())
        .unwrap()
        .run();
    handle.workers().await.unwrap();

    launcher.exit(WorkerHandle::new(1001), ExitOutcome::Stopped);
    handle.workers().await.unwrap();
    launcher.exit(WorkerHandle::new(1000), ExitOutcome::Stopped);
    handle.workers().await.unwrap();

    let lines: Vec<String> = std::fs::read_to_string(supervisor_output.path())
        .unwrap()
        .lines()
        .map(String::from)
        .collect();
    assert_eq!(
        lines,
        vec![
            "P1 is started and it has a pid of 1000",
            "P2 is started and it has a pid of 1001",
            "P2 is killed",
            "Restarting P2",
            "P2 is started and it has a pid of 1002",
            "P1 is killed, all processes must be killed",
            "Restarting all processes",
            "P1 is started and it has a pid of 1003",
            "P2 is started and it has a pid of 1004",
        ]
    );
    assert_eq!(std::fs::read_to_string(worker_output.path()).unwrap(), "");
}

#[tokio::test]
async fn test_shutdown_leaves_workers_alone() {
    pause();
    let launcher = ScriptedLauncher::new();
    let handle = builder(2)
        .build(launcher.clone(), AnnouncementChannel::sink())
        .unwrap()
        .run();
    handle.workers().await.unwrap();

    handle.shutdown().unwrap();
    handle.wait().await.unwrap();
    assert!(launcher.kills().is_empty());
}
