// tests/restart.rs
//
// Restart round-trip: a snapshot taken mid-run (with tasks left in
// `running`) must come back with those tasks moved to the front of
// `pending` rather than lost, and a `PoolExecutor` built from that snapshot
// must drain to the same total completed set.

use std::time::Duration;

use matensemble::checkpoint::{create_restart_file, TaskLog};
use matensemble::cluster::LocalProcessCluster;
use matensemble::manager::{PoolExecutor, PoolExecutorConfig};
use matensemble::status::WorkflowPaths;
use matensemble::task::{PendingTask, TaskArg, TaskId, TasksPerJob};

#[test]
fn running_tasks_survive_restart_as_pending() {
    let dir = tempfile::tempdir().unwrap();
    let log = TaskLog {
        completed: vec![TaskId::new("done-1")],
        running: vec![TaskId::new("stranded-1"), TaskId::new("stranded-2")],
        pending: vec![PendingTask {
            id: TaskId::new("queued-1"),
            args: TaskArg::Null,
            dir: None,
            tasks_per_job: 1,
        }],
        failed: Vec::new(),
    };

    let path = create_restart_file(dir.path(), &log).unwrap();
    let loaded = PoolExecutor::load_restart(&path).unwrap();

    assert!(loaded.running.is_empty());
    assert_eq!(loaded.pending.len(), 2);
    assert_eq!(loaded.pending[0].id, TaskId::new("stranded-1"));
    assert_eq!(loaded.pending[1].id, TaskId::new("stranded-2"));
    assert_eq!(loaded.completed, vec![TaskId::new("done-1")]);
}

#[tokio::test]
async fn resumed_run_completes_the_merged_pending_set() {
    let root = tempfile::tempdir().unwrap();
    let paths = WorkflowPaths::create(Some(root.path())).unwrap();

    let restart_dir = tempfile::tempdir().unwrap();
    let snapshot = TaskLog {
        completed: vec![TaskId::new("already-done")],
        running: vec![TaskId::new("was-running")],
        pending: vec![PendingTask {
            id: TaskId::new("still-pending"),
            args: TaskArg::Null,
            dir: None,
            tasks_per_job: 1,
        }],
        failed: Vec::new(),
    };
    let restart_file = create_restart_file(restart_dir.path(), &snapshot).unwrap();

    let config = PoolExecutorConfig {
        task_list: Vec::new(),
        command: "/bin/true".to_string(),
        write_restart_freq: PoolExecutorConfig::DEFAULT_WRITE_RESTART_FREQ,
        tasks_per_job: TasksPerJob::Unset,
        cores_per_task: 1,
        gpus_per_task: 0,
        nnodes: None,
        gpus_per_node: None,
        restart_filename: Some(restart_file),
        paths,
    };

    let cluster = LocalProcessCluster::detect();
    let mut exec = PoolExecutor::new(config, Vec::new(), None, true, false, None, None).unwrap();

    // Restoring from a snapshot ignores the (empty) fresh-construction args
    // entirely: both the previously-running and previously-pending tasks
    // must show up pending immediately after construction.
    assert_eq!(exec.pending_len(), 2);
    assert_eq!(exec.completed().len(), 1);

    exec.run(&cluster, Duration::from_millis(10)).await.unwrap();

    assert_eq!(exec.pending_len(), 0);
    assert_eq!(exec.running_len(), 0);
    assert_eq!(exec.completed().len(), 3);
}
