// src/checkpoint.rs
//
// =============================================================================
// MATENSEMBLE: RESTART SNAPSHOT
// =============================================================================
//
// The durable record a crashed or preempted run resumes from: the four task
// buckets, serialized whole-file with `bincode` inside a small versioned
// envelope and written atomically (temp file + rename), the same durability
// pattern the status file uses.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ManagerError;
use crate::fluxlet::JobSpec;
use crate::task::{PendingTask, TaskId};

const ENVELOPE_VERSION: u32 = 1;

/// The four task buckets, restart-durable.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskLog {
    pub completed: Vec<TaskId>,
    pub running: Vec<TaskId>,
    pub pending: Vec<PendingTask>,
    pub failed: Vec<(TaskId, JobSpec)>,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u32,
    log: TaskLog,
}

/// Writes `log` to `dir/restart_<N>.dat` where `N = log.completed.len()`,
/// atomically. Returns the path written.
pub fn create_restart_file(dir: &Path, log: &TaskLog) -> Result<PathBuf, ManagerError> {
    let path = dir.join(format!("restart_{}.dat", log.completed.len()));
    let tmp = dir.join(format!("restart_{}.dat.tmp", log.completed.len()));

    let envelope = Envelope {
        version: ENVELOPE_VERSION,
        log: log.clone(),
    };
    let bytes = bincode::serialize(&envelope)
        .map_err(|e| ManagerError::Cluster(anyhow::anyhow!("serializing restart snapshot: {e}")))?;

    fs::write(&tmp, bytes).map_err(ManagerError::WrapperFailure)?;
    fs::rename(&tmp, &path).map_err(ManagerError::WrapperFailure)?;

    Ok(path)
}

/// Loads a restart snapshot. Any task found in `running` is moved to the
/// front of `pending`, since the futures backing those tasks cannot possibly
/// still exist across a process restart, a bug the original Python
/// implementation's own comments flag and leave unfixed.
pub fn load_restart(path: &Path) -> Result<TaskLog, ManagerError> {
    if !path.is_file() {
        return Err(ManagerError::RestartLoadFailure(format!(
            "{} does not exist",
            path.display()
        )));
    }

    let bytes = fs::read(path).map_err(ManagerError::WrapperFailure)?;
    let envelope: Envelope = bincode::deserialize(&bytes).map_err(|e| {
        log::warn!("failed to parse restart file {}: {e}", path.display());
        ManagerError::RestartLoadFailure(e.to_string())
    })?;

    let mut log = envelope.log;
    if !log.running.is_empty() {
        log::warn!(
            "restart file lists {} task(s) as running; moving them back to pending",
            log.running.len()
        );
        let mut stranded: Vec<PendingTask> = log
            .running
            .drain(..)
            .map(|id| PendingTask {
                id,
                args: crate::task::TaskArg::Null,
                dir: None,
                tasks_per_job: 1,
            })
            .collect();
        stranded.append(&mut log.pending);
        log.pending = stranded;
    }

    Ok(log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskArg;

    #[test]
    fn round_trips_through_bincode() {
        let dir = tempfile::tempdir().unwrap();
        let log = TaskLog {
            completed: vec![TaskId::new("a"), TaskId::new("b")],
            running: Vec::new(),
            pending: vec![PendingTask {
                id: TaskId::new("c"),
                args: TaskArg::Scalar(crate::task::ArgScalar::Int(3)),
                dir: None,
                tasks_per_job: 1,
            }],
            failed: Vec::new(),
        };

        let path = create_restart_file(dir.path(), &log).unwrap();
        let loaded = load_restart(&path).unwrap();

        assert_eq!(loaded.completed, log.completed);
        assert_eq!(loaded.pending.len(), 1);
    }

    #[test]
    fn moves_running_tasks_to_pending_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let log = TaskLog {
            completed: vec![],
            running: vec![TaskId::new("stranded")],
            pending: vec![],
            failed: vec![],
        };

        let path = create_restart_file(dir.path(), &log).unwrap();
        let loaded = load_restart(&path).unwrap();

        assert!(loaded.running.is_empty());
        assert_eq!(loaded.pending.len(), 1);
        assert_eq!(loaded.pending[0].id, TaskId::new("stranded"));
    }

    #[test]
    fn rejects_missing_file() {
        let missing = Path::new("/nonexistent/restart_0.dat");
        assert!(matches!(load_restart(missing), Err(ManagerError::RestartLoadFailure(_))));
    }
}
