// src/cluster.rs
//
// =============================================================================
// MATENSEMBLE: CLUSTER HANDLE
// =============================================================================
//
// The narrow trait the dispatch core talks to, plus one concrete,
// locally-runnable implementation (`LocalProcessCluster`) so the crate works
// standalone without a real Flux/Slurm cluster. A production deployment
// substitutes its own `ClusterHandle` without touching `manager`/`strategy`/
// `fluxlet`.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sysinfo::System;
use tokio::fs::File;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, Id, JoinSet};

use crate::error::ManagerError;
use crate::fluxlet::{JobSpec, ResourceRequest};
use crate::task::TaskId;

// ============================================================================
// 1. RESOURCE SNAPSHOT
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceSnapshot {
    pub free_cores: usize,
    pub free_gpus: usize,
}

// ============================================================================
// 2. FUTURE ANNOTATION
// ============================================================================

/// Metadata attached to a submitted job, kept in a map keyed by the async
/// task's `tokio::task::Id` rather than bolted onto the future itself.
#[derive(Debug, Clone)]
pub struct Submission {
    pub task_id: TaskId,
    pub job_spec: JobSpec,
    pub workdir: PathBuf,
    pub tokio_id: Id,
}

/// What reaping one completed submission yields.
pub struct Reaped {
    pub task_id: TaskId,
    pub job_spec: JobSpec,
    pub workdir: PathBuf,
    pub outcome: ReapOutcome,
}

pub enum ReapOutcome {
    Exited(i32),
    /// The task panicked, was aborted, or the child process could not be spawned.
    WrapperFailure(String),
    /// The task was cancelled (`AbortHandle::abort`); dropped, not failed.
    Cancelled,
}

// ============================================================================
// 3. CLUSTER HANDLE TRAIT
// ============================================================================

#[async_trait]
pub trait ClusterHandle: Send + Sync {
    /// Launches `spec` for `task_id`, returning its future annotation.
    async fn submit(&self, task_id: TaskId, spec: JobSpec) -> Result<Submission, ManagerError>;

    /// Undrains `target` so jobs can land on it again.
    async fn undrain(&self, target: &str) -> Result<(), ManagerError>;

    /// Point-in-time free-resource query.
    async fn check_resources(&self) -> ResourceSnapshot;

    /// Bounded wait for completions; returns whatever reaped within `timeout`,
    /// leaving the remainder in flight.
    async fn reap(&self, timeout: Duration) -> Vec<Reaped>;
}

// ============================================================================
// 4. TOPOLOGY DETECTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterType {
    Local,
    Slurm,
    Pbs,
}

fn detect_cpu_count() -> (ClusterType, usize) {
    if env::var("SLURM_JOB_ID").is_ok() {
        let cores = env::var("SLURM_CPUS_ON_NODE")
            .ok()
            .and_then(|s| s.split(|c: char| !c.is_numeric()).next()?.parse::<usize>().ok())
            .unwrap_or_else(num_cpus::get);
        return (ClusterType::Slurm, cores);
    }
    if env::var("PBS_JOBID").is_ok() {
        let cores = env::var("NCPUS").ok().and_then(|s| s.parse().ok()).unwrap_or_else(num_cpus::get);
        return (ClusterType::Pbs, cores);
    }
    (ClusterType::Local, num_cpus::get())
}

fn detect_gpus() -> usize {
    if let Ok(output) = std::process::Command::new("nvidia-smi")
        .args(["--query-gpu=name", "--format=csv,noheader"])
        .output()
    {
        let count = String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|l| !l.trim().is_empty())
            .count();
        if count > 0 {
            return count;
        }
    }
    0
}

// ============================================================================
// 5. LOCAL PROCESS CLUSTER
// ============================================================================

pub struct LocalProcessCluster {
    pub cluster_type: ClusterType,
    pub hostname: String,
    total_cores: usize,
    total_gpus: usize,
    free_cores: AtomicUsize,
    free_gpus: AtomicUsize,
    inflight: Mutex<JoinSet<Result<i32, String>>>,
    submissions: Mutex<HashMap<Id, Submission>>,
}

impl LocalProcessCluster {
    pub fn detect() -> Self {
        let (cluster_type, cores) = detect_cpu_count();
        let gpus = detect_gpus();
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "localhost".into());

        log::info!(
            "Detected cluster topology on {}: type={:?} cores={} gpus={}",
            hostname,
            cluster_type,
            cores,
            gpus,
        );

        Self {
            cluster_type,
            hostname,
            total_cores: cores,
            total_gpus: gpus,
            free_cores: AtomicUsize::new(cores),
            free_gpus: AtomicUsize::new(gpus),
            inflight: Mutex::new(JoinSet::new()),
            submissions: Mutex::new(HashMap::new()),
        }
    }

    pub fn total_cores(&self) -> usize {
        self.total_cores
    }

    pub fn total_gpus(&self) -> usize {
        self.total_gpus
    }

    fn footprint_cores(spec: &JobSpec) -> usize {
        match spec.resources {
            ResourceRequest::Homogeneous { num_tasks, cores_per_task, .. } => {
                (num_tasks * cores_per_task) as usize
            }
            ResourceRequest::Heterogeneous { ncores, .. } => ncores as usize,
        }
    }

    fn footprint_gpus(spec: &JobSpec) -> usize {
        match spec.resources {
            ResourceRequest::Homogeneous { num_tasks, gpus_per_task, .. } => {
                (num_tasks * gpus_per_task) as usize
            }
            ResourceRequest::Heterogeneous { nnodes, gpus_per_node, .. } => {
                (nnodes * gpus_per_node) as usize
            }
        }
    }

    async fn run_child(spec: JobSpec) -> Result<i32, String> {
        let stdout = File::create(&spec.stdout).await.map_err(|e| e.to_string())?;
        let stderr = File::create(&spec.stderr).await.map_err(|e| e.to_string())?;

        let mut cmd = Command::new(&spec.command[0]);
        cmd.args(&spec.command[1..])
            .current_dir(&spec.cwd)
            .env_clear()
            .envs(&spec.environment)
            .stdout(Stdio::from(stdout.into_std().await))
            .stderr(Stdio::from(stderr.into_std().await));

        if spec.shell_options.mpi {
            cmd.env("FLUX_SHELL_MPI", "pmi2");
        }
        if spec.shell_options.cpu_affinity {
            cmd.env("FLUX_SHELL_CPU_AFFINITY", "per-task");
        }
        if spec.shell_options.gpu_affinity {
            cmd.env("FLUX_SHELL_GPU_AFFINITY", "per-task");
        }

        let status = cmd.status().await.map_err(|e| e.to_string())?;
        Ok(status.code().unwrap_or(-1))
    }
}

#[async_trait]
impl ClusterHandle for LocalProcessCluster {
    async fn submit(&self, task_id: TaskId, spec: JobSpec) -> Result<Submission, ManagerError> {
        let needed_cores = Self::footprint_cores(&spec);
        let needed_gpus = Self::footprint_gpus(&spec);
        self.free_cores.fetch_sub(needed_cores.min(self.free_cores.load(Ordering::SeqCst)), Ordering::SeqCst);
        self.free_gpus.fetch_sub(needed_gpus.min(self.free_gpus.load(Ordering::SeqCst)), Ordering::SeqCst);

        let workdir = spec.cwd.clone();
        let job_spec = spec.clone();

        let mut inflight = self.inflight.lock().await;
        let abort_handle: AbortHandle = inflight.spawn(Self::run_child(spec));
        let tokio_id = abort_handle.id();
        drop(inflight);

        let submission = Submission {
            task_id: task_id.clone(),
            job_spec,
            workdir,
            tokio_id,
        };
        self.submissions.lock().await.insert(tokio_id, submission.clone());

        Ok(submission)
    }

    async fn undrain(&self, target: &str) -> Result<(), ManagerError> {
        log::info!("undraining node {target}");
        Ok(())
    }

    async fn check_resources(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            free_cores: self.free_cores.load(Ordering::SeqCst),
            free_gpus: self.free_gpus.load(Ordering::SeqCst),
        }
    }

    async fn reap(&self, timeout: Duration) -> Vec<Reaped> {
        let mut out = Vec::new();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }

            let mut inflight = self.inflight.lock().await;
            let next = tokio::time::timeout(remaining, inflight.join_next_with_id()).await;
            drop(inflight);

            match next {
                Ok(Some(Ok((id, result)))) => {
                    let submission = self.submissions.lock().await.remove(&id);
                    let Some(submission) = submission else { continue };
                    self.restore_resources(&submission.job_spec);
                    let outcome = match result {
                        Ok(code) => ReapOutcome::Exited(code),
                        Err(msg) => ReapOutcome::WrapperFailure(msg),
                    };
                    out.push(Reaped {
                        task_id: submission.task_id,
                        job_spec: submission.job_spec,
                        workdir: submission.workdir,
                        outcome,
                    });
                }
                Ok(Some(Err(join_err))) => {
                    // We don't have the id on a JoinError from join_next_with_id's Err
                    // arm directly usable; tokio exposes it via join_err.id().
                    let id = join_err.id();
                    let submission = self.submissions.lock().await.remove(&id);
                    let Some(submission) = submission else { continue };
                    self.restore_resources(&submission.job_spec);
                    let outcome = if join_err.is_cancelled() {
                        ReapOutcome::Cancelled
                    } else {
                        ReapOutcome::WrapperFailure(join_err.to_string())
                    };
                    out.push(Reaped {
                        task_id: submission.task_id,
                        job_spec: submission.job_spec,
                        workdir: submission.workdir,
                        outcome,
                    });
                }
                Ok(None) => break,
                Err(_elapsed) => break,
            }
        }

        out
    }
}

impl LocalProcessCluster {
    fn restore_resources(&self, spec: &JobSpec) {
        self.free_cores.fetch_add(Self::footprint_cores(spec), Ordering::SeqCst);
        self.free_gpus.fetch_add(Self::footprint_gpus(spec), Ordering::SeqCst);
    }
}

/// Lightweight memory snapshot, used only for the startup log line.
pub fn total_system_memory_mb() -> u64 {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.total_memory() / 1024 / 1024
}
