// src/manager.rs
//
// =============================================================================
// MATENSEMBLE: POOL EXECUTOR (DISPATCH LOOP)
// =============================================================================
//
// Owns every queue, the in-flight bookkeeping mirror, and the counters;
// composes the submission/processing strategies and drives the loop to
// drain. Runs as a single `async fn` polled by one logical task, all
// cluster-job parallelism lives inside the `ClusterHandle` implementation.

use std::collections::VecDeque;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::checkpoint::{self, TaskLog};
use crate::cluster::ClusterHandle;
use crate::error::ManagerError;
use crate::fluxlet::JobSpec;
use crate::status::{StatusWriter, WorkflowPaths};
use crate::strategy::{
    AdaptiveStrategy, CpuAffineStrategy, GpuAffineStrategy, HeterogeneousStrategy,
    NonAdaptiveStrategy, ProcessingStrategy, SubmissionStrategy,
};
use crate::task::{PendingTask, TaskArg, TaskId, TasksPerJob};

// ============================================================================
// 1. CONFIGURATION
// ============================================================================

pub struct PoolExecutorConfig {
    pub task_list: Vec<TaskId>,
    pub command: String,
    pub write_restart_freq: u32,
    pub tasks_per_job: TasksPerJob,
    pub cores_per_task: u32,
    pub gpus_per_task: u32,
    pub nnodes: Option<u32>,
    pub gpus_per_node: Option<u32>,
    pub restart_filename: Option<PathBuf>,
    pub paths: WorkflowPaths,
}

impl PoolExecutorConfig {
    pub const DEFAULT_WRITE_RESTART_FREQ: u32 = 100;
}

// ============================================================================
// 2. POOL EXECUTOR
// ============================================================================

pub struct PoolExecutor<'c> {
    pub(crate) pending: VecDeque<PendingTask>,
    pub(crate) running: Vec<TaskId>,
    pub(crate) completed: Vec<TaskId>,
    pub(crate) failed: Vec<(TaskId, JobSpec)>,

    pub(crate) command: String,
    pub(crate) cores_per_task: u32,
    pub(crate) gpus_per_task: u32,
    pub(crate) nnodes: Option<u32>,
    pub(crate) gpus_per_node: Option<u32>,

    pub(crate) write_restart_freq: u32,
    restart_dir: PathBuf,
    pub(crate) paths: WorkflowPaths,
    status: StatusWriter,

    submission_strategy: Arc<dyn SubmissionStrategy>,
    processing_strategy: Arc<dyn ProcessingStrategy>,
    adaptive: bool,

    pub(crate) free_cores: usize,
    pub(crate) free_gpus: usize,
    pub(crate) cluster: Option<&'c dyn ClusterHandle>,
}

impl<'c> PoolExecutor<'c> {
    /// Builds the four-bucket queue state, either fresh from `config` or
    /// restored from `config.restart_filename`, and resolves both strategies.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PoolExecutorConfig,
        task_arg_list: Vec<TaskArg>,
        task_dir_list: Option<Vec<PathBuf>>,
        adaptive: bool,
        heterogeneous: bool,
        submission_override: Option<Arc<dyn SubmissionStrategy>>,
        processing_override: Option<Arc<dyn ProcessingStrategy>>,
    ) -> Result<Self, ManagerError> {
        if config.write_restart_freq == 0 {
            return Err(ManagerError::InvalidConfig(
                "write_restart_freq must be a positive integer".into(),
            ));
        }

        let restart_log = match &config.restart_filename {
            Some(path) if path.is_file() => Some(checkpoint::load_restart(path)?),
            _ => None,
        };

        let (pending, completed, running, failed) = match restart_log {
            Some(log) => {
                log::info!("================= WORKFLOW RESTARTING ==================");
                (VecDeque::from(log.pending), log.completed, Vec::new(), log.failed)
            }
            None => {
                if task_arg_list.len() != config.task_list.len() {
                    return Err(ManagerError::InvalidConfig(format!(
                        "task_arg_list length {} does not match task_list length {}",
                        task_arg_list.len(),
                        config.task_list.len()
                    )));
                }
                if let Some(dirs) = &task_dir_list {
                    if dirs.len() != config.task_list.len() {
                        return Err(ManagerError::InvalidConfig(format!(
                            "task_dir_list length {} does not match task_list length {}",
                            dirs.len(),
                            config.task_list.len()
                        )));
                    }
                }

                let mut tasks_per_job = config.tasks_per_job.clone().into_deque(config.task_list.len())?;
                let mut dirs = task_dir_list;

                let mut pending = VecDeque::with_capacity(config.task_list.len());
                for (id, args) in config.task_list.iter().zip(task_arg_list.into_iter()) {
                    let tpj = tasks_per_job.pop_front().ok_or_else(|| {
                        ManagerError::InvalidConfig("tasks_per_job shorter than task_list".into())
                    })?;
                    let dir = match &mut dirs {
                        Some(d) => d.drain(..1).next(),
                        None => None,
                    };
                    pending.push_back(PendingTask {
                        id: id.clone(),
                        args,
                        dir,
                        tasks_per_job: tpj,
                    });
                }

                (pending, Vec::new(), Vec::new(), Vec::new())
            }
        };

        let submission_strategy: Arc<dyn SubmissionStrategy> = match submission_override {
            Some(s) => s,
            None if heterogeneous => Arc::new(HeterogeneousStrategy),
            None if config.gpus_per_task > 0 => Arc::new(GpuAffineStrategy),
            None => Arc::new(CpuAffineStrategy),
        };

        let processing_strategy: Arc<dyn ProcessingStrategy> = match processing_override {
            Some(p) => p,
            None if adaptive => Arc::new(AdaptiveStrategy { heterogeneous }),
            None => Arc::new(NonAdaptiveStrategy),
        };

        let status = StatusWriter::new(config.paths.status_file.clone());
        let restart_dir = env::current_dir().map_err(ManagerError::WrapperFailure)?;

        Ok(Self {
            pending,
            running,
            completed,
            failed,
            command: config.command,
            cores_per_task: config.cores_per_task,
            gpus_per_task: config.gpus_per_task,
            nnodes: config.nnodes,
            gpus_per_node: config.gpus_per_node,
            write_restart_freq: config.write_restart_freq,
            restart_dir,
            paths: config.paths,
            status,
            submission_strategy,
            processing_strategy,
            adaptive,
            free_cores: 0,
            free_gpus: 0,
            cluster: None,
        })
    }

    /// Convenience entry point: builds a `PoolExecutor` and drives it to
    /// completion in one call.
    #[allow(clippy::too_many_arguments)]
    pub async fn run_with(
        config: PoolExecutorConfig,
        task_arg_list: Vec<TaskArg>,
        cluster: &'c dyn ClusterHandle,
        buffer_time: Duration,
        task_dir_list: Option<Vec<PathBuf>>,
        adaptive: bool,
        heterogeneous: bool,
        submission_override: Option<Arc<dyn SubmissionStrategy>>,
        processing_override: Option<Arc<dyn ProcessingStrategy>>,
    ) -> Result<(), ManagerError> {
        let mut exec = Self::new(
            config,
            task_arg_list,
            task_dir_list,
            adaptive,
            heterogeneous,
            submission_override,
            processing_override,
        )?;
        exec.run(cluster, buffer_time).await
    }

    fn is_done(&self) -> bool {
        self.pending.is_empty() && self.running.is_empty()
    }

    /// Drives the loop: probe, report status, submit, process, snapshot,
    /// until both the pending queue and the in-flight set are empty.
    pub async fn run(&mut self, cluster: &'c dyn ClusterHandle, buffer_time: Duration) -> Result<(), ManagerError> {
        self.cluster = Some(cluster);
        cluster.undrain("0").await?;

        let t_start = Instant::now();
        log::info!("=== ENTERING WORKFLOW ENVIRONMENT ===");

        while !self.is_done() {
            let snapshot = cluster.check_resources().await;
            self.free_cores = snapshot.free_cores;
            self.free_gpus = snapshot.free_gpus;

            log::info!(
                "TASKS pending={} running={} completed={} failed={} | RESOURCES free_cores={} free_gpus={}",
                self.pending.len(),
                self.running.len(),
                self.completed.len(),
                self.failed.len(),
                self.free_cores,
                self.free_gpus,
            );
            if let Err(e) = self.status.update(
                self.pending.len(),
                self.running.len(),
                self.completed.len(),
                self.failed.len(),
                self.free_cores,
                self.free_gpus,
            ) {
                log::warn!("failed to update status file: {e}");
            }

            let submission_strategy = Arc::clone(&self.submission_strategy);
            submission_strategy.submit_until_out_of_resources(self, buffer_time).await?;

            let processing_strategy = Arc::clone(&self.processing_strategy);
            processing_strategy.process_futures(self, buffer_time).await;

            // Non-adaptive mode takes its restart snapshot at the outer-loop
            // cadence rather than per-completion (the adaptive strategy
            // already snapshots inside `process_futures` per spec).
            if !self.adaptive && self.completed.len() % self.write_restart_freq as usize == 0 {
                if let Err(e) = self.create_restart_file() {
                    log::warn!("failed to write restart snapshot: {e}");
                }
            }
        }

        log::info!("=== EXITING WORKFLOW ENVIRONMENT ===");
        log::info!("Workflow took {:.4} seconds to run.", t_start.elapsed().as_secs_f64());
        Ok(())
    }

    /// Encodes the current four buckets to `restart_<completed.len()>.dat`.
    pub fn create_restart_file(&self) -> Result<PathBuf, ManagerError> {
        let log = TaskLog {
            completed: self.completed.clone(),
            running: self.running.clone(),
            pending: self.pending.iter().cloned().collect(),
            failed: self.failed.clone(),
        };
        checkpoint::create_restart_file(&self.restart_dir, &log)
    }

    pub fn load_restart(path: &PathBuf) -> Result<TaskLog, ManagerError> {
        checkpoint::load_restart(path)
    }

    pub fn completed(&self) -> &[TaskId] {
        &self.completed
    }

    pub fn failed(&self) -> &[(TaskId, JobSpec)] {
        &self.failed
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn running_len(&self) -> usize {
        self.running.len()
    }
}
