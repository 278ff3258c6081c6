// src/main.rs
//
// =============================================================================
// MATENSEMBLE: COMMANDER & ENTRY POINT
// =============================================================================
//
// The wiring center: parses a run configuration (a JSON task-list file plus
// resource/strategy flags) and drives `PoolExecutor::run` against a
// locally-runnable cluster handle.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

mod checkpoint;
mod cluster;
mod error;
mod fluxlet;
mod logging;
mod manager;
mod status;
mod strategy;
mod task;

use crate::cluster::LocalProcessCluster;
use crate::logging::WorkflowLogger;
use crate::manager::{PoolExecutor, PoolExecutorConfig};
use crate::status::WorkflowPaths;
use crate::task::{TaskArg, TaskId, TasksPerJob};

// ============================================================================
// 1. CLI DEFINITION
// ============================================================================

#[derive(Parser)]
#[command(
    name = "matensemble",
    version,
    about = "High-throughput task orchestrator for HPC workloads"
)]
struct Cli {
    /// Command template to run for every task (shell-quoted, e.g. "python run.py").
    #[arg(long)]
    command: String,

    /// Path to a JSON file describing the task list: an array of
    /// `{"id": ..., "args": ..., "dir": ...}` objects. Ignored when
    /// `--restart-file` is given.
    #[arg(long, required_unless_present = "restart_file")]
    tasks: Option<PathBuf>,

    /// Directory the workflow's status/log/output tree is created under.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Cores requested per task.
    #[arg(long, default_value_t = 1)]
    cores_per_task: u32,

    /// GPUs requested per task.
    #[arg(long, default_value_t = 0)]
    gpus_per_task: u32,

    /// Uniform tasks-per-job; omit to default to one task per job.
    #[arg(long)]
    tasks_per_job: Option<u32>,

    /// Node count, required for heterogeneous (dynopro) submission.
    #[arg(long)]
    nnodes: Option<u32>,

    /// GPUs per node, required for heterogeneous (dynopro) submission.
    #[arg(long)]
    gpus_per_node: Option<u32>,

    /// Snapshot the task log every N completions.
    #[arg(long, default_value_t = PoolExecutorConfig::DEFAULT_WRITE_RESTART_FREQ)]
    write_restart_freq: u32,

    /// Resume from a previously written restart snapshot instead of `--tasks`.
    #[arg(long)]
    restart_file: Option<PathBuf>,

    /// Submit one more task per completion instead of only on the next
    /// outer-loop pass.
    #[arg(long, default_value_t = true)]
    adaptive: bool,

    /// Use per-resource (dynopro) submission instead of CPU/GPU-affine.
    #[arg(long)]
    heterogeneous: bool,

    /// Milliseconds between submission/reap passes.
    #[arg(long, default_value_t = 500)]
    buffer_time_ms: u64,

    /// Also echo log lines at INFO and above to stderr.
    #[arg(long)]
    console: bool,
}

#[derive(Debug, Deserialize)]
struct TaskEntry {
    id: String,
    #[serde(default)]
    args: TaskArg,
    #[serde(default)]
    dir: Option<PathBuf>,
}

// ============================================================================
// 2. ENTRY POINT
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = WorkflowPaths::create(cli.root.as_deref()).context("creating workflow paths")?;
    WorkflowLogger::init(&paths, Some(cli.console)).context("initializing logger")?;

    let entries: Vec<TaskEntry> = match &cli.tasks {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading task list {}", path.display()))?;
            serde_json::from_str(&text).context("parsing task list JSON")?
        }
        None => Vec::new(),
    };

    let task_list: Vec<TaskId> = entries.iter().map(|e| TaskId::new(e.id.clone())).collect();
    let task_arg_list: Vec<TaskArg> = entries.iter().map(|e| e.args.clone()).collect();
    let task_dir_list: Option<Vec<PathBuf>> = {
        let dirs: Vec<PathBuf> = entries
            .iter()
            .filter_map(|e| e.dir.clone())
            .collect();
        if dirs.len() == entries.len() && !dirs.is_empty() {
            Some(dirs)
        } else {
            None
        }
    };

    let config = PoolExecutorConfig {
        task_list,
        command: cli.command,
        write_restart_freq: cli.write_restart_freq,
        tasks_per_job: match cli.tasks_per_job {
            Some(n) => TasksPerJob::Uniform(n),
            None => TasksPerJob::Unset,
        },
        cores_per_task: cli.cores_per_task,
        gpus_per_task: cli.gpus_per_task,
        nnodes: cli.nnodes,
        gpus_per_node: cli.gpus_per_node,
        restart_filename: cli.restart_file,
        paths,
    };

    let cluster = LocalProcessCluster::detect();
    let buffer_time = Duration::from_millis(cli.buffer_time_ms);

    let mut exec = PoolExecutor::new(
        config,
        task_arg_list,
        task_dir_list,
        cli.adaptive,
        cli.heterogeneous,
        None,
        None,
    )?;
    exec.run(&cluster, buffer_time).await?;

    log::info!(
        "Workflow finished: {} completed, {} failed.",
        exec.completed().len(),
        exec.failed().len(),
    );

    Ok(())
}
