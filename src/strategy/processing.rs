// src/strategy/processing.rs
//
// Two future-processing strategies. Both reap whatever completes within a
// bounded wait and classify each outcome; `AdaptiveStrategy` additionally
// attempts one opportunistic resubmission per completion instead of waiting
// for the next outer loop iteration.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;

use crate::cluster::{ReapOutcome, Reaped};
use crate::manager::PoolExecutor;

use super::submission::submit_one;
use super::ProcessingStrategy;

/// Appends `text` to `path`, creating parent directories as needed. Mirrors
/// the original implementation's diagnostic-append behavior on task stderr.
fn append_text(path: &Path, text: &str) {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    match fs::OpenOptions::new().create(true).append(true).open(path) {
        Ok(mut f) => {
            let _ = f.write_all(text.as_bytes());
        }
        Err(e) => log::warn!("could not append diagnostic to {}: {e}", path.display()),
    }
}

/// Shared reap-and-classify step; returns `true` if the reaped task
/// completed successfully (exit code 0).
fn classify(exec: &mut PoolExecutor<'_>, reaped: Reaped) -> bool {
    exec.running.retain(|id| id != &reaped.task_id);

    match reaped.outcome {
        ReapOutcome::Cancelled => {
            log::warn!("task {} was cancelled; dropping without recording an outcome", reaped.task_id);
            false
        }
        ReapOutcome::WrapperFailure(msg) => {
            let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
            append_text(
                &reaped.workdir.join("stderr"),
                &format!(
                    "\n\n===== MATENSEMBLE WRAPPER ERROR ({stamp}) =====\ntask={}\nworkdir={}\nerror={msg}\n",
                    reaped.task_id,
                    reaped.workdir.display(),
                ),
            );
            log::error!(
                "TASK FAILED: task={} workdir={} error={msg}",
                reaped.task_id,
                reaped.workdir.display(),
            );
            exec.failed.push((reaped.task_id, reaped.job_spec));
            false
        }
        ReapOutcome::Exited(code) if code != 0 => {
            append_text(
                &reaped.workdir.join("stderr"),
                &format!(
                    "\n\n===== MATENSEMBLE: NONZERO EXIT =====\ntask={} rc={code}\nSee workflow log for details: {}\n",
                    reaped.task_id,
                    exec.paths.verbose_log_file.display(),
                ),
            );
            log::error!(
                "TASK NONZERO EXIT: task={} rc={code} workdir={}",
                reaped.task_id,
                reaped.workdir.display(),
            );
            exec.failed.push((reaped.task_id, reaped.job_spec));
            false
        }
        ReapOutcome::Exited(_) => {
            exec.completed.push(reaped.task_id);
            true
        }
    }
}

fn maybe_snapshot(exec: &mut PoolExecutor<'_>) {
    if exec.write_restart_freq == 0 {
        return;
    }
    if exec.completed.len() % exec.write_restart_freq as usize == 0 {
        if let Err(e) = exec.create_restart_file() {
            log::warn!("failed to write restart snapshot: {e}");
        }
    }
}

/// Does not try to submit a new task after each completion.
pub struct NonAdaptiveStrategy;

#[async_trait]
impl ProcessingStrategy for NonAdaptiveStrategy {
    async fn process_futures(&self, exec: &mut PoolExecutor<'_>, buffer_time: Duration) {
        let cluster = exec.cluster.expect("cluster handle set by PoolExecutor::run");
        let reaped = cluster.reap(buffer_time).await;
        for r in reaped {
            if classify(exec, r) {
                maybe_snapshot(exec);
            }
        }
    }
}

/// Every time a future completes, immediately submits one more pending task
/// if it fits, instead of waiting for the next outer loop iteration.
pub struct AdaptiveStrategy {
    pub heterogeneous: bool,
}

#[async_trait]
impl ProcessingStrategy for AdaptiveStrategy {
    async fn process_futures(&self, exec: &mut PoolExecutor<'_>, buffer_time: Duration) {
        let cluster = exec.cluster.expect("cluster handle set by PoolExecutor::run");
        let reaped = cluster.reap(buffer_time).await;
        for r in reaped {
            let succeeded = classify(exec, r);
            if succeeded {
                if let Some(tpj_head) = exec.pending.front().map(|t| t.tasks_per_job) {
                    if exec.free_cores >= (tpj_head * exec.cores_per_task) as usize {
                        if let Err(e) = submit_one(exec, self.heterogeneous).await {
                            log::error!("adaptive opportunistic submission failed: {e}");
                        }
                    }
                }
                maybe_snapshot(exec);
            }
        }
    }
}
