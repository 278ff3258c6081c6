// src/strategy/submission.rs
//
// Three submission-strategy variants sharing one admission loop shape: while
// the pending queue is non-empty and the predicate holds for the head task,
// pop it and submit. All three pace submissions with `buffer_time` between
// jobs, a cooperative yield point, not a blocking sleep.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use crate::error::ManagerError;
use crate::fluxlet::{Fluxlet, SubmitRequest};
use crate::manager::PoolExecutor;

use super::SubmissionStrategy;

pub(crate) async fn submit_one(exec: &mut PoolExecutor<'_>, heterogeneous: bool) -> Result<(), ManagerError> {
    let Some(head) = exec.pending.pop_front() else {
        return Ok(());
    };

    let tasks_per_job = head.tasks_per_job;
    let needed_cores = tasks_per_job * exec.cores_per_task;
    let needed_gpus = tasks_per_job * exec.gpus_per_task;

    let req = SubmitRequest {
        command: &exec.command,
        task_id: &head.id,
        task_args: &head.args,
        task_dir: head.dir.as_deref(),
        base_out_dir: Some(&exec.paths.out_dir),
        tasks_per_job,
        cores_per_task: exec.cores_per_task,
        gpus_per_task: exec.gpus_per_task,
        nnodes: exec.nnodes,
        gpus_per_node: exec.gpus_per_node,
        set_gpu_affinity: exec.gpus_per_task > 0,
        set_cpu_affinity: true,
        set_mpi: false,
        env: None,
    };

    let cluster = exec.cluster.expect("cluster handle set by PoolExecutor::run");
    let submission = if heterogeneous {
        Fluxlet::build_and_submit_heterogeneous(cluster, req).await?
    } else {
        Fluxlet::build_and_submit_homogeneous(cluster, req).await?
    };

    exec.running.push(submission.task_id);
    exec.free_cores = exec.free_cores.saturating_sub(needed_cores as usize);
    exec.free_gpus = exec.free_gpus.saturating_sub(needed_gpus as usize);
    Ok(())
}

/// `free_cores >= tpj_head * cores_per_task`.
pub struct CpuAffineStrategy;

#[async_trait]
impl SubmissionStrategy for CpuAffineStrategy {
    async fn submit_until_out_of_resources(
        &self,
        exec: &mut PoolExecutor<'_>,
        buffer_time: Duration,
    ) -> Result<(), ManagerError> {
        loop {
            let Some(tpj_head) = exec.pending.front().map(|t| t.tasks_per_job) else {
                break;
            };
            if exec.free_cores < (tpj_head * exec.cores_per_task) as usize {
                break;
            }
            submit_one(exec, false).await?;
            sleep(buffer_time).await;
        }
        Ok(())
    }
}

/// CPU-affine predicate AND `free_gpus >= tpj_head * gpus_per_task`.
pub struct GpuAffineStrategy;

#[async_trait]
impl SubmissionStrategy for GpuAffineStrategy {
    async fn submit_until_out_of_resources(
        &self,
        exec: &mut PoolExecutor<'_>,
        buffer_time: Duration,
    ) -> Result<(), ManagerError> {
        loop {
            let Some(tpj_head) = exec.pending.front().map(|t| t.tasks_per_job) else {
                break;
            };
            let cores_ok = exec.free_cores >= (tpj_head * exec.cores_per_task) as usize;
            let gpus_ok = exec.free_gpus >= (tpj_head * exec.gpus_per_task) as usize;
            if !cores_ok || !gpus_ok {
                break;
            }
            submit_one(exec, false).await?;
            sleep(buffer_time).await;
        }
        Ok(())
    }
}

/// Same predicate as CPU-affine; submission goes through the per-resource
/// (dynopro) builder instead.
pub struct HeterogeneousStrategy;

#[async_trait]
impl SubmissionStrategy for HeterogeneousStrategy {
    async fn submit_until_out_of_resources(
        &self,
        exec: &mut PoolExecutor<'_>,
        buffer_time: Duration,
    ) -> Result<(), ManagerError> {
        loop {
            let Some(tpj_head) = exec.pending.front().map(|t| t.tasks_per_job) else {
                break;
            };
            if exec.free_cores < (tpj_head * exec.cores_per_task) as usize {
                break;
            }
            submit_one(exec, true).await?;
            sleep(buffer_time).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::task::{PendingTask, TaskArg, TaskId};

    #[test]
    fn head_too_large_blocks_smaller_successor() {
        // A predicate check only, exercised directly rather than through the
        // full async manager: the head's footprint gates admission even when
        // a later, smaller task would otherwise fit (spec'd as deliberate).
        let mut pending = std::collections::VecDeque::new();
        pending.push_back(PendingTask {
            id: TaskId::new("big"),
            args: TaskArg::Null,
            dir: None,
            tasks_per_job: 8,
        });
        pending.push_back(PendingTask {
            id: TaskId::new("small"),
            args: TaskArg::Null,
            dir: None,
            tasks_per_job: 1,
        });

        let free_cores = 2usize;
        let cores_per_task = 1u32;
        let head_fits = free_cores >= (pending[0].tasks_per_job * cores_per_task) as usize;
        assert!(!head_fits, "head should not fit, blocking the smaller successor");
    }
}
