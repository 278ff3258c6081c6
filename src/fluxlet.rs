// src/fluxlet.rs
//
// =============================================================================
// MATENSEMBLE: JOB-SPEC BUILDER
// =============================================================================
//
// Builds a single submission descriptor (command, resources, cwd, stdio,
// affinity, environment) and hands it to a `ClusterHandle` for execution.
// Never mutates process-wide state: the working directory is resolved
// without changing the caller's cwd, and the environment is always a fresh
// snapshot.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cluster::{ClusterHandle, Submission};
use crate::error::ManagerError;
use crate::task::{TaskArg, TaskId};

// ============================================================================
// 1. JOB SPEC
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResourceRequest {
    Homogeneous {
        num_tasks: u32,
        cores_per_task: u32,
        gpus_per_task: u32,
    },
    Heterogeneous {
        ncores: u32,
        nnodes: u32,
        gpus_per_node: u32,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShellOptions {
    pub mpi: bool,
    pub cpu_affinity: bool,
    pub gpu_affinity: bool,
}

/// The descriptor handed to a `ClusterHandle` to launch one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub command: Vec<String>,
    pub resources: ResourceRequest,
    pub cwd: PathBuf,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
    pub environment: HashMap<String, String>,
    pub shell_options: ShellOptions,
}

// ============================================================================
// 2. WORKING DIRECTORY RESOLUTION
// ============================================================================

/// Decides where a task runs and where stdout/stderr land. Never changes the
/// caller's cwd; always returns an absolute, existing, canonicalized path.
pub fn resolve_workdir(
    task_id: &TaskId,
    task_dir: Option<&Path>,
    base_out_dir: Option<&Path>,
    launch_dir: Option<&Path>,
) -> std::io::Result<PathBuf> {
    let launch_dir = match launch_dir {
        Some(p) => p.to_path_buf(),
        None => env::current_dir()?,
    };

    let p = match task_dir {
        Some(dir) if dir.is_absolute() => dir.to_path_buf(),
        Some(dir) => {
            let root = base_out_dir.unwrap_or(&launch_dir);
            root.join(dir)
        }
        None => {
            let root = base_out_dir.unwrap_or(&launch_dir);
            root.join(task_id.0.as_str())
        }
    };

    std::fs::create_dir_all(&p)?;
    p.canonicalize()
}

// ============================================================================
// 3. FLUXLET
// ============================================================================

pub struct SubmitRequest<'a> {
    pub command: &'a str,
    pub task_id: &'a TaskId,
    pub task_args: &'a TaskArg,
    pub task_dir: Option<&'a Path>,
    pub base_out_dir: Option<&'a Path>,
    pub tasks_per_job: u32,
    pub cores_per_task: u32,
    pub gpus_per_task: u32,
    pub nnodes: Option<u32>,
    pub gpus_per_node: Option<u32>,
    pub set_gpu_affinity: bool,
    pub set_cpu_affinity: bool,
    pub set_mpi: bool,
    pub env: Option<HashMap<String, String>>,
}

pub struct Fluxlet;

impl Fluxlet {
    fn base_spec(req: &SubmitRequest, resources: ResourceRequest, extra_env: Option<(&str, String)>) -> Result<JobSpec, ManagerError> {
        let workdir = resolve_workdir(req.task_id, req.task_dir, req.base_out_dir, None)
            .map_err(ManagerError::WrapperFailure)?;

        let mut command = shlex::split(req.command)
            .ok_or_else(|| ManagerError::InvalidConfig(format!("unparsable command: {}", req.command)))?;
        command.extend(req.task_args.normalize()?);

        let mut environment = match &req.env {
            Some(e) => e.clone(),
            None => env::vars().collect(),
        };
        if let Some((k, v)) = extra_env {
            environment.insert(k.to_string(), v);
        }

        let shell_options = ShellOptions {
            mpi: req.set_mpi,
            cpu_affinity: req.set_cpu_affinity,
            gpu_affinity: req.set_gpu_affinity && req.gpus_per_task > 0,
        };

        Ok(JobSpec {
            command,
            resources,
            stdout: workdir.join("stdout"),
            stderr: workdir.join("stderr"),
            cwd: workdir,
            environment,
            shell_options,
        })
    }

    /// `Fluxlet::build_and_submit_homogeneous`: plain CPU/GPU-affine submission.
    pub async fn build_and_submit_homogeneous(
        executor: &dyn ClusterHandle,
        req: SubmitRequest<'_>,
    ) -> Result<Submission, ManagerError> {
        let spec = Self::base_spec(
            &req,
            ResourceRequest::Homogeneous {
                num_tasks: req.tasks_per_job,
                cores_per_task: req.cores_per_task,
                gpus_per_task: req.gpus_per_task,
            },
            None,
        )?;
        executor.submit(req.task_id.clone(), spec).await
    }

    /// `Fluxlet::build_and_submit_heterogeneous`: per-resource (dynopro) submission.
    pub async fn build_and_submit_heterogeneous(
        executor: &dyn ClusterHandle,
        req: SubmitRequest<'_>,
    ) -> Result<Submission, ManagerError> {
        let nnodes = req.nnodes.ok_or_else(|| {
            ManagerError::InvalidConfig("heterogeneous submission requires nnodes".into())
        })?;
        let gpus_per_node = req.gpus_per_node.ok_or_else(|| {
            ManagerError::InvalidConfig("heterogeneous submission requires gpus_per_node".into())
        })?;

        let spec = Self::base_spec(
            &req,
            ResourceRequest::Heterogeneous {
                ncores: req.tasks_per_job,
                nnodes,
                gpus_per_node,
            },
            Some(("SLURM_GPUS_PER_NODE", gpus_per_node.to_string())),
        )?;
        executor.submit(req.task_id.clone(), spec).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_workdir_uses_task_id_when_dir_unset() {
        let dir = tempfile::tempdir().unwrap();
        let id = TaskId::new("task-7");
        let resolved = resolve_workdir(&id, None, Some(dir.path()), None).unwrap();
        assert_eq!(resolved.file_name().unwrap(), "task-7");
        assert!(resolved.is_dir());
    }

    #[test]
    fn resolve_workdir_keeps_absolute_dir_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let abs = dir.path().join("explicit");
        let id = TaskId::new("ignored");
        let resolved = resolve_workdir(&id, Some(&abs), None, None).unwrap();
        assert_eq!(resolved, abs.canonicalize().unwrap());
    }

    #[test]
    fn resolve_workdir_joins_relative_dir_under_base() {
        let dir = tempfile::tempdir().unwrap();
        let id = TaskId::new("ignored");
        let resolved = resolve_workdir(&id, Some(Path::new("nested/child")), Some(dir.path()), None).unwrap();
        assert!(resolved.ends_with("nested/child"));
    }
}
