// src/task.rs
//
// =============================================================================
// MATENSEMBLE: TASK IDENTITY & RESOURCE FOOTPRINT
// =============================================================================
//
// Defines the user-facing shape of a task: its identity, the raw argument
// shapes the caller is allowed to hand us, and the per-run resource
// footprint that strategies gate submission on.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;

use crate::error::ManagerError;

// ============================================================================
// 1. TASK IDENTITY
// ============================================================================

/// Opaque, user-chosen task identity. Must be hashable/comparable and
/// durable through restart serialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// 2. TASK ARGUMENTS (normalized at submission time)
// ============================================================================

/// The shapes a caller may supply for a single task's arguments.
///
/// Mirrors the original implementation's accepted Python shapes
/// (`list[int|str|float]`, a bare scalar, `dict`, or `None`) as a tagged
/// Rust enum instead of relying on dynamic typing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskArg {
    List(Vec<ArgScalar>),
    Scalar(ArgScalar),
    Null,
}

impl Default for TaskArg {
    fn default() -> Self {
        TaskArg::Null
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgScalar {
    Int(i64),
    Float(f64),
    Str(String),
    Map(serde_json::Map<String, serde_json::Value>),
}

impl ArgScalar {
    fn to_arg_string(&self) -> String {
        match self {
            ArgScalar::Int(i) => i.to_string(),
            ArgScalar::Float(f) => f.to_string(),
            ArgScalar::Str(s) => s.clone(),
            ArgScalar::Map(m) => serde_json::Value::Object(m.clone()).to_string(),
        }
    }
}

impl TaskArg {
    /// Converts any accepted shape to an ordered list of string arguments,
    /// the form the command line actually needs.
    pub fn normalize(&self) -> Result<Vec<String>, ManagerError> {
        match self {
            TaskArg::Null => Ok(Vec::new()),
            TaskArg::Scalar(s) => Ok(vec![s.to_arg_string()]),
            TaskArg::List(items) => Ok(items.iter().map(ArgScalar::to_arg_string).collect()),
        }
    }
}

// ============================================================================
// 3. TASKS-PER-JOB CONSTRUCTION
// ============================================================================

/// How the caller may specify per-task parallelism at construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TasksPerJob {
    /// Not specified: repeat `1` for every task.
    Unset,
    /// A single number, repeated for every task.
    Uniform(u32),
    /// An explicit per-task list.
    List(Vec<u32>),
}

impl Default for TasksPerJob {
    fn default() -> Self {
        TasksPerJob::Unset
    }
}

impl TasksPerJob {
    /// Builds the deque the manager actually mutates during dispatch.
    pub fn into_deque(self, task_count: usize) -> Result<VecDeque<u32>, ManagerError> {
        match self {
            TasksPerJob::Unset => Ok(VecDeque::from(vec![1u32; task_count])),
            TasksPerJob::Uniform(n) => {
                if n == 0 {
                    return Err(ManagerError::InvalidConfig(
                        "tasks_per_job must be a positive integer".into(),
                    ));
                }
                Ok(VecDeque::from(vec![n; task_count]))
            }
            TasksPerJob::List(items) => {
                if items.iter().any(|&n| n == 0) {
                    return Err(ManagerError::InvalidConfig(
                        "tasks_per_job entries must all be positive integers".into(),
                    ));
                }
                Ok(VecDeque::from(items))
            }
        }
    }
}

// ============================================================================
// 4. RESOURCE FOOTPRINT (constant for the run)
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResourceFootprint {
    pub cores_per_task: u32,
    pub gpus_per_task: u32,
    /// Heterogeneous/dynopro mode only.
    pub nnodes: Option<u32>,
    /// Heterogeneous/dynopro mode only.
    pub gpus_per_node: Option<u32>,
}

impl Default for ResourceFootprint {
    fn default() -> Self {
        Self {
            cores_per_task: 1,
            gpus_per_task: 0,
            nnodes: None,
            gpus_per_node: None,
        }
    }
}

// ============================================================================
// 5. PENDING TASK (restart-durable unit of the pending queue)
// ============================================================================

/// One entry of the pending queue, carrying everything needed to resubmit it
/// after a restart without losing the alignment between id/args/dir/tpj (I5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTask {
    pub id: TaskId,
    pub args: TaskArg,
    pub dir: Option<PathBuf>,
    pub tasks_per_job: u32,
}
