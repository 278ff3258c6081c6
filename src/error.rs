// src/error.rs
//
// Typed error taxonomy for the dispatch core. Infrastructure glue (I/O,
// serialization, process spawning) still flows through `anyhow::Result`
// the way the rest of this codebase does it; this enum exists for the
// handful of places callers actually need to match on *why* something
// failed (strategy gating, restart loading, task outcome bookkeeping).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("wrapper failed to launch task: {0}")]
    WrapperFailure(#[from] std::io::Error),

    #[error("task exited with nonzero status {code}")]
    NonzeroExit { code: i32 },

    #[error("failed to load restart file: {0}")]
    RestartLoadFailure(String),

    #[error("cluster error: {0}")]
    Cluster(#[from] anyhow::Error),
}
