// src/strategy/mod.rs
//
// =============================================================================
// MATENSEMBLE: STRATEGY INTERFACES
// =============================================================================
//
// Two small trait-object interfaces the manager composes at construction
// time: how to drain the pending queue into the executor, and how to reap
// completions. Concrete variants are picked by a factory in `manager.rs`,
// mirroring the teacher's `DriverFactory::get` dispatch-by-enum pattern.

pub mod processing;
pub mod submission;

use std::time::Duration;

use async_trait::async_trait;

use crate::manager::PoolExecutor;

#[async_trait]
pub trait SubmissionStrategy: Send + Sync {
    /// Drains the pending queue into the executor until the strategy's
    /// admission predicate fails or the queue empties. Unlike reap-time
    /// failures (always recorded as `failed`, never fatal), a submission
    /// that cannot even be built propagates per the error policy in §7: a
    /// broken submission path is as fatal as a broken cluster handle.
    async fn submit_until_out_of_resources(
        &self,
        exec: &mut PoolExecutor<'_>,
        buffer_time: Duration,
    ) -> Result<(), crate::error::ManagerError>;
}

#[async_trait]
pub trait ProcessingStrategy: Send + Sync {
    /// Reaps whatever completes within `buffer_time` and classifies each
    /// outcome.
    async fn process_futures(&self, exec: &mut PoolExecutor<'_>, buffer_time: Duration);
}

pub use processing::{AdaptiveStrategy, NonAdaptiveStrategy};
pub use submission::{CpuAffineStrategy, GpuAffineStrategy, HeterogeneousStrategy};
