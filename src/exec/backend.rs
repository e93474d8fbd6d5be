// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of a raw mpsc sender.
//! This makes it easy to swap in a fake executor in tests while keeping the
//! production executor implementation in [`executor_loop`](super::executor_loop).
//!
//! - `RealExecutorBackend` is the default implementation used by `shipdag`.
//!   It wraps the `spawn_executor` loop and forwards dispatches and
//!   cancellations over one mpsc channel, so a cancellation always reaches
//!   the loop before any job dispatched after it.
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which jobs were scheduled and directly emits `JobCompleted` events.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::mpsc;

use crate::dag::ScheduledJob;
use crate::engine::RuntimeEvent;
use crate::errors::Result;
use crate::exec::context::ExecContext;
use crate::exec::executor_loop::{spawn_executor, ExecutorCommand};
use crate::types::{JobName, RunId};

/// Trait abstracting how scheduled jobs are executed.
///
/// Production code uses [`RealExecutorBackend`]; tests can provide their own
/// implementation that doesn't run real actions.
pub trait ExecutorBackend: Send {
    /// Dispatch the given jobs for execution.
    fn spawn_ready_jobs(
        &mut self,
        jobs: Vec<ScheduledJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Ask every in-flight job of `run_id` to stop. `jobs` are the ones the
    /// core believes are running.
    fn cancel_run(
        &mut self,
        run_id: RunId,
        jobs: Vec<JobName>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Real executor backend used in production.
pub struct RealExecutorBackend {
    tx: mpsc::Sender<ExecutorCommand>,
}

impl RealExecutorBackend {
    /// Create a new real executor backend, wiring it to the given runtime
    /// event sender.
    ///
    /// This spawns the background executor loop immediately.
    pub fn new(
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        ctx: Arc<ExecContext>,
        grace_period: Duration,
    ) -> Self {
        let tx = spawn_executor(runtime_tx, ctx, grace_period);
        Self { tx }
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn spawn_ready_jobs(
        &mut self,
        jobs: Vec<ScheduledJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            for job in jobs {
                tx.send(ExecutorCommand::Dispatch(job))
                    .await
                    .map_err(|_| anyhow!("executor loop stopped"))?;
            }
            Ok(())
        })
    }

    fn cancel_run(
        &mut self,
        run_id: RunId,
        jobs: Vec<JobName>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.tx.clone();

        Box::pin(async move {
            tx.send(ExecutorCommand::CancelRun { run_id, jobs })
                .await
                .map_err(|_| anyhow!("executor loop stopped"))?;
            Ok(())
        })
    }
}
