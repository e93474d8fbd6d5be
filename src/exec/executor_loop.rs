// src/exec/executor_loop.rs

//! Main executor loop that manages running jobs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dag::ScheduledJob;
use crate::engine::RuntimeEvent;
use crate::exec::cancel::{cancel_pair, CancelHandle};
use crate::exec::context::ExecContext;
use crate::exec::job_runner::run_job;
use crate::types::{JobName, RunId};

/// Requests the runtime sends to the executor loop, processed in order.
#[derive(Debug)]
pub enum ExecutorCommand {
    Dispatch(ScheduledJob),
    /// Stop every job of the run that is still executing.
    CancelRun { run_id: RunId, jobs: Vec<JobName> },
}

/// Internal handle for a currently-running job.
///
/// - `cancel` asks the job to stop cooperatively.
/// - `handle` is the Tokio task running it; aborted if the job does not
///   stop within the grace period.
struct ActiveJob {
    cancel: CancelHandle,
    handle: tokio::task::JoinHandle<()>,
}

/// Spawn the background executor loop.
///
/// The returned sender is what `RealExecutorBackend` uses. Each dispatched
/// job runs in its own Tokio task; a `(run, job)` pair never runs twice.
pub fn spawn_executor(
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    ctx: Arc<ExecContext>,
    grace_period: Duration,
) -> mpsc::Sender<ExecutorCommand> {
    let (tx, mut rx) = mpsc::channel::<ExecutorCommand>(64);

    tokio::spawn(async move {
        info!("executor loop started");

        let mut active: HashMap<(RunId, JobName), ActiveJob> = HashMap::new();

        while let Some(command) = rx.recv().await {
            match command {
                ExecutorCommand::Dispatch(job) => {
                    handle_dispatch(job, &mut active, &runtime_tx, &ctx);
                }
                ExecutorCommand::CancelRun { run_id, jobs } => {
                    cancel_run(run_id, &jobs, &mut active, grace_period);
                }
            }
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}

fn handle_dispatch(
    job: ScheduledJob,
    active: &mut HashMap<(RunId, JobName), ActiveJob>,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
    ctx: &Arc<ExecContext>,
) {
    active.retain(|_, a| !a.handle.is_finished());

    let key = (job.run_id, job.name.clone());
    if active.contains_key(&key) {
        warn!(job = %job.name, run_id = job.run_id, "job already running; ignoring duplicate dispatch");
        return;
    }

    let (cancel, token) = cancel_pair();
    let handle = tokio::spawn(run_job(job, Arc::clone(ctx), runtime_tx.clone(), token));
    active.insert(key, ActiveJob { cancel, handle });
}

/// Signal every active job of `run_id`, then abort whatever is still
/// running once the grace period is over.
fn cancel_run(
    run_id: RunId,
    expected: &[JobName],
    active: &mut HashMap<(RunId, JobName), ActiveJob>,
    grace_period: Duration,
) {
    let keys: Vec<(RunId, JobName)> = active
        .keys()
        .filter(|(r, _)| *r == run_id)
        .cloned()
        .collect();
    info!(run_id, jobs = keys.len(), expected = expected.len(), "cancelling run");

    for key in keys {
        let Some(job) = active.remove(&key) else {
            continue;
        };
        job.cancel.cancel();

        let (run_id, name) = key;
        let mut handle = job.handle;
        tokio::spawn(async move {
            match tokio::time::timeout(grace_period, &mut handle).await {
                Ok(_) => debug!(job = %name, run_id, "cancelled job stopped"),
                Err(_) => {
                    warn!(
                        job = %name,
                        run_id,
                        grace_ms = grace_period.as_millis() as u64,
                        "job ignored cancellation; aborting"
                    );
                    handle.abort();
                }
            }
        });
    }
}
