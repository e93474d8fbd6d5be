// src/exec/job_runner.rs

//! Runs a single scheduled job and reports its completion.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::dag::ScheduledJob;
use crate::engine::{JobResult, RuntimeEvent};
use crate::exec::actions::execute;
use crate::exec::cancel::CancelToken;
use crate::exec::context::ExecContext;

/// Run `job` and send a `JobCompleted` event with the result.
///
/// - If the job was cancelled (its run was superseded), **no**
///   `JobCompleted` event is sent; the core already marked it cancelled and
///   would ignore the completion anyway.
pub async fn run_job(
    job: ScheduledJob,
    ctx: Arc<ExecContext>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    cancel: CancelToken,
) {
    info!(
        job = %job.name,
        run_id = job.run_id,
        action = ?job.spec.action,
        publishing = job.publishing,
        "starting job"
    );

    let result = execute(&ctx, &job, &cancel).await;

    if cancel.is_cancelled() {
        info!(job = %job.name, run_id = job.run_id, "job cancelled; not reporting completion");
        return;
    }

    match &result {
        JobResult::Success => info!(job = %job.name, run_id = job.run_id, "job succeeded"),
        JobResult::Failed { exit_code, .. } => {
            warn!(job = %job.name, run_id = job.run_id, exit_code = ?exit_code, "job failed")
        }
    }

    let event = RuntimeEvent::JobCompleted {
        run_id: job.run_id,
        job: job.name.clone(),
        result,
    };
    if runtime_tx.send(event).await.is_err() {
        warn!(job = %job.name, run_id = job.run_id, "runtime gone; dropping job completion");
    }
}
