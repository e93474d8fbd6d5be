// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use tracing::{debug, info, warn};

use crate::dag::{ScheduledJob, SchedulerStep};
use crate::engine::queue::RunQueue;
use crate::engine::runs::RunSet;
use crate::engine::{JobResult, RuntimeOptions};
use crate::report::RunReport;
use crate::types::{Event, JobName, JobOutcome, OutcomeMap, RunId, SupersededRunBehaviour};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Stop the in-flight jobs of a superseded run and invalidate its
    /// artifacts.
    CancelRun { run_id: RunId, jobs: Vec<JobName> },
    /// The job succeeded: make its staged artifacts visible.
    CommitArtifacts { run_id: RunId, job: JobName },
    /// The job failed: drop whatever it staged.
    DiscardArtifacts { run_id: RunId, job: JobName },
    /// Send these jobs to the executor.
    DispatchJobs(Vec<ScheduledJob>),
    /// Current outcomes of a run, for observers.
    PublishState {
        run_id: RunId,
        event: Event,
        outcomes: OutcomeMap,
    },
    /// The run is terminal.
    FinishRun(RunReport),
    /// Request that the process exits (no active run, nothing queued).
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Handle a newly received CI event.
///
/// - No active run on the event's ref: start a run right away.
/// - Active run and behaviour `cancel`: cancel it first. The `CancelRun`
///   command precedes every command of the new run.
/// - Active run and behaviour `queue`: keep the event until that run
///   finishes (replacing an older waiting event of the same ref).
pub fn handle_event_received(
    runs: &mut RunSet,
    queue: &mut RunQueue,
    behaviour: SupersededRunBehaviour,
    options: &RuntimeOptions,
    event: Event,
) -> CoreStep {
    let mut commands = Vec::new();
    let key = event.concurrency_key();

    if let Some(active) = runs.active_on(&key) {
        match behaviour {
            SupersededRunBehaviour::Cancel => {
                info!(
                    run_id = active,
                    concurrency_key = %key,
                    superseded_by = %event,
                    "newer event on the same ref; cancelling active run"
                );
                cancel_run(runs, active, &mut commands);
            }
            SupersededRunBehaviour::Queue => {
                info!(
                    run_id = active,
                    concurrency_key = %key,
                    "run active on this ref; queueing event"
                );
                queue.record(event);
                return CoreStep {
                    commands,
                    keep_running: true,
                };
            }
        }
    }

    start_run(runs, queue, event, &mut commands);

    let keep_running = check_idle_exit(runs, queue, options, &mut commands);
    CoreStep {
        commands,
        keep_running,
    }
}

/// Handle a job completion event.
pub fn handle_job_completion(
    runs: &mut RunSet,
    queue: &mut RunQueue,
    options: &RuntimeOptions,
    run_id: RunId,
    job: JobName,
    result: JobResult,
) -> CoreStep {
    let mut commands = Vec::new();

    let Some(scheduler) = runs.get_mut(run_id) else {
        debug!(run_id, job = %job, "completion for a run that is no longer active; ignoring");
        return CoreStep {
            commands,
            keep_running: true,
        };
    };

    if scheduler.outcome_of(&job) != Some(JobOutcome::Running) {
        warn!(
            run_id,
            job = %job,
            outcome = ?scheduler.outcome_of(&job),
            "completion for a job that is not running; ignoring"
        );
        return CoreStep {
            commands,
            keep_running: true,
        };
    }

    let succeeded = result.is_success();
    let step = scheduler.step_completion(&job, result);

    // Artifacts must be visible before any dependent is dispatched.
    if succeeded {
        commands.push(CoreCommand::CommitArtifacts { run_id, job });
    } else {
        commands.push(CoreCommand::DiscardArtifacts { run_id, job });
    }
    apply_step(runs, queue, run_id, step, &mut commands);

    let keep_running = check_idle_exit(runs, queue, options, &mut commands);
    CoreStep {
        commands,
        keep_running,
    }
}

/// Cancel every active run and drop queued events.
pub fn handle_shutdown(runs: &mut RunSet, queue: &mut RunQueue) -> CoreStep {
    let mut commands = Vec::new();

    let dropped = queue.clear();
    let active = runs.run_ids();
    info!(active = active.len(), queued = dropped, "shutdown requested");

    for run_id in active {
        cancel_run(runs, run_id, &mut commands);
    }
    commands.push(CoreCommand::RequestExit);

    CoreStep {
        commands,
        keep_running: false,
    }
}

fn start_run(runs: &mut RunSet, queue: &mut RunQueue, event: Event, commands: &mut Vec<CoreCommand>) {
    let (run_id, step) = runs.start(event);
    apply_step(runs, queue, run_id, step, commands);
}

fn cancel_run(runs: &mut RunSet, run_id: RunId, commands: &mut Vec<CoreCommand>) {
    let Some(scheduler) = runs.get_mut(run_id) else {
        return;
    };

    let jobs = scheduler.cancel();
    commands.push(CoreCommand::CancelRun { run_id, jobs });
    publish_state(runs, run_id, commands);
    if let Some((_, report)) = runs.finish(run_id) {
        commands.push(CoreCommand::FinishRun(report));
    }
}

/// Turn a scheduler step into commands; when the run became terminal,
/// finish it and start the event queued behind it (if any).
fn apply_step(
    runs: &mut RunSet,
    queue: &mut RunQueue,
    run_id: RunId,
    step: SchedulerStep,
    commands: &mut Vec<CoreCommand>,
) {
    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::DispatchJobs(step.newly_scheduled));
    }
    publish_state(runs, run_id, commands);

    if !step.run_just_finished {
        return;
    }

    let Some((key, report)) = runs.finish(run_id) else {
        return;
    };
    info!(run_id, status = %report.status(), "run finished");
    commands.push(CoreCommand::FinishRun(report));

    if let Some(next) = queue.take(&key) {
        info!(concurrency_key = %key, event = %next, "starting queued run");
        start_run(runs, queue, next, commands);
    }
}

fn publish_state(runs: &RunSet, run_id: RunId, commands: &mut Vec<CoreCommand>) {
    if let Some(scheduler) = runs.get(run_id) {
        commands.push(CoreCommand::PublishState {
            run_id,
            event: scheduler.event().clone(),
            outcomes: scheduler.outcomes(),
        });
    }
}

fn check_idle_exit(
    runs: &RunSet,
    queue: &RunQueue,
    options: &RuntimeOptions,
    commands: &mut Vec<CoreCommand>,
) -> bool {
    if options.exit_when_idle && runs.is_idle() && queue.is_empty() {
        commands.push(CoreCommand::RequestExit);
        return false;
    }
    true
}
