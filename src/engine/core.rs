// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - sending `ScheduledJob`s to the executor and cancelling runs
//! - committing or discarding artifacts
//! - handling Ctrl+C / shutdown
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels, filesystem, or processes.

use std::sync::Arc;

use crate::dag::{Pipeline, Scheduler};
use crate::engine::event_handlers::{
    handle_event_received, handle_job_completion, handle_shutdown, CoreStep,
};
use crate::engine::queue::RunQueue;
use crate::engine::runs::RunSet;
use crate::engine::{RuntimeEvent, RuntimeOptions};
use crate::trigger::TriggerPolicy;
use crate::types::{RunId, SupersededRunBehaviour};

/// Pure core runtime state.
///
/// This owns:
/// - the active runs and their concurrency groups
/// - the run queue
/// - runtime options (e.g. `exit_when_idle`)
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    runs: RunSet,
    queue: RunQueue,
    behaviour: SupersededRunBehaviour,
    options: RuntimeOptions,
}

impl CoreRuntime {
    pub fn new(
        pipeline: Arc<Pipeline>,
        policy: TriggerPolicy,
        behaviour: SupersededRunBehaviour,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            runs: RunSet::new(pipeline, policy),
            queue: RunQueue::new(),
            behaviour,
            options,
        }
    }

    /// No run is active.
    pub fn is_idle(&self) -> bool {
        self.runs.is_idle()
    }

    pub fn queue_is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// The scheduler of an active run.
    pub fn run(&self, run_id: RunId) -> Option<&Scheduler> {
        self.runs.get(run_id)
    }

    pub fn active_run_on(&self, concurrency_key: &str) -> Option<RunId> {
        self.runs.active_on(concurrency_key)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::EventReceived(event) => handle_event_received(
                &mut self.runs,
                &mut self.queue,
                self.behaviour,
                &self.options,
                event,
            ),
            RuntimeEvent::JobCompleted {
                run_id,
                job,
                result,
            } => handle_job_completion(
                &mut self.runs,
                &mut self.queue,
                &self.options,
                run_id,
                job,
                result,
            ),
            RuntimeEvent::ShutdownRequested => handle_shutdown(&mut self.runs, &mut self.queue),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_and_validate_str;
    use crate::engine::{CoreCommand, JobResult};
    use crate::types::{Event, JobOutcome};

    const CHAIN: &str = r#"
[job.test]
action = "test"

[job.build]
action = "build"
after = ["test"]
produces = ["wheel"]
publish_capable = true

[job.smoke]
action = "passthrough"
cmd = "true"
after = ["build"]
consumes = ["wheel"]
"#;

    fn core(behaviour: SupersededRunBehaviour, exit_when_idle: bool) -> CoreRuntime {
        let cfg = load_and_validate_str(CHAIN).unwrap();
        let pipeline = Arc::new(Pipeline::from_config(&cfg));
        let policy = TriggerPolicy::new("main", "v*").unwrap();
        CoreRuntime::new(pipeline, policy, behaviour, RuntimeOptions { exit_when_idle })
    }

    fn dispatched(step: &CoreStep) -> Vec<(RunId, String)> {
        step.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::DispatchJobs(jobs) => Some(jobs),
                _ => None,
            })
            .flatten()
            .map(|j| (j.run_id, j.name.clone()))
            .collect()
    }

    fn complete(core: &mut CoreRuntime, run_id: RunId, job: &str) -> CoreStep {
        core.step(RuntimeEvent::JobCompleted {
            run_id,
            job: job.to_string(),
            result: JobResult::Success,
        })
    }

    #[test]
    fn walks_the_chain_and_commits_before_dispatching_dependents() {
        let mut core = core(SupersededRunBehaviour::Cancel, true);

        let step = core.step(RuntimeEvent::EventReceived(Event::push("main", "c1")));
        assert_eq!(dispatched(&step), vec![(1, "test".to_string())]);
        assert!(step.keep_running);

        complete(&mut core, 1, "test");
        let step = complete(&mut core, 1, "build");
        let commit = step
            .commands
            .iter()
            .position(|c| matches!(c, CoreCommand::CommitArtifacts { job, .. } if job == "build"));
        let dispatch = step
            .commands
            .iter()
            .position(|c| matches!(c, CoreCommand::DispatchJobs(_)));
        assert!(commit.unwrap() < dispatch.unwrap());

        let step = complete(&mut core, 1, "smoke");
        assert!(!step.keep_running);
        assert!(matches!(step.commands.last(), Some(CoreCommand::RequestExit)));
        let report = step
            .commands
            .iter()
            .find_map(|c| match c {
                CoreCommand::FinishRun(r) => Some(r),
                _ => None,
            })
            .unwrap();
        assert!(report.succeeded());
        assert!(core.is_idle());
    }

    #[test]
    fn newer_event_on_the_same_ref_cancels_before_dispatching() {
        let mut core = core(SupersededRunBehaviour::Cancel, false);
        core.step(RuntimeEvent::EventReceived(Event::push("main", "c1")));

        let step = core.step(RuntimeEvent::EventReceived(Event::push("main", "c2")));
        let cancel = step
            .commands
            .iter()
            .position(|c| matches!(c, CoreCommand::CancelRun { run_id: 1, .. }))
            .unwrap();
        let dispatch = step
            .commands
            .iter()
            .position(|c| matches!(c, CoreCommand::DispatchJobs(jobs) if jobs[0].run_id == 2))
            .unwrap();
        assert!(cancel < dispatch);

        match &step.commands[cancel] {
            CoreCommand::CancelRun { jobs, .. } => assert_eq!(jobs, &vec!["test".to_string()]),
            other => panic!("unexpected command {other:?}"),
        }
        assert!(core.run(1).is_none());
        assert_eq!(core.active_run_on("main"), Some(2));

        // Late completion from the superseded run changes nothing.
        let step = complete(&mut core, 1, "test");
        assert!(step.commands.is_empty());
        assert_eq!(core.run(2).unwrap().outcome_of("test"), Some(JobOutcome::Running));
    }

    #[test]
    fn different_refs_run_concurrently() {
        let mut core = core(SupersededRunBehaviour::Cancel, false);
        core.step(RuntimeEvent::EventReceived(Event::push("main", "c1")));
        let step = core.step(RuntimeEvent::EventReceived(Event::pull_request("main", "c2")));

        assert!(!step
            .commands
            .iter()
            .any(|c| matches!(c, CoreCommand::CancelRun { .. })));
        assert!(core.run(1).is_some());
        assert!(core.run(2).is_some());
    }

    #[test]
    fn queue_mode_starts_only_the_latest_waiting_event() {
        let mut core = core(SupersededRunBehaviour::Queue, true);
        core.step(RuntimeEvent::EventReceived(Event::push("main", "c1")));
        let step = core.step(RuntimeEvent::EventReceived(Event::push("main", "c2")));
        assert!(step.commands.is_empty());
        core.step(RuntimeEvent::EventReceived(Event::push("main", "c3")));
        assert!(!core.queue_is_empty());

        complete(&mut core, 1, "test");
        complete(&mut core, 1, "build");
        let step = complete(&mut core, 1, "smoke");

        assert_eq!(dispatched(&step), vec![(2, "test".to_string())]);
        assert_eq!(core.run(2).unwrap().event().commit, "c3");
        assert!(core.queue_is_empty());
        assert!(step.keep_running);
    }

    #[test]
    fn event_selecting_nothing_finishes_immediately() {
        let mut core = core(SupersededRunBehaviour::Cancel, true);
        let step = core.step(RuntimeEvent::EventReceived(Event::push("feature/x", "c1")));

        assert!(dispatched(&step).is_empty());
        assert!(step
            .commands
            .iter()
            .any(|c| matches!(c, CoreCommand::FinishRun(_))));
        assert!(!step.keep_running);
    }

    #[test]
    fn shutdown_cancels_active_runs() {
        let mut core = core(SupersededRunBehaviour::Cancel, false);
        core.step(RuntimeEvent::EventReceived(Event::push("main", "c1")));

        let step = core.step(RuntimeEvent::ShutdownRequested);
        assert!(!step.keep_running);
        let report = step
            .commands
            .iter()
            .find_map(|c| match c {
                CoreCommand::FinishRun(r) => Some(r),
                _ => None,
            })
            .unwrap();
        assert_eq!(report.outcome_of("test"), Some(JobOutcome::Cancelled));
        assert_eq!(report.outcome_of("smoke"), Some(JobOutcome::Cancelled));
    }
}
