use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dag::job_info::{JobInfo, ScheduledJob};
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::StateManager;
use crate::dag::Pipeline;
use crate::engine::JobResult;
use crate::report::{JobReport, RunReport};
use crate::trigger::{Eligibility, TriggerPolicy};
use crate::types::{Event, JobName, JobOutcome, OutcomeMap, RunId};

/// Per-run scheduler: the immutable pipeline plus this run's job outcomes.
///
/// It is responsible for:
/// - skipping jobs the trigger policy does not select
/// - tracking each job's remaining dependency count
/// - dispatching jobs whose dependencies all succeeded
/// - skipping everything downstream of a failed or skipped job
/// - cancelling all live jobs when the run is superseded
#[derive(Debug)]
pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    run_id: RunId,
    event: Arc<Event>,
    jobs: HashMap<JobName, JobInfo>,
    finished: bool,
}

impl Scheduler {
    /// Create the run state for `event`. Jobs the policy rejects start out
    /// skipped; everything else is pending. Nothing is dispatched until
    /// [`Scheduler::start`].
    pub fn for_run(
        pipeline: Arc<Pipeline>,
        policy: &TriggerPolicy,
        run_id: RunId,
        event: Event,
    ) -> Self {
        let mut jobs = HashMap::new();

        for spec in pipeline.jobs() {
            let info = match policy.evaluate(spec, &event) {
                Eligibility::Eligible { publishing } => {
                    JobInfo::new(Arc::clone(spec), JobOutcome::Pending, publishing)
                }
                Eligibility::Ineligible => {
                    let mut info = JobInfo::new(Arc::clone(spec), JobOutcome::Skipped, false);
                    info.diagnostics = Some(format!("not eligible for {event}"));
                    info
                }
            };
            jobs.insert(spec.name.clone(), info);
        }

        let eligible = jobs
            .values()
            .filter(|i| i.outcome == JobOutcome::Pending)
            .count();
        info!(run_id, %event, eligible, total = jobs.len(), "created run");

        Self {
            pipeline,
            run_id,
            event: Arc::new(event),
            jobs,
            finished: false,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Whether no job is pending or running.
    pub fn is_terminal(&self) -> bool {
        self.jobs.values().all(|i| i.outcome.is_terminal())
    }

    pub fn outcome_of(&self, job: &str) -> Option<JobOutcome> {
        self.jobs.get(job).map(|i| i.outcome)
    }

    pub fn outcomes(&self) -> OutcomeMap {
        self.jobs
            .iter()
            .map(|(name, info)| (name.clone(), info.outcome))
            .collect()
    }

    /// Whether every dependency of `job` has succeeded in this run.
    ///
    /// Returns `None` if the job is unknown.
    pub fn deps_satisfied(&self, job: &str) -> Option<bool> {
        let info = self.jobs.get(job)?;
        Some(info.spec.deps.iter().all(|dep| {
            self.jobs
                .get(dep)
                .is_some_and(|d| d.outcome == JobOutcome::Succeeded)
        }))
    }

    pub fn job_names(&self) -> impl Iterator<Item = &str> {
        self.pipeline.topological_order()
    }

    /// Propagate skips from ineligible jobs and dispatch the roots.
    pub fn start(&mut self) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        let skipped_at_filter: Vec<JobName> = self
            .pipeline
            .topological_order()
            .filter(|name| self.outcome_of(name) == Some(JobOutcome::Skipped))
            .map(str::to_string)
            .collect();

        let mut manager = StateManager::new(&self.pipeline, &mut self.jobs, self.run_id);
        for name in skipped_at_filter {
            step.newly_skipped.extend(manager.skip_dependents(&name));
        }
        step.newly_scheduled = manager.collect_new_ready_jobs(&self.event);
        step.run_just_finished = self.maybe_finish_run();
        step
    }

    /// Handle completion of a job (production API).
    pub fn handle_completion(&mut self, job: &str, result: JobResult) -> Vec<ScheduledJob> {
        self.step_completion(job, result).newly_scheduled
    }

    /// Manual-step variant of `handle_completion` that returns a rich
    /// [`SchedulerStep`].
    pub fn step_completion(&mut self, job: &str, result: JobResult) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        if self.outcome_of(job) != Some(JobOutcome::Running) {
            warn!(
                job = %job,
                run_id = self.run_id,
                outcome = ?self.outcome_of(job),
                "completion for a job that is not running; ignoring"
            );
            return step;
        }

        let mut manager = StateManager::new(&self.pipeline, &mut self.jobs, self.run_id);
        match result {
            JobResult::Success => {
                manager.transition(job, JobOutcome::Succeeded);
                debug!(job = %job, run_id = self.run_id, "job succeeded");
                manager.release_dependents(job);
                step.newly_scheduled = manager.collect_new_ready_jobs(&self.event);
            }
            JobResult::Failed {
                exit_code,
                diagnostics,
            } => {
                manager.transition(job, JobOutcome::Failed);
                manager.set_diagnostics(job, diagnostics);
                warn!(
                    job = %job,
                    run_id = self.run_id,
                    exit_code = ?exit_code,
                    "job failed; skipping its dependents in this run"
                );
                step.newly_failed.push(job.to_string());
                step.newly_skipped = manager.skip_dependents(job);
            }
        }

        step.run_just_finished = self.maybe_finish_run();
        step
    }

    /// Cancel the run: every pending or running job becomes cancelled.
    ///
    /// Returns the jobs that were running (and need a stop signal).
    pub fn cancel(&mut self) -> Vec<JobName> {
        let running: Vec<JobName> = self
            .jobs
            .values()
            .filter(|i| i.outcome == JobOutcome::Running)
            .map(|i| i.name().to_string())
            .collect();

        let mut manager = StateManager::new(&self.pipeline, &mut self.jobs, self.run_id);
        let cancelled = manager.cancel_all();
        info!(run_id = self.run_id, cancelled = cancelled.len(), "run cancelled");
        self.maybe_finish_run();
        running
    }

    pub fn report(&self) -> RunReport {
        let jobs = self
            .jobs
            .iter()
            .map(|(name, info)| {
                (
                    name.clone(),
                    JobReport {
                        outcome: info.outcome,
                        diagnostics: info.diagnostics.clone(),
                    },
                )
            })
            .collect();

        RunReport {
            run_id: self.run_id,
            event: (*self.event).clone(),
            jobs,
        }
    }

    /// Returns `true` if this call observed the run becoming terminal.
    fn maybe_finish_run(&mut self) -> bool {
        if self.finished {
            return false;
        }

        let manager = StateManager::new(&self.pipeline, &mut self.jobs, self.run_id);
        if manager.all_jobs_terminal() {
            info!(run_id = self.run_id, "scheduler: all jobs terminal; run finished");
            self.finished = true;
            true
        } else {
            false
        }
    }
}
