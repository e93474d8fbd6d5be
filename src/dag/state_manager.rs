// src/dag/state_manager.rs

//! Per-run outcome transitions for jobs in the scheduler.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dag::job_info::{JobInfo, ScheduledJob};
use crate::dag::Pipeline;
use crate::types::{Event, JobName, JobOutcome, RunId};

/// Applies outcome transitions for one run.
///
/// Every mutation goes through [`StateManager::transition`], which refuses
/// to leave a terminal outcome.
pub struct StateManager<'a> {
    pipeline: &'a Pipeline,
    jobs: &'a mut HashMap<JobName, JobInfo>,
    run_id: RunId,
}

impl<'a> StateManager<'a> {
    pub fn new(
        pipeline: &'a Pipeline,
        jobs: &'a mut HashMap<JobName, JobInfo>,
        run_id: RunId,
    ) -> Self {
        Self {
            pipeline,
            jobs,
            run_id,
        }
    }

    /// Move `name` to `to`. Returns `false` (and changes nothing) when the job
    /// is unknown or already terminal.
    pub fn transition(&mut self, name: &str, to: JobOutcome) -> bool {
        let Some(info) = self.jobs.get_mut(name) else {
            warn!(job = %name, run_id = self.run_id, "transition for unknown job; ignoring");
            return false;
        };

        if info.outcome.is_terminal() {
            warn!(
                job = %name,
                run_id = self.run_id,
                from = %info.outcome,
                to = %to,
                "job outcome is terminal; ignoring transition"
            );
            return false;
        }

        debug!(job = %name, run_id = self.run_id, from = %info.outcome, to = %to, "job transition");
        info.outcome = to;
        true
    }

    /// Attach diagnostic text to a job.
    pub fn set_diagnostics(&mut self, name: &str, diagnostics: impl Into<String>) {
        if let Some(info) = self.jobs.get_mut(name) {
            info.diagnostics = Some(diagnostics.into());
        }
    }

    /// A dependency of each direct dependent of `name` has succeeded.
    pub fn release_dependents(&mut self, name: &str) {
        for dependent in self.pipeline.graph().dependents_of(name) {
            if let Some(info) = self.jobs.get_mut(dependent) {
                if info.outcome == JobOutcome::Pending {
                    info.remaining_deps = info.remaining_deps.saturating_sub(1);
                    debug!(
                        job = %dependent,
                        run_id = self.run_id,
                        remaining = info.remaining_deps,
                        "dependency succeeded"
                    );
                }
            }
        }
    }

    /// Mark every pending job downstream of `origin` as skipped.
    ///
    /// Returns the newly skipped jobs.
    pub fn skip_dependents(&mut self, origin: &str) -> Vec<JobName> {
        let origin_outcome = self
            .jobs
            .get(origin)
            .map(|i| i.outcome)
            .unwrap_or(JobOutcome::Skipped);

        let mut stack: Vec<(JobName, JobName)> = self
            .pipeline
            .graph()
            .dependents_of(origin)
            .iter()
            .map(|d| (d.clone(), origin.to_string()))
            .collect();

        let mut newly_skipped = Vec::new();

        while let Some((name, cause)) = stack.pop() {
            let pending = self
                .jobs
                .get(&name)
                .is_some_and(|i| i.outcome == JobOutcome::Pending);
            if !pending {
                continue;
            }

            self.transition(&name, JobOutcome::Skipped);
            self.set_diagnostics(
                &name,
                format!("skipped: dependency '{cause}' did not succeed (origin '{origin}' {origin_outcome})"),
            );
            debug!(job = %name, run_id = self.run_id, cause = %cause, "skipping dependent");
            newly_skipped.push(name.clone());

            for next in self.pipeline.graph().dependents_of(&name) {
                stack.push((next.clone(), name.clone()));
            }
        }

        newly_skipped
    }

    /// Collect pending jobs whose in-degree reached zero, mark them running
    /// and return them as [`ScheduledJob`]s.
    pub fn collect_new_ready_jobs(&mut self, event: &Arc<Event>) -> Vec<ScheduledJob> {
        let candidates: Vec<JobName> = self
            .pipeline
            .topological_order()
            .filter(|name| {
                self.jobs
                    .get(*name)
                    .is_some_and(|i| i.outcome == JobOutcome::Pending && i.remaining_deps == 0)
            })
            .map(str::to_string)
            .collect();

        let mut ready = Vec::new();
        for name in candidates {
            if !self.transition(&name, JobOutcome::Running) {
                continue;
            }
            let Some(info) = self.jobs.get(&name) else {
                continue;
            };

            info!(
                job = %name,
                run_id = self.run_id,
                action = ?info.spec.action,
                platform = %info.spec.platform,
                publishing = info.publishing,
                "dependencies succeeded; dispatching job"
            );

            ready.push(ScheduledJob {
                run_id: self.run_id,
                name: name.clone(),
                spec: Arc::clone(&info.spec),
                event: Arc::clone(event),
                publishing: info.publishing,
                inputs: self.pipeline.inputs_of(&info.spec),
            });
        }

        ready
    }

    /// Mark every non-terminal job cancelled. Returns the affected jobs.
    pub fn cancel_all(&mut self) -> Vec<JobName> {
        let live: Vec<JobName> = self
            .jobs
            .values()
            .filter(|i| !i.outcome.is_terminal())
            .map(|i| i.name().to_string())
            .collect();

        for name in live.iter() {
            self.transition(name, JobOutcome::Cancelled);
        }
        live
    }

    /// Check if all jobs are in a terminal state.
    pub fn all_jobs_terminal(&self) -> bool {
        self.jobs.values().all(|i| i.outcome.is_terminal())
    }
}
