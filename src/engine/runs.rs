// src/engine/runs.rs

//! Active runs and their concurrency groups.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::dag::{Pipeline, Scheduler, SchedulerStep};
use crate::report::RunReport;
use crate::trigger::TriggerPolicy;
use crate::types::{Event, RunId};

/// Every run that has not finished yet, plus the ref -> run index used to
/// enforce "at most one active run per concurrency group".
#[derive(Debug)]
pub struct RunSet {
    pipeline: Arc<Pipeline>,
    policy: TriggerPolicy,
    runs: BTreeMap<RunId, Scheduler>,
    active_by_key: HashMap<String, RunId>,
    last_run_id: RunId,
}

impl RunSet {
    pub fn new(pipeline: Arc<Pipeline>, policy: TriggerPolicy) -> Self {
        Self {
            pipeline,
            policy,
            runs: BTreeMap::new(),
            active_by_key: HashMap::new(),
            last_run_id: 0,
        }
    }

    /// The active run of a concurrency group.
    pub fn active_on(&self, key: &str) -> Option<RunId> {
        self.active_by_key.get(key).copied()
    }

    pub fn get(&self, run_id: RunId) -> Option<&Scheduler> {
        self.runs.get(&run_id)
    }

    pub fn get_mut(&mut self, run_id: RunId) -> Option<&mut Scheduler> {
        self.runs.get_mut(&run_id)
    }

    pub fn is_idle(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn run_ids(&self) -> Vec<RunId> {
        self.runs.keys().copied().collect()
    }

    /// Create a run for `event` (with the next run id) and start it.
    pub fn start(&mut self, event: Event) -> (RunId, SchedulerStep) {
        self.last_run_id += 1;
        let run_id = self.last_run_id;
        let key = event.concurrency_key();

        let mut scheduler = Scheduler::for_run(Arc::clone(&self.pipeline), &self.policy, run_id, event);
        let step = scheduler.start();

        self.runs.insert(run_id, scheduler);
        self.active_by_key.insert(key, run_id);
        (run_id, step)
    }

    /// Forget a run. Returns its concurrency key and final report.
    pub fn finish(&mut self, run_id: RunId) -> Option<(String, RunReport)> {
        let scheduler = self.runs.remove(&run_id)?;
        let key = scheduler.event().concurrency_key();
        if self.active_by_key.get(&key) == Some(&run_id) {
            self.active_by_key.remove(&key);
        }
        Some((key, scheduler.report()))
    }
}
