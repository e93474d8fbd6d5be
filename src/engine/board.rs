// src/engine/board.rs

//! Read-only view of run state for observers.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::report::{RunReport, RunStatus};
use crate::types::{Event, JobOutcome, OutcomeMap, RunId};

/// Latest known state of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSnapshot {
    pub event: Event,
    pub outcomes: OutcomeMap,
    /// Set once the run is terminal.
    pub status: Option<RunStatus>,
}

/// Shared board of `job -> outcome` per run.
///
/// Only the runtime writes to it; every clone reads the same state.
#[derive(Debug, Clone, Default)]
pub struct RunBoard {
    inner: Arc<RwLock<BTreeMap<RunId, RunSnapshot>>>,
}

impl RunBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn update(&self, run_id: RunId, event: Event, outcomes: OutcomeMap) {
        let mut runs = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let snapshot = runs.entry(run_id).or_insert_with(|| RunSnapshot {
            event: event.clone(),
            outcomes: OutcomeMap::new(),
            status: None,
        });
        snapshot.event = event;
        snapshot.outcomes = outcomes;
    }

    pub(crate) fn finish(&self, report: &RunReport) {
        let mut runs = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        runs.insert(
            report.run_id,
            RunSnapshot {
                event: report.event.clone(),
                outcomes: report.outcomes(),
                status: Some(report.status()),
            },
        );
    }

    pub fn snapshot(&self, run_id: RunId) -> Option<RunSnapshot> {
        let runs = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        runs.get(&run_id).cloned()
    }

    pub fn outcome_of(&self, run_id: RunId, job: &str) -> Option<JobOutcome> {
        let runs = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        runs.get(&run_id)
            .and_then(|s| s.outcomes.get(job))
            .copied()
    }

    /// Ids of every run seen so far, oldest first.
    pub fn run_ids(&self) -> Vec<RunId> {
        let runs = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        runs.keys().copied().collect()
    }

    /// Runs that have not finished yet.
    pub fn active_runs(&self) -> Vec<RunId> {
        let runs = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        runs.iter()
            .filter(|(_, s)| s.status.is_none())
            .map(|(id, _)| *id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::JobReport;

    #[test]
    fn clones_observe_updates_and_completion() {
        let board = RunBoard::new();
        let reader = board.clone();
        let event = Event::push("main", "abc");

        let mut outcomes = OutcomeMap::new();
        outcomes.insert("build".into(), JobOutcome::Running);
        board.update(1, event.clone(), outcomes);

        assert_eq!(reader.outcome_of(1, "build"), Some(JobOutcome::Running));
        assert_eq!(reader.active_runs(), vec![1]);

        let mut jobs = BTreeMap::new();
        jobs.insert(
            "build".to_string(),
            JobReport {
                outcome: JobOutcome::Succeeded,
                diagnostics: None,
            },
        );
        board.finish(&RunReport {
            run_id: 1,
            event,
            jobs,
        });

        let snapshot = reader.snapshot(1).unwrap();
        assert_eq!(snapshot.status, Some(RunStatus::Succeeded));
        assert_eq!(reader.outcome_of(1, "build"), Some(JobOutcome::Succeeded));
        assert!(reader.active_runs().is_empty());
        assert_eq!(reader.run_ids(), vec![1]);
    }
}
