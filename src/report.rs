// src/report.rs

//! End-of-run report: every job's outcome and, for failures, the captured
//! diagnostics.

use std::collections::BTreeMap;
use std::fmt;

use crate::types::{Event, JobName, JobOutcome, OutcomeMap, RunId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub outcome: JobOutcome,
    pub diagnostics: Option<String>,
}

/// Overall status derived from job outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// No job failed or was cancelled (skips are fine).
    Succeeded,
    Failed,
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Succeeded => f.write_str("succeeded"),
            RunStatus::Failed => f.write_str("failed"),
            RunStatus::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    pub event: Event,
    pub jobs: BTreeMap<JobName, JobReport>,
}

impl RunReport {
    pub fn status(&self) -> RunStatus {
        let outcomes = || self.jobs.values().map(|j| j.outcome);
        if outcomes().any(|o| o == JobOutcome::Cancelled) {
            RunStatus::Cancelled
        } else if outcomes().any(|o| o == JobOutcome::Failed) {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status() == RunStatus::Succeeded
    }

    pub fn outcome_of(&self, job: &str) -> Option<JobOutcome> {
        self.jobs.get(job).map(|j| j.outcome)
    }

    pub fn outcomes(&self) -> OutcomeMap {
        self.jobs
            .iter()
            .map(|(name, j)| (name.clone(), j.outcome))
            .collect()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "run {} ({}): {}", self.run_id, self.event, self.status())?;
        for (name, job) in self.jobs.iter() {
            writeln!(f, "  {name:<32} {}", job.outcome)?;
            if job.outcome == JobOutcome::Failed {
                if let Some(diag) = job.diagnostics.as_deref() {
                    for line in diag.lines() {
                        writeln!(f, "      | {line}")?;
                    }
                }
            }
        }
        Ok(())
    }
}
