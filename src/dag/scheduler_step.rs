// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::job_info::ScheduledJob;
use crate::types::JobName;

/// Structured result of a single scheduler "step".
///
/// Useful for tests that want to manually step the DAG and make assertions
/// about what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Jobs that became ready and were marked running in this step.
    pub newly_scheduled: Vec<ScheduledJob>,
    /// Jobs that were newly marked failed in this step.
    pub newly_failed: Vec<JobName>,
    /// Jobs that were newly skipped because an upstream job did not succeed.
    pub newly_skipped: Vec<JobName>,
    /// Whether this step made the run terminal.
    pub run_just_finished: bool,
}
