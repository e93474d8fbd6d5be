// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`graph`] holds the adjacency lists and topological order.
//! - [`pipeline`] is the static job table shared by all runs.
//! - [`scheduler`] is the per-run state machine deciding which jobs are
//!   ready, which are skipped and when the run is terminal.
//! - [`job_info`] provides job specs and scheduled job types.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] applies outcome transitions.

pub mod graph;
pub mod job_info;
pub mod pipeline;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;

pub use graph::DagGraph;
pub use job_info::{ArtifactInput, JobInfo, JobSpec, ScheduledJob};
pub use pipeline::Pipeline;
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
