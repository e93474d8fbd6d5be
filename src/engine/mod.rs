// src/engine/mod.rs

//! Orchestration engine for shipdag.
//!
//! This module ties together:
//! - the per-run DAG schedulers (one per active run)
//! - the concurrency groups (at most one active run per ref)
//! - the run queue (what happens when events arrive while a run is active)
//! - the main runtime event loop that reacts to:
//!   - incoming CI events
//!   - job completion events
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use crate::types::{Event, JobName, RunId};

/// Outcome of one job action, as reported by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Success,
    Failed {
        exit_code: Option<i32>,
        diagnostics: String,
    },
}

impl JobResult {
    pub fn failed(exit_code: Option<i32>, diagnostics: impl Into<String>) -> Self {
        JobResult::Failed {
            exit_code,
            diagnostics: diagnostics.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success)
    }
}

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// If true, exit the runtime once no run is active and no event is
    /// queued (the CLI processes exactly one event).
    pub exit_when_idle: bool,
}

/// Events flowing into the runtime from the CLI, executors, etc.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A CI event arrived and should start a run.
    EventReceived(Event),
    /// A job action finished with a concrete result.
    JobCompleted {
        run_id: RunId,
        job: JobName,
        result: JobResult,
    },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod board;
pub mod core;
pub mod event_handlers;
pub mod queue;
pub mod runs;
pub mod runtime;

pub use board::{RunBoard, RunSnapshot};
pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use queue::RunQueue;
pub use runs::RunSet;
pub use runtime::Runtime;
