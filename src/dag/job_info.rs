// src/dag/job_info.rs

//! Static job descriptions and per-run job state.

use std::sync::Arc;

use crate::config::model::{JobAction, JobConfig, TriggerRule};
use crate::types::{Event, JobName, JobOutcome, RunId};

/// Static description of a job, derived once from config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: JobName,
    pub action: JobAction,
    pub cmd: Option<String>,
    pub platform: String,
    /// Direct dependencies (`after = [...]`), in declaration order.
    pub deps: Vec<JobName>,
    pub trigger: TriggerRule,
    pub produces: Vec<String>,
    pub consumes: Vec<String>,
    pub publish_capable: bool,
    pub toolchain: Option<String>,
    pub cache_files: Vec<String>,
    pub hash_source: bool,
}

impl JobSpec {
    pub fn from_config(name: JobName, cfg: &JobConfig) -> Self {
        Self {
            name,
            action: cfg.action,
            cmd: cfg.cmd.clone(),
            platform: cfg.platform.clone(),
            deps: cfg.after.clone(),
            trigger: cfg.trigger,
            produces: cfg.produces.clone(),
            consumes: cfg.consumes.clone(),
            publish_capable: cfg.publish_capable,
            toolchain: cfg.toolchain.clone(),
            cache_files: cfg.cache_files.clone(),
            hash_source: cfg.hash_source,
        }
    }
}

/// Per-run state of one job.
#[derive(Debug, Clone)]
pub struct JobInfo {
    pub spec: Arc<JobSpec>,
    pub outcome: JobOutcome,
    /// Dependencies that have not succeeded yet (the job's in-degree).
    pub remaining_deps: usize,
    pub publishing: bool,
    /// Captured diagnostic output (failures) or skip reason.
    pub diagnostics: Option<String>,
}

impl JobInfo {
    pub fn new(spec: Arc<JobSpec>, outcome: JobOutcome, publishing: bool) -> Self {
        let remaining_deps = spec.deps.len();
        Self {
            spec,
            outcome,
            remaining_deps,
            publishing,
            diagnostics: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

/// An artifact a scheduled job reads: `(producing job, artifact name)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactInput {
    pub job: JobName,
    pub name: String,
}

/// Description of a job that the scheduler wants the executor to run now.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub run_id: RunId,
    pub name: JobName,
    pub spec: Arc<JobSpec>,
    pub event: Arc<Event>,
    pub publishing: bool,
    pub inputs: Vec<ArtifactInput>,
}
