// src/types.rs

//! Small shared types used across the scheduler, executor and stores.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;

/// Canonical job name type.
pub type JobName = String;

/// Monotonically increasing run identifier.
pub type RunId = u64;

/// Kind of event that triggers a run.
///
/// Parsing never fails: kinds we do not recognise are kept as `Other` so that
/// the trigger evaluator can fail closed on them instead of erroring.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Push,
    PullRequest,
    Tag,
    Manual,
    Other(String),
}

impl FromStr for EventKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "push" => EventKind::Push,
            "pull_request" | "pull-request" | "pr" => EventKind::PullRequest,
            "tag" => EventKind::Tag,
            "manual" | "workflow_dispatch" => EventKind::Manual,
            other => EventKind::Other(other.to_string()),
        })
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Push => f.write_str("push"),
            EventKind::PullRequest => f.write_str("pull_request"),
            EventKind::Tag => f.write_str("tag"),
            EventKind::Manual => f.write_str("manual"),
            EventKind::Other(kind) => write!(f, "other({kind})"),
        }
    }
}

/// A triggering event: `(kind, ref, commit)`.
///
/// For `pull_request` events the ref is the *target* branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub git_ref: String,
    pub commit: String,
}

impl Event {
    pub fn new(kind: EventKind, git_ref: impl Into<String>, commit: impl Into<String>) -> Self {
        Self {
            kind,
            git_ref: git_ref.into(),
            commit: commit.into(),
        }
    }

    pub fn push(branch: &str, commit: &str) -> Self {
        Self::new(EventKind::Push, branch, commit)
    }

    pub fn tag(tag: &str, commit: &str) -> Self {
        Self::new(EventKind::Tag, tag, commit)
    }

    pub fn pull_request(target: &str, commit: &str) -> Self {
        Self::new(EventKind::PullRequest, target, commit)
    }

    pub fn manual(git_ref: &str, commit: &str) -> Self {
        Self::new(EventKind::Manual, git_ref, commit)
    }

    /// The ref with any `refs/heads/` or `refs/tags/` prefix removed.
    pub fn short_ref(&self) -> &str {
        self.git_ref
            .strip_prefix("refs/heads/")
            .or_else(|| self.git_ref.strip_prefix("refs/tags/"))
            .unwrap_or(&self.git_ref)
    }

    /// Key of the concurrency group this event's run belongs to.
    ///
    /// Pull requests carry their target branch as ref, so they get a group
    /// of their own instead of superseding pushes to that branch.
    pub fn concurrency_key(&self) -> String {
        match self.kind {
            EventKind::PullRequest => format!("pull_request:{}", self.short_ref()),
            _ => self.short_ref().to_string(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} @ {}", self.kind, self.short_ref(), self.commit)
    }
}

/// Outcome of a job within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobOutcome {
    Pending,
    Skipped,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobOutcome {
    /// Terminal outcomes are immutable once reached within a run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobOutcome::Succeeded | JobOutcome::Failed | JobOutcome::Skipped | JobOutcome::Cancelled
        )
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobOutcome::Pending => "pending",
            JobOutcome::Skipped => "skipped",
            JobOutcome::Running => "running",
            JobOutcome::Succeeded => "succeeded",
            JobOutcome::Failed => "failed",
            JobOutcome::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Snapshot of every job outcome in a run.
pub type OutcomeMap = BTreeMap<JobName, JobOutcome>;

/// Behaviour when a new event arrives for a ref whose run is still active.
///
/// - `Cancel` (default): cancel the active run, then start the new one.
/// - `Queue`: let the active run finish; remember only the latest waiting
///   event for that ref and start it afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SupersededRunBehaviour {
    #[default]
    Cancel,
    Queue,
}

impl FromStr for SupersededRunBehaviour {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cancel" => Ok(SupersededRunBehaviour::Cancel),
            "queue" => Ok(SupersededRunBehaviour::Queue),
            other => Err(format!(
                "invalid superseded_run_behaviour: {other} (expected \"cancel\" or \"queue\")"
            )),
        }
    }
}

/// Immutable, cheaply cloneable byte payload.
#[derive(Clone, PartialEq, Eq)]
pub struct Payload(Arc<[u8]>);

impl Payload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Arc::from(bytes.into()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// blake3 hex digest of the payload contents.
    pub fn content_hash(&self) -> String {
        blake3::hash(&self.0).to_hex().to_string()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload({} bytes)", self.0.len())
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::new(s.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(v: Vec<u8>) -> Self {
        Payload::new(v)
    }
}
