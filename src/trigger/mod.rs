// src/trigger/mod.rs

//! Trigger evaluation: which jobs of the pipeline an event makes eligible.
//!
//! Precedence:
//! 1. a tag matching the release pattern: every job, release included
//! 2. a push to the default branch: every job except release-only ones
//! 3. a pull request targeting the default branch: same as (2), but
//!    publish-capable jobs run with `publishing = false`
//! 4. manual dispatch: same as (2)
//!
//! Anything else makes no job eligible.

use globset::{Glob, GlobMatcher};

use crate::config::model::TriggerRule;
use crate::config::Settings;
use crate::dag::JobSpec;
use crate::errors::{Result, ShipdagError};
use crate::types::{Event, EventKind};

/// The event classes the trigger policy distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventClass {
    ReleaseTag,
    DefaultBranchPush,
    PullRequest,
    Manual,
}

impl TriggerRule {
    /// Event classes for which a job with this rule is eligible.
    pub fn event_classes(self) -> &'static [EventClass] {
        match self {
            TriggerRule::Standard => &[
                EventClass::ReleaseTag,
                EventClass::DefaultBranchPush,
                EventClass::PullRequest,
                EventClass::Manual,
            ],
            TriggerRule::Release => &[EventClass::ReleaseTag],
        }
    }
}

/// Result of evaluating one job against one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Ineligible,
    /// Eligible; `publishing = false` means the action must avoid side
    /// effects such as pushing images or signing.
    Eligible { publishing: bool },
}

impl Eligibility {
    pub fn is_eligible(self) -> bool {
        matches!(self, Eligibility::Eligible { .. })
    }
}

/// Pure trigger policy built from [`Settings`].
#[derive(Debug, Clone)]
pub struct TriggerPolicy {
    default_branch: String,
    release_tags: GlobMatcher,
}

impl TriggerPolicy {
    pub fn new(default_branch: impl Into<String>, release_tag_pattern: &str) -> Result<Self> {
        let glob = Glob::new(release_tag_pattern).map_err(|e| {
            ShipdagError::ConfigError(format!(
                "invalid release tag pattern '{release_tag_pattern}': {e}"
            ))
        })?;
        Ok(Self {
            default_branch: default_branch.into(),
            release_tags: glob.compile_matcher(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(settings.default_branch.clone(), &settings.release_tag_pattern)
    }

    /// Classify an event, or `None` when it matches no rule.
    pub fn classify(&self, event: &Event) -> Option<EventClass> {
        let short_ref = event.short_ref();
        match &event.kind {
            EventKind::Tag if self.release_tags.is_match(short_ref) => Some(EventClass::ReleaseTag),
            EventKind::Push if short_ref == self.default_branch => {
                Some(EventClass::DefaultBranchPush)
            }
            EventKind::PullRequest if short_ref == self.default_branch => {
                Some(EventClass::PullRequest)
            }
            EventKind::Manual => Some(EventClass::Manual),
            _ => None,
        }
    }

    /// Full eligibility decision for `job` under `event`.
    pub fn evaluate(&self, job: &JobSpec, event: &Event) -> Eligibility {
        let Some(class) = self.classify(event) else {
            return Eligibility::Ineligible;
        };

        if !job.trigger.event_classes().contains(&class) {
            return Eligibility::Ineligible;
        }

        let publishing = !(class == EventClass::PullRequest && job.publish_capable);
        Eligibility::Eligible { publishing }
    }

    /// `eligible(job, event) -> bool`.
    pub fn eligible(&self, job: &JobSpec, event: &Event) -> bool {
        self.evaluate(job, event).is_eligible()
    }
}
