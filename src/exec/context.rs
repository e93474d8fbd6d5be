// src/exec/context.rs

//! Collaborators shared by every job action.

use std::fmt;
use std::sync::Arc;

use crate::artifact::ArtifactStore;
use crate::cache::CacheResolver;
use crate::config::Settings;
use crate::exec::producer::{BuildProducer, TestRunner};
use crate::release::{Attestor, ReleaseStore};

/// Everything a job action may touch. Built once per process and shared
/// (behind `Arc`) by all job tasks.
#[derive(Clone)]
pub struct ExecContext {
    pub settings: Arc<Settings>,
    pub artifacts: ArtifactStore,
    pub cache: CacheResolver,
    pub producer: Arc<dyn BuildProducer>,
    pub tests: Arc<dyn TestRunner>,
    /// `None` when no signing key is configured; publishable artifacts then
    /// stay unattested and the release gate refuses them.
    pub attestor: Option<Arc<dyn Attestor>>,
    pub releases: Arc<dyn ReleaseStore>,
}

impl fmt::Debug for ExecContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecContext")
            .field("settings", &self.settings)
            .field("attestor", &self.attestor.is_some())
            .finish_non_exhaustive()
    }
}
