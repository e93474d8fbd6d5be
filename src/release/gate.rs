// src/release/gate.rs

//! The final, fail-closed publication step of a release run.

use std::sync::Arc;

use tracing::{info, warn};

use crate::artifact::{Artifact, ArtifactStore};
use crate::errors::{Result, ShipdagError};
use crate::release::store::{PublishOutcome, ReleaseArtifact, ReleaseStore};
use crate::types::RunId;

pub struct ReleaseGate {
    artifacts: ArtifactStore,
    releases: Arc<dyn ReleaseStore>,
}

impl ReleaseGate {
    pub fn new(artifacts: ArtifactStore, releases: Arc<dyn ReleaseStore>) -> Self {
        Self { artifacts, releases }
    }

    /// Publish every visible publishable artifact of `run_id` as
    /// `release_id`.
    ///
    /// Nothing is published unless every candidate carries a complete
    /// attestation bundle.
    pub fn run(&self, run_id: RunId, release_id: &str) -> Result<PublishOutcome> {
        let candidates = self.artifacts.publishable(run_id)?;
        if candidates.is_empty() {
            warn!(run_id, release = %release_id, "no publishable artifacts; refusing to publish");
            return Err(ShipdagError::NothingToPublish { run_id });
        }

        let missing: Vec<String> = candidates
            .iter()
            .filter(|a| !a.attestation.as_ref().is_some_and(|b| b.is_complete()))
            .map(|a| format!("{}/{}", a.id.job, a.id.name))
            .collect();
        if !missing.is_empty() {
            warn!(run_id, release = %release_id, missing = ?missing, "attestation missing; nothing published");
            return Err(ShipdagError::AttestationMissing(missing));
        }

        let artifacts: Vec<ReleaseArtifact> = candidates.iter().filter_map(to_release).collect();
        let outcome = self.releases.publish(release_id, &artifacts)?;
        info!(
            run_id,
            release = %release_id,
            artifacts = artifacts.len(),
            outcome = %outcome,
            "release gate finished"
        );
        Ok(outcome)
    }
}

fn to_release(artifact: &Arc<Artifact>) -> Option<ReleaseArtifact> {
    let attestation = artifact.attestation.clone()?;
    Some(ReleaseArtifact {
        name: artifact.id.name.clone(),
        payload: artifact.payload.clone(),
        content_hash: artifact.content_hash.clone(),
        attestation,
    })
}
