// src/artifact/mod.rs

//! Run-scoped artifact store.
//!
//! Jobs `put` artifacts while they run; the writes are staged and invisible
//! until the coordinator calls [`ArtifactStore::commit_job`] after the job's
//! outcome became `succeeded`. Consumers only ever see committed artifacts.
//! Cross-run reuse goes through the cache, never through this store.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::errors::{Result, ShipdagError};
use crate::types::{JobName, Payload, RunId};

/// Signature + SBOM + provenance statement attached to a publishable artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationBundle {
    pub signature: String,
    pub sbom: String,
    pub provenance: String,
}

impl AttestationBundle {
    /// All three parts present and non-empty.
    pub fn is_complete(&self) -> bool {
        !self.signature.trim().is_empty()
            && !self.sbom.trim().is_empty()
            && !self.provenance.trim().is_empty()
    }
}

/// Identity of an artifact: `(run, producing job, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactId {
    pub run_id: RunId,
    pub job: JobName,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Artifact {
    pub id: ArtifactId,
    pub payload: Payload,
    pub content_hash: String,
    pub publishable: bool,
    pub attestation: Option<AttestationBundle>,
}

/// Handle returned by `put`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub id: ArtifactId,
    pub content_hash: String,
}

/// Extra properties of an artifact being written.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub publishable: bool,
    pub attestation: Option<AttestationBundle>,
}

type Slot = (JobName, String);

#[derive(Debug, Default)]
struct RunArtifacts {
    staged: HashMap<Slot, Artifact>,
    visible: BTreeMap<Slot, Arc<Artifact>>,
}

/// How many cancelled runs keep answering `StaleArtifact`. Jobs of a
/// cancelled run are aborted after the grace period, so only the most recent
/// ones can still touch the store.
const CANCELLED_RUN_MEMORY: usize = 1024;

#[derive(Debug, Default)]
struct StoreInner {
    runs: HashMap<RunId, RunArtifacts>,
    cancelled: HashSet<RunId>,
    /// `cancelled` in insertion order, oldest first.
    cancelled_order: VecDeque<RunId>,
}

impl StoreInner {
    fn mark_cancelled(&mut self, run_id: RunId) {
        if !self.cancelled.insert(run_id) {
            return;
        }
        self.cancelled_order.push_back(run_id);
        while self.cancelled_order.len() > CANCELLED_RUN_MEMORY {
            if let Some(oldest) = self.cancelled_order.pop_front() {
                self.cancelled.remove(&oldest);
                self.runs.remove(&oldest);
            }
        }
    }
}

/// Shared handle to the artifact store. Cloning is cheap.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stage a plain (non-publishable) artifact.
    pub fn put(&self, run_id: RunId, job: &str, name: &str, payload: Payload) -> Result<ArtifactRef> {
        self.put_with(run_id, job, name, payload, PutOptions::default())
    }

    /// Stage an artifact. It becomes visible when `job` is committed.
    pub fn put_with(
        &self,
        run_id: RunId,
        job: &str,
        name: &str,
        payload: Payload,
        options: PutOptions,
    ) -> Result<ArtifactRef> {
        let mut inner = self.lock();
        if inner.cancelled.contains(&run_id) {
            return Err(ShipdagError::StaleArtifact { run_id });
        }

        let run = inner.runs.entry(run_id).or_default();
        let slot = (job.to_string(), name.to_string());
        if run.staged.contains_key(&slot) || run.visible.contains_key(&slot) {
            return Err(ShipdagError::DuplicateArtifact {
                run_id,
                job: job.to_string(),
                name: name.to_string(),
            });
        }

        let id = ArtifactId {
            run_id,
            job: job.to_string(),
            name: name.to_string(),
        };
        let content_hash = payload.content_hash();
        debug!(run_id, job = %job, artifact = %name, bytes = payload.len(), "staged artifact");

        run.staged.insert(
            slot,
            Artifact {
                id: id.clone(),
                payload,
                content_hash: content_hash.clone(),
                publishable: options.publishable,
                attestation: options.attestation,
            },
        );

        Ok(ArtifactRef { id, content_hash })
    }

    /// Make every artifact staged by `job` visible. Returns how many.
    pub fn commit_job(&self, run_id: RunId, job: &str) -> usize {
        let mut inner = self.lock();
        if inner.cancelled.contains(&run_id) {
            return 0;
        }
        let Some(run) = inner.runs.get_mut(&run_id) else {
            return 0;
        };

        let slots: Vec<Slot> = run
            .staged
            .keys()
            .filter(|(j, _)| j == job)
            .cloned()
            .collect();
        for slot in slots.iter() {
            if let Some(artifact) = run.staged.remove(slot) {
                run.visible.insert(slot.clone(), Arc::new(artifact));
            }
        }

        if !slots.is_empty() {
            info!(run_id, job = %job, count = slots.len(), "artifacts visible");
        }
        slots.len()
    }

    /// Drop whatever `job` staged (it failed or was cancelled).
    pub fn discard_job(&self, run_id: RunId, job: &str) {
        let mut inner = self.lock();
        if let Some(run) = inner.runs.get_mut(&run_id) {
            run.staged.retain(|(j, _), _| j != job);
        }
    }

    /// Read a visible artifact's payload.
    pub fn get(&self, run_id: RunId, job: &str, name: &str) -> Result<Payload> {
        self.get_artifact(run_id, job, name)
            .map(|a| a.payload.clone())
    }

    pub fn get_artifact(&self, run_id: RunId, job: &str, name: &str) -> Result<Arc<Artifact>> {
        let inner = self.lock();
        if inner.cancelled.contains(&run_id) {
            return Err(ShipdagError::StaleArtifact { run_id });
        }

        inner
            .runs
            .get(&run_id)
            .and_then(|run| run.visible.get(&(job.to_string(), name.to_string())))
            .cloned()
            .ok_or_else(|| ShipdagError::ArtifactNotFound {
                run_id,
                job: job.to_string(),
                name: name.to_string(),
            })
    }

    /// Visible publishable artifacts of a run, ordered by (job, name).
    pub fn publishable(&self, run_id: RunId) -> Result<Vec<Arc<Artifact>>> {
        let inner = self.lock();
        if inner.cancelled.contains(&run_id) {
            return Err(ShipdagError::StaleArtifact { run_id });
        }

        Ok(inner
            .runs
            .get(&run_id)
            .map(|run| {
                run.visible
                    .values()
                    .filter(|a| a.publishable)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    /// The run was superseded: drop its artifacts and answer `Stale` from now on.
    pub fn invalidate_run(&self, run_id: RunId) {
        let mut inner = self.lock();
        inner.runs.remove(&run_id);
        inner.mark_cancelled(run_id);
        debug!(run_id, "invalidated run artifacts");
    }

    /// Garbage-collect a finished run.
    pub fn drop_run(&self, run_id: RunId) {
        let mut inner = self.lock();
        if inner.runs.remove(&run_id).is_some() {
            debug!(run_id, "dropped run artifacts");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_artifacts_are_invisible_until_commit() {
        let store = ArtifactStore::new();
        store.put(1, "build", "wheel", Payload::from("bytes")).unwrap();

        let err = store.get(1, "build", "wheel").unwrap_err();
        assert!(matches!(err, ShipdagError::ArtifactNotFound { .. }));

        assert_eq!(store.commit_job(1, "build"), 1);
        assert_eq!(store.get(1, "build", "wheel").unwrap(), Payload::from("bytes"));
    }

    #[test]
    fn discarded_artifacts_never_become_visible() {
        let store = ArtifactStore::new();
        store.put(1, "build", "wheel", Payload::from("partial")).unwrap();
        store.discard_job(1, "build");
        assert_eq!(store.commit_job(1, "build"), 0);
        assert!(store.get(1, "build", "wheel").is_err());
    }

    #[test]
    fn second_write_of_same_identity_is_rejected() {
        let store = ArtifactStore::new();
        store.put(1, "build", "wheel", Payload::from("a")).unwrap();
        let err = store.put(1, "build", "wheel", Payload::from("b")).unwrap_err();
        assert!(matches!(err, ShipdagError::DuplicateArtifact { .. }));

        // Same name in another run is a different artifact.
        assert!(store.put(2, "build", "wheel", Payload::from("b")).is_ok());
    }

    #[test]
    fn cancelled_runs_answer_stale() {
        let store = ArtifactStore::new();
        store.put(3, "build", "wheel", Payload::from("a")).unwrap();
        store.commit_job(3, "build");
        store.invalidate_run(3);

        assert!(matches!(
            store.get(3, "build", "wheel").unwrap_err(),
            ShipdagError::StaleArtifact { run_id: 3 }
        ));
        assert!(matches!(
            store.put(3, "build", "other", Payload::from("a")).unwrap_err(),
            ShipdagError::StaleArtifact { .. }
        ));
    }

    #[test]
    fn only_recent_cancellations_are_remembered() {
        let store = ArtifactStore::new();
        for run_id in 1..=(CANCELLED_RUN_MEMORY as RunId + 1) {
            store.invalidate_run(run_id);
        }
        store.invalidate_run(2);

        {
            let inner = store.lock();
            assert_eq!(inner.cancelled.len(), CANCELLED_RUN_MEMORY);
            assert_eq!(inner.cancelled_order.len(), CANCELLED_RUN_MEMORY);
        }
        assert!(matches!(
            store.get(1, "build", "wheel").unwrap_err(),
            ShipdagError::ArtifactNotFound { run_id: 1, .. }
        ));
        assert!(matches!(
            store.get(2, "build", "wheel").unwrap_err(),
            ShipdagError::StaleArtifact { run_id: 2 }
        ));
    }

    #[test]
    fn publishable_lists_only_committed_publishable_artifacts() {
        let store = ArtifactStore::new();
        let publishable = PutOptions {
            publishable: true,
            attestation: None,
        };
        store
            .put_with(1, "build-a", "wheel-a", Payload::from("a"), publishable.clone())
            .unwrap();
        store
            .put_with(1, "build-b", "wheel-b", Payload::from("b"), publishable)
            .unwrap();
        store.put(1, "test", "report", Payload::from("ok")).unwrap();
        store.commit_job(1, "build-a");
        store.commit_job(1, "test");

        let names: Vec<String> = store
            .publishable(1)
            .unwrap()
            .iter()
            .map(|a| a.id.name.clone())
            .collect();
        assert_eq!(names, vec!["wheel-a".to_string()]);
    }

    #[test]
    fn attestation_bundle_completeness() {
        let bundle = AttestationBundle {
            signature: "sig".into(),
            sbom: "sbom".into(),
            provenance: " ".into(),
        };
        assert!(!bundle.is_complete());
    }
}
