// src/release/store.rs

//! Release registries.
//!
//! A release is published at most once per id. Re-publishing identical
//! content is a no-op reported as [`PublishOutcome::AlreadyExists`];
//! different content under an existing id is a
//! [`ShipdagError::ReleaseConflict`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::artifact::AttestationBundle;
use crate::errors::{Result, ShipdagError};
use crate::types::Payload;

const MANIFEST_FILE: &str = "MANIFEST.toml";

/// One attested artifact handed to the release store.
#[derive(Debug, Clone)]
pub struct ReleaseArtifact {
    pub name: String,
    pub payload: Payload,
    pub content_hash: String,
    pub attestation: AttestationBundle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Created,
    AlreadyExists,
}

impl fmt::Display for PublishOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishOutcome::Created => f.write_str("created"),
            PublishOutcome::AlreadyExists => f.write_str("already_exists"),
        }
    }
}

/// Artifact name -> content hash of a published release.
pub type ReleaseManifest = BTreeMap<String, String>;

fn manifest_of(artifacts: &[ReleaseArtifact]) -> ReleaseManifest {
    artifacts
        .iter()
        .map(|a| (a.name.clone(), a.content_hash.clone()))
        .collect()
}

pub trait ReleaseStore: Send + Sync {
    /// Publish all `artifacts` under `release_id`, all or nothing.
    fn publish(&self, release_id: &str, artifacts: &[ReleaseArtifact]) -> Result<PublishOutcome>;

    fn manifest(&self, release_id: &str) -> Result<Option<ReleaseManifest>>;
}

/// In-memory registry. Counts how many releases were actually created.
#[derive(Debug, Default)]
pub struct MemoryReleaseStore {
    releases: Mutex<HashMap<String, Vec<ReleaseArtifact>>>,
    created: AtomicUsize,
}

impl MemoryReleaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `Created` publishes.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn artifacts(&self, release_id: &str) -> Option<Vec<ReleaseArtifact>> {
        let releases = self.releases.lock().unwrap_or_else(PoisonError::into_inner);
        releases.get(release_id).cloned()
    }
}

impl ReleaseStore for MemoryReleaseStore {
    fn publish(&self, release_id: &str, artifacts: &[ReleaseArtifact]) -> Result<PublishOutcome> {
        let mut releases = self.releases.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = releases.get(release_id) {
            if manifest_of(existing) == manifest_of(artifacts) {
                return Ok(PublishOutcome::AlreadyExists);
            }
            return Err(ShipdagError::ReleaseConflict {
                release_id: release_id.to_string(),
            });
        }

        releases.insert(release_id.to_string(), artifacts.to_vec());
        self.created.fetch_add(1, Ordering::SeqCst);
        info!(release = %release_id, artifacts = artifacts.len(), "release published (memory)");
        Ok(PublishOutcome::Created)
    }

    fn manifest(&self, release_id: &str) -> Result<Option<ReleaseManifest>> {
        Ok(self.artifacts(release_id).map(|a| manifest_of(&a)))
    }
}

/// On-disk form of a release manifest.
///
/// ```toml
/// release = "v1.0.0"
///
/// [artifacts]
/// wheel-linux-x86_64 = "<blake3 hex>"
/// ```
#[derive(Debug, Serialize, Deserialize)]
struct ManifestFile {
    release: String,
    artifacts: ReleaseManifest,
}

/// Directory-backed registry: `<root>/<release_id>/` holds each artifact
/// with `.sig`, `.sbom` and `.provenance` siblings plus a `MANIFEST.toml`.
///
/// A release is written into a staging directory and renamed into place, so
/// readers see either the full release or none of it.
#[derive(Debug, Clone)]
pub struct DirReleaseStore {
    root: PathBuf,
}

impl DirReleaseStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn release_dir(&self, release_id: &str) -> Result<PathBuf> {
        let valid = !release_id.is_empty()
            && release_id != "."
            && release_id != ".."
            && !release_id.contains(['/', '\\']);
        if !valid {
            return Err(anyhow!("invalid release id {release_id:?}").into());
        }
        Ok(self.root.join(release_id))
    }

    fn read_manifest(dir: &Path) -> Result<ReleaseManifest> {
        let path = dir.join(MANIFEST_FILE);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading release manifest {:?}", path))?;
        let file: ManifestFile = toml::from_str(&text)
            .with_context(|| format!("parsing release manifest {:?}", path))?;
        Ok(file.artifacts)
    }

    fn compare_existing(
        dir: &Path,
        release_id: &str,
        artifacts: &[ReleaseArtifact],
    ) -> Result<PublishOutcome> {
        if Self::read_manifest(dir)? == manifest_of(artifacts) {
            debug!(release = %release_id, "release already exists with identical content");
            Ok(PublishOutcome::AlreadyExists)
        } else {
            Err(ShipdagError::ReleaseConflict {
                release_id: release_id.to_string(),
            })
        }
    }

    fn write_staging(
        staging: &Path,
        release_id: &str,
        artifacts: &[ReleaseArtifact],
    ) -> anyhow::Result<()> {
        fs::create_dir_all(staging)?;

        for artifact in artifacts {
            let base = staging.join(&artifact.name);
            fs::write(&base, artifact.payload.as_bytes())
                .with_context(|| format!("writing {:?}", base))?;
            fs::write(
                staging.join(format!("{}.sig", artifact.name)),
                &artifact.attestation.signature,
            )?;
            fs::write(
                staging.join(format!("{}.sbom", artifact.name)),
                &artifact.attestation.sbom,
            )?;
            fs::write(
                staging.join(format!("{}.provenance", artifact.name)),
                &artifact.attestation.provenance,
            )?;
        }

        let manifest = ManifestFile {
            release: release_id.to_string(),
            artifacts: manifest_of(artifacts),
        };
        let text = toml::to_string(&manifest).context("encoding release manifest")?;
        fs::write(staging.join(MANIFEST_FILE), text)?;
        Ok(())
    }
}

impl ReleaseStore for DirReleaseStore {
    fn publish(&self, release_id: &str, artifacts: &[ReleaseArtifact]) -> Result<PublishOutcome> {
        let dest = self.release_dir(release_id)?;
        if dest.exists() {
            return Self::compare_existing(&dest, release_id, artifacts);
        }

        fs::create_dir_all(&self.root)
            .with_context(|| format!("creating release root {:?}", self.root))?;
        let staging = self
            .root
            .join(format!(".staging-{}-{}", release_id, std::process::id()));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }

        if let Err(e) = Self::write_staging(&staging, release_id, artifacts) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e.context(format!("staging release {release_id}")).into());
        }

        if let Err(e) = fs::rename(&staging, &dest) {
            let _ = fs::remove_dir_all(&staging);
            // Another publisher won the race; fall back to comparing content.
            if dest.exists() {
                return Self::compare_existing(&dest, release_id, artifacts);
            }
            return Err(e.into());
        }

        info!(release = %release_id, artifacts = artifacts.len(), path = ?dest, "release published");
        Ok(PublishOutcome::Created)
    }

    fn manifest(&self, release_id: &str) -> Result<Option<ReleaseManifest>> {
        let dir = self.release_dir(release_id)?;
        if !dir.exists() {
            return Ok(None);
        }
        Self::read_manifest(&dir).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(name: &str, body: &str) -> ReleaseArtifact {
        let payload = Payload::from(body);
        ReleaseArtifact {
            name: name.to_string(),
            content_hash: payload.content_hash(),
            payload,
            attestation: AttestationBundle {
                signature: "sig".into(),
                sbom: "sbom".into(),
                provenance: "prov".into(),
            },
        }
    }

    #[test]
    fn memory_store_is_idempotent_per_release_id() {
        let store = MemoryReleaseStore::new();
        let artifacts = vec![artifact("wheel-linux", "a"), artifact("wheel-mac", "b")];

        assert_eq!(store.publish("v1.0.0", &artifacts).unwrap(), PublishOutcome::Created);
        assert_eq!(
            store.publish("v1.0.0", &artifacts).unwrap(),
            PublishOutcome::AlreadyExists
        );
        assert_eq!(store.created_count(), 1);

        let err = store
            .publish("v1.0.0", &[artifact("wheel-linux", "changed")])
            .unwrap_err();
        assert!(matches!(err, ShipdagError::ReleaseConflict { .. }));
    }

    #[test]
    fn dir_store_writes_release_atomically_and_detects_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirReleaseStore::new(dir.path());
        let artifacts = vec![artifact("wheel-linux", "a")];

        assert_eq!(store.publish("v1.0.0", &artifacts).unwrap(), PublishOutcome::Created);
        let release = dir.path().join("v1.0.0");
        assert_eq!(fs::read_to_string(release.join("wheel-linux")).unwrap(), "a");
        assert_eq!(fs::read_to_string(release.join("wheel-linux.sig")).unwrap(), "sig");

        assert_eq!(
            store.publish("v1.0.0", &artifacts).unwrap(),
            PublishOutcome::AlreadyExists
        );
        assert!(matches!(
            store.publish("v1.0.0", &[artifact("wheel-linux", "b")]),
            Err(ShipdagError::ReleaseConflict { .. })
        ));

        let manifest = store.manifest("v1.0.0").unwrap().unwrap();
        assert_eq!(manifest.get("wheel-linux"), Some(&Payload::from("a").content_hash()));
        assert!(store.manifest("v2.0.0").unwrap().is_none());
    }

    #[test]
    fn dir_store_manifest_is_toml() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirReleaseStore::new(dir.path());
        let artifacts = vec![artifact("wheel-linux", "a"), artifact("wheel-mac.tar.gz", "b")];
        store.publish("v1.2.0", &artifacts).unwrap();

        let text = fs::read_to_string(dir.path().join("v1.2.0").join(MANIFEST_FILE)).unwrap();
        let file: ManifestFile = toml::from_str(&text).unwrap();
        assert_eq!(file.release, "v1.2.0");
        assert_eq!(file.artifacts, manifest_of(&artifacts));
    }

    #[test]
    fn dir_store_reports_unreadable_manifests() {
        let dir = tempfile::tempdir().unwrap();
        let release = dir.path().join("v1.0.0");
        fs::create_dir_all(&release).unwrap();
        fs::write(release.join(MANIFEST_FILE), "not = [valid").unwrap();

        let store = DirReleaseStore::new(dir.path());
        assert!(store.manifest("v1.0.0").is_err());
        assert!(store.publish("v1.0.0", &[artifact("x", "y")]).is_err());
    }

    #[test]
    fn dir_store_rejects_path_like_release_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirReleaseStore::new(dir.path());
        assert!(store.publish("../escape", &[artifact("x", "y")]).is_err());
    }
}
