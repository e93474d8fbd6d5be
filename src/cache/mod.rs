// src/cache/mod.rs

//! Cross-run cache: key computation and best-effort lookup/store.
//!
//! A cache key covers the job class, its platform, its toolchain pin, a hash
//! of its lock/config files, (optionally) a hash of the source tree, the
//! command that produces the outputs and the content hashes of every
//! artifact the job consumes.
//! Equal keys must mean interchangeable outputs. Cache problems never fail a
//! job: lookups that error count as misses and failed stores are logged.

pub mod bundle;
pub mod hash;
pub mod store;

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use blake3::Hasher;
use tracing::{debug, info, warn};

use crate::config::{JobAction, Settings};
use crate::dag::JobSpec;
use crate::types::{JobName, Payload};

pub use bundle::{pack_outputs, unpack_outputs};
pub use hash::{compute_file_hash, compute_hash_for_paths, hash_source_tree, DEFAULT_SOURCE_EXCLUDES};
pub use store::{CacheEntry, CacheStore, DirCacheStore, MemoryCacheStore};

/// Cache key, scoped to the job class that may write it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub job: JobName,
    pub digest: String,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.job, self.digest)
    }
}

/// Declared inputs of a job, already reduced to strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheInputs {
    pub platform: String,
    pub toolchain_pin: Option<String>,
    pub lock_hash: Option<String>,
    pub source_hash: Option<String>,
    /// Passthrough `cmd`, or the producer command of a build job.
    pub command: Option<String>,
    /// `("<job>/<name>", content hash)` of consumed artifacts, sorted.
    pub artifacts: Vec<(String, String)>,
}

impl CacheInputs {
    /// Gather a job's inputs from the filesystem and settings.
    pub fn collect(spec: &JobSpec, settings: &Settings) -> Result<Self> {
        let toolchain_pin = spec.toolchain.as_deref().and_then(|name| {
            settings
                .toolchain_pin(name)
                .map(|pin| format!("{name}={pin}"))
        });

        let lock_hash = if spec.cache_files.is_empty() {
            None
        } else {
            let paths = spec.cache_files.iter().map(|f| settings.source_root.join(f));
            Some(compute_hash_for_paths(paths)?)
        };

        let source_hash = if spec.hash_source {
            Some(hash_source_tree(&settings.source_root, DEFAULT_SOURCE_EXCLUDES)?)
        } else {
            None
        };

        let command = match spec.action {
            JobAction::Passthrough => spec.cmd.clone(),
            JobAction::Build => settings.build_cmd.clone(),
            JobAction::Test | JobAction::Release => None,
        };

        Ok(Self {
            platform: spec.platform.clone(),
            toolchain_pin,
            lock_hash,
            source_hash,
            command,
            artifacts: Vec::new(),
        })
    }

    /// Add the content hashes of the job's consumed artifacts.
    pub fn with_artifacts(mut self, mut artifacts: Vec<(String, String)>) -> Self {
        artifacts.sort();
        self.artifacts = artifacts;
        self
    }
}

/// Key computation plus fault-tolerant access to a [`CacheStore`].
#[derive(Clone)]
pub struct CacheResolver {
    store: Arc<dyn CacheStore>,
}

impl fmt::Debug for CacheResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheResolver").finish_non_exhaustive()
    }
}

impl CacheResolver {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Deterministic key for `(job, inputs)`.
    pub fn resolve(job: &str, inputs: &CacheInputs) -> CacheKey {
        let mut hasher = Hasher::new();
        for part in [
            Some(job),
            Some(inputs.platform.as_str()),
            inputs.toolchain_pin.as_deref(),
            inputs.lock_hash.as_deref(),
            inputs.source_hash.as_deref(),
            inputs.command.as_deref(),
        ] {
            hash_field(&mut hasher, part);
        }

        hasher.update(&(inputs.artifacts.len() as u64).to_le_bytes());
        for (artifact, content_hash) in &inputs.artifacts {
            hash_field(&mut hasher, Some(artifact));
            hash_field(&mut hasher, Some(content_hash));
        }

        CacheKey {
            job: job.to_string(),
            digest: hasher.finalize().to_hex().to_string(),
        }
    }

    /// Look up an entry; any backend error is a miss.
    pub fn lookup(&self, key: &CacheKey) -> Option<Payload> {
        match self.store.lookup(key) {
            Ok(Some(entry)) => {
                info!(key = %key, "cache hit");
                Some(entry.payload)
            }
            Ok(None) => {
                debug!(key = %key, "cache miss");
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "cache unavailable on lookup; treating as miss");
                None
            }
        }
    }

    /// Store an entry written by `writer`. Refuses keys of other job classes
    /// and never propagates backend errors.
    pub fn store(&self, writer: &str, key: &CacheKey, payload: &Payload) {
        if key.job != writer {
            warn!(writer = %writer, key = %key, "refusing cache write for another job class");
            return;
        }

        if let Err(e) = self.store.store(key, payload) {
            warn!(key = %key, error = %e, "cache unavailable on store; ignoring");
        }
    }
}

/// Length-prefixed so adjacent fields cannot run into each other and
/// collide; `None` hashes differently from an empty string.
fn hash_field(hasher: &mut Hasher, part: Option<&str>) {
    match part {
        Some(value) => {
            hasher.update(&(value.len() as u64).to_le_bytes());
            hasher.update(value.as_bytes());
        }
        None => {
            hasher.update(&u64::MAX.to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(platform: &str) -> CacheInputs {
        CacheInputs {
            platform: platform.to_string(),
            toolchain_pin: Some("cmake=3.28".to_string()),
            lock_hash: Some("abc".to_string()),
            source_hash: None,
            command: Some("make wheel".to_string()),
            artifacts: vec![("build/wheel".to_string(), "h1".to_string())],
        }
    }

    #[test]
    fn keys_are_deterministic() {
        let a = CacheResolver::resolve("build", &inputs("linux-x86_64"));
        let b = CacheResolver::resolve("build", &inputs("linux-x86_64"));
        assert_eq!(a, b);
    }

    #[test]
    fn platforms_and_jobs_do_not_collide() {
        let linux = CacheResolver::resolve("build", &inputs("linux-x86_64"));
        let mac = CacheResolver::resolve("build", &inputs("macos-arm64"));
        let other_job = CacheResolver::resolve("test", &inputs("linux-x86_64"));
        assert_ne!(linux.digest, mac.digest);
        assert_ne!(linux.digest, other_job.digest);
    }

    #[test]
    fn command_and_consumed_artifacts_are_part_of_the_key() {
        let base = CacheResolver::resolve("pkg", &inputs("linux"));

        let mut other_cmd = inputs("linux");
        other_cmd.command = Some("make sdist".to_string());
        assert_ne!(CacheResolver::resolve("pkg", &other_cmd), base);

        let rebuilt =
            inputs("linux").with_artifacts(vec![("build/wheel".to_string(), "h2".to_string())]);
        assert_ne!(CacheResolver::resolve("pkg", &rebuilt), base);

        let a = inputs("linux").with_artifacts(vec![
            ("b/y".to_string(), "2".to_string()),
            ("a/x".to_string(), "1".to_string()),
        ]);
        let b = inputs("linux").with_artifacts(vec![
            ("a/x".to_string(), "1".to_string()),
            ("b/y".to_string(), "2".to_string()),
        ]);
        assert_eq!(CacheResolver::resolve("pkg", &a), CacheResolver::resolve("pkg", &b));
    }

    #[test]
    fn absent_and_empty_inputs_differ() {
        let mut with_empty = inputs("linux");
        with_empty.source_hash = Some(String::new());
        assert_ne!(
            CacheResolver::resolve("build", &with_empty),
            CacheResolver::resolve("build", &inputs("linux"))
        );
    }

    struct BrokenStore;

    impl CacheStore for BrokenStore {
        fn lookup(&self, _key: &CacheKey) -> Result<Option<CacheEntry>> {
            Err(anyhow::anyhow!("remote cache down"))
        }

        fn store(&self, _key: &CacheKey, _payload: &Payload) -> Result<()> {
            Err(anyhow::anyhow!("remote cache down"))
        }
    }

    #[test]
    fn backend_failures_degrade_to_misses() {
        let resolver = CacheResolver::new(Arc::new(BrokenStore));
        let key = CacheResolver::resolve("build", &inputs("linux"));
        assert!(resolver.lookup(&key).is_none());
        resolver.store("build", &key, &Payload::from("x"));
    }

    #[test]
    fn only_the_owning_job_class_writes() {
        let store = Arc::new(MemoryCacheStore::new());
        let resolver = CacheResolver::new(store.clone());
        let key = CacheResolver::resolve("build", &inputs("linux"));

        resolver.store("test", &key, &Payload::from("x"));
        assert!(store.is_empty());

        resolver.store("build", &key, &Payload::from("x"));
        assert_eq!(resolver.lookup(&key), Some(Payload::from("x")));
    }

    #[test]
    fn dir_store_round_trips_entries() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = CacheResolver::new(Arc::new(DirCacheStore::new(dir.path())));
        let key = CacheResolver::resolve("build", &inputs("linux"));

        assert!(resolver.lookup(&key).is_none());
        resolver.store("build", &key, &Payload::from("warm"));
        assert_eq!(resolver.lookup(&key), Some(Payload::from("warm")));
    }
}
