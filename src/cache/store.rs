// src/cache/store.rs

//! Cache entry backends.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use anyhow::{Context, Result};
use tracing::debug;

use crate::cache::CacheKey;
use crate::types::Payload;

/// A cached payload, keyed by `(job, cache key)`.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub payload: Payload,
    pub written_at: SystemTime,
}

/// Abstract cross-run cache storage.
///
/// Writes are idempotent (same key => same content), so implementations
/// need no coordination between writers.
pub trait CacheStore: Send + Sync {
    fn lookup(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;
    fn store(&self, key: &CacheKey, payload: &Payload) -> Result<()>;
}

/// Stores entries in memory only (lost on restart).
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    map: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCacheStore {
    fn lookup(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(map.get(key).cloned())
    }

    fn store(&self, key: &CacheKey, payload: &Payload) -> Result<()> {
        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        map.insert(
            key.clone(),
            CacheEntry {
                key: key.clone(),
                payload: payload.clone(),
                written_at: SystemTime::now(),
            },
        );
        debug!(key = %key, "stored cache entry (memory)");
        Ok(())
    }
}

/// Stores entries as files: `<root>/<job>/<digest>`.
///
/// Entries are written to a temporary file and renamed into place so a
/// concurrent reader never sees a partial payload.
#[derive(Debug, Clone)]
pub struct DirCacheStore {
    root: PathBuf,
}

impl DirCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(&key.job).join(&key.digest)
    }
}

impl CacheStore for DirCacheStore {
    fn lookup(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(key);
        if !path.is_file() {
            return Ok(None);
        }

        let bytes = fs::read(&path).with_context(|| format!("reading cache entry {:?}", path))?;
        let written_at = fs::metadata(&path)
            .and_then(|m| m.modified())
            .with_context(|| format!("reading mtime of {:?}", path))?;

        Ok(Some(CacheEntry {
            key: key.clone(),
            payload: Payload::new(bytes),
            written_at,
        }))
    }

    fn store(&self, key: &CacheKey, payload: &Payload) -> Result<()> {
        let path = self.entry_path(key);
        let dir = path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&dir).with_context(|| format!("creating cache dir {:?}", dir))?;

        let tmp = dir.join(format!(".{}.{}.tmp", key.digest, std::process::id()));
        fs::write(&tmp, payload.as_bytes())
            .with_context(|| format!("writing cache entry {:?}", tmp))?;
        fs::rename(&tmp, &path).with_context(|| format!("renaming cache entry into {:?}", path))?;

        debug!(key = %key, path = ?path, "stored cache entry (dir)");
        Ok(())
    }
}
