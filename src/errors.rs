// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::types::RunId;

#[derive(Error, Debug)]
pub enum ShipdagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("job '{job}' consumes artifact '{artifact}' which none of its dependencies produce")]
    UnproducedArtifact { job: String, artifact: String },

    #[error("job '{job}' depends on '{dependency}', which is not eligible for every event that triggers '{job}'")]
    UnreachableDependency { job: String, dependency: String },

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("artifact '{name}' of job '{job}' is not visible in run {run_id}")]
    ArtifactNotFound {
        run_id: RunId,
        job: String,
        name: String,
    },

    #[error("run {run_id} was cancelled; its artifacts are stale")]
    StaleArtifact { run_id: RunId },

    #[error("artifact '{name}' of job '{job}' was already written in run {run_id}")]
    DuplicateArtifact {
        run_id: RunId,
        job: String,
        name: String,
    },

    #[error("publishable artifacts lack an attestation bundle: {0:?}")]
    AttestationMissing(Vec<String>),

    #[error("run {run_id} has no publishable artifacts to release")]
    NothingToPublish { run_id: RunId },

    #[error("release '{release_id}' already exists with different content")]
    ReleaseConflict { release_id: String },

    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("producer failed: {0}")]
    Producer(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ShipdagError>;
