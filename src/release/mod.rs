// src/release/mod.rs

//! Release gate, release registries and attestation.

pub mod attest;
pub mod gate;
pub mod store;

pub use attest::{Attestor, LocalAttestor, ProvenanceMetadata};
pub use gate::ReleaseGate;
pub use store::{
    DirReleaseStore, MemoryReleaseStore, PublishOutcome, ReleaseArtifact, ReleaseManifest,
    ReleaseStore,
};
