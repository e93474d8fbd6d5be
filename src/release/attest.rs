// src/release/attest.rs

//! Signing, SBOM generation and provenance statements.

use anyhow::Result;

use crate::artifact::AttestationBundle;
use crate::types::{Payload, RunId};

const LOCAL_KEY_CONTEXT: &str = "shipdag local attestation v1";

/// What a provenance statement records about an artifact's origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceMetadata {
    pub run_id: RunId,
    pub job: String,
    pub artifact: String,
    pub platform: String,
    pub source_ref: String,
    pub commit: String,
}

/// Produces the three parts of an [`AttestationBundle`].
pub trait Attestor: Send + Sync {
    fn sign(&self, payload: &Payload) -> Result<String>;
    fn sbom(&self, name: &str, payload: &Payload) -> Result<String>;
    fn attest(&self, payload: &Payload, meta: &ProvenanceMetadata) -> Result<String>;

    fn bundle(&self, payload: &Payload, meta: &ProvenanceMetadata) -> Result<AttestationBundle> {
        Ok(AttestationBundle {
            signature: self.sign(payload)?,
            sbom: self.sbom(&meta.artifact, payload)?,
            provenance: self.attest(payload, meta)?,
        })
    }
}

/// Attestor backed by a blake3 keyed hash. The key is derived from a
/// configured secret; anyone holding the secret can verify signatures.
#[derive(Clone)]
pub struct LocalAttestor {
    key: [u8; 32],
}

impl std::fmt::Debug for LocalAttestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalAttestor").finish_non_exhaustive()
    }
}

impl LocalAttestor {
    pub fn new(secret: &str) -> Self {
        Self {
            key: blake3::derive_key(LOCAL_KEY_CONTEXT, secret.as_bytes()),
        }
    }

    pub fn verify(&self, payload: &Payload, signature: &str) -> bool {
        blake3::keyed_hash(&self.key, payload.as_bytes()).to_hex().as_str() == signature
    }
}

impl Attestor for LocalAttestor {
    fn sign(&self, payload: &Payload) -> Result<String> {
        Ok(blake3::keyed_hash(&self.key, payload.as_bytes())
            .to_hex()
            .to_string())
    }

    fn sbom(&self, name: &str, payload: &Payload) -> Result<String> {
        Ok(format!(
            "component: {name}\nsize: {}\nblake3: {}\n",
            payload.len(),
            payload.content_hash()
        ))
    }

    fn attest(&self, payload: &Payload, meta: &ProvenanceMetadata) -> Result<String> {
        Ok(format!(
            "subject: {}\ndigest: blake3:{}\nbuilder: shipdag/{}\nrun: {}\njob: {}\nplatform: {}\nref: {}\ncommit: {}\n",
            meta.artifact,
            payload.content_hash(),
            env!("CARGO_PKG_VERSION"),
            meta.run_id,
            meta.job,
            meta.platform,
            meta.source_ref,
            meta.commit,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> ProvenanceMetadata {
        ProvenanceMetadata {
            run_id: 7,
            job: "build-linux".into(),
            artifact: "wheel-linux".into(),
            platform: "linux-x86_64".into(),
            source_ref: "v1.0.0".into(),
            commit: "abc123".into(),
        }
    }

    #[test]
    fn signatures_verify_only_with_the_same_secret() {
        let payload = Payload::from("wheel bytes");
        let signer = LocalAttestor::new("secret");
        let sig = signer.sign(&payload).unwrap();

        assert!(LocalAttestor::new("secret").verify(&payload, &sig));
        assert!(!LocalAttestor::new("other").verify(&payload, &sig));
        assert!(!signer.verify(&Payload::from("tampered"), &sig));
    }

    #[test]
    fn bundles_are_complete_and_mention_the_digest() {
        let payload = Payload::from("wheel bytes");
        let bundle = LocalAttestor::new("k").bundle(&payload, &meta()).unwrap();

        assert!(bundle.is_complete());
        assert!(bundle.provenance.contains(&payload.content_hash()));
        assert!(bundle.provenance.contains("commit: abc123"));
        assert!(bundle.sbom.starts_with("component: wheel-linux"));
    }
}
