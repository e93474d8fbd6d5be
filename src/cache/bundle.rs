// src/cache/bundle.rs

//! Packing a job's named outputs into one cache payload.
//!
//! A bundle is a JSON document; output bytes are hex-encoded:
//!
//! ```json
//! {"format": 1, "outputs": [{"name": "wheel-linux-x86_64", "data": "6869"}]}
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::types::Payload;

const BUNDLE_FORMAT: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct OutputBundle {
    format: u32,
    outputs: Vec<BundledOutput>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BundledOutput {
    name: String,
    data: String,
}

pub fn pack_outputs(outputs: &[(String, Payload)]) -> Result<Payload> {
    let bundle = OutputBundle {
        format: BUNDLE_FORMAT,
        outputs: outputs
            .iter()
            .map(|(name, payload)| BundledOutput {
                name: name.clone(),
                data: hex::encode(payload.as_bytes()),
            })
            .collect(),
    };

    let bytes = serde_json::to_vec(&bundle).context("encoding output bundle")?;
    Ok(Payload::new(bytes))
}

pub fn unpack_outputs(payload: &Payload) -> Result<Vec<(String, Payload)>> {
    let bundle: OutputBundle =
        serde_json::from_slice(payload.as_bytes()).context("not a shipdag output bundle")?;
    if bundle.format != BUNDLE_FORMAT {
        bail!("unsupported output bundle format {}", bundle.format);
    }

    bundle
        .outputs
        .into_iter()
        .map(|output| {
            let bytes = hex::decode(&output.data)
                .with_context(|| format!("output '{}' is not valid hex", output.name))?;
            Ok((output.name, Payload::new(bytes)))
        })
        .collect()
}
