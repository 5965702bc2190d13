//! Feature bundle files.
//!
//! A bundle is one offline-preprocessed utterance stored as safetensors with
//! exactly three named tensors:
//!
//! - `wav`  — raw mono samples, shape `(num_samples,)`
//! - `feat` — precomputed SSL embedding, shape `(time, channel)`
//! - `mel`  — log-mel spectrogram, shape `(time, channel)`
//!
//! Bundles are read-only artifacts; this module never mutates them.

use crate::{Error, Result};
use candle_core::{Device, Tensor};
use std::collections::HashMap;
use std::path::Path;

/// In-memory view of one bundle, all tensors on CPU.
#[derive(Debug, Clone)]
pub struct FeatureBundle {
    pub wav: Tensor,
    pub feat: Tensor,
    pub mel: Tensor,
}

/// Load a bundle file, verifying all three tensors are present.
pub fn load_bundle(path: impl AsRef<Path>) -> Result<FeatureBundle> {
    let path = path.as_ref();
    let mut tensors = candle_core::safetensors::load(path, &Device::Cpu)?;

    let mut take = |name: &str| -> Result<Tensor> {
        tensors.remove(name).ok_or_else(|| {
            Error::Dataset(format!(
                "bundle {} is missing tensor '{name}'",
                path.display()
            ))
        })
    };

    Ok(FeatureBundle {
        wav: take("wav")?.detach(),
        feat: take("feat")?.detach(),
        mel: take("mel")?.detach(),
    })
}

/// Write a bundle file. Used by offline preprocessing and tests.
pub fn write_bundle(path: impl AsRef<Path>, bundle: &FeatureBundle) -> Result<()> {
    let tensors: HashMap<String, Tensor> = [
        ("wav".to_string(), bundle.wav.clone()),
        ("feat".to_string(), bundle.feat.clone()),
        ("mel".to_string(), bundle.mel.clone()),
    ]
    .into_iter()
    .collect();
    candle_core::safetensors::save(&tensors, path)?;
    Ok(())
}
