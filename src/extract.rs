//! Feature-extractor seam.
//!
//! SSL models (CPC, wav2vec 2.0, ...) live outside this crate; the dataset
//! only sees the [`FeatureExtractor`] trait. A mel-based reference
//! implementation is provided so the pipeline can be wired end to end
//! without any model weights.

use crate::audio::{MelConfig, MelSpectrogram};
use crate::Result;
use candle_core::{Device, Tensor};

/// Turns a 1-D waveform tensor into a `(time, channel)` feature tensor.
///
/// Implementations must run on CPU and return tensors detached from any
/// gradient computation.
pub trait FeatureExtractor: Send + Sync {
    /// Extract features from a mono waveform.
    fn get_feature(&self, wav: &Tensor) -> Result<Tensor>;

    /// Feature channel dimensionality.
    fn feature_dim(&self) -> usize;
}

/// Reference extractor: log-mel spectrogram frames as the "embedding".
pub struct MelFeatureExtractor {
    mel: MelSpectrogram,
}

impl MelFeatureExtractor {
    pub fn new(config: MelConfig) -> Self {
        Self {
            mel: MelSpectrogram::new(config),
        }
    }
}

impl Default for MelFeatureExtractor {
    fn default() -> Self {
        Self::new(MelConfig::default())
    }
}

impl FeatureExtractor for MelFeatureExtractor {
    fn get_feature(&self, wav: &Tensor) -> Result<Tensor> {
        let samples: Vec<f32> = wav.to_vec1()?;
        let frames = self.mel.process(&samples);
        let num_frames = frames.len();
        let n_mels = self.mel.n_mels();

        let flat: Vec<f32> = frames.into_iter().flatten().collect();
        let feat = Tensor::from_vec(flat, (num_frames, n_mels), &Device::Cpu)?;
        Ok(feat.detach())
    }

    fn feature_dim(&self) -> usize {
        self.mel.n_mels()
    }
}
