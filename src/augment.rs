//! Waveform noise augmentation.
//!
//! Training-time perturbation of clean waveforms: additive white Gaussian
//! noise at a signal-to-noise ratio drawn uniformly per call. Every call
//! draws independently, so two augmentations of the same waveform produce
//! different noisy copies.

use crate::Result;
use candle_core::{Device, Tensor};
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Capability seam for waveform augmentation.
///
/// The dataset only needs `add_noise`; implementations may add reverb,
/// clipping or anything else behind it.
pub trait NoiseAugment: Send + Sync {
    /// Return an independently perturbed copy of a 1-D waveform tensor.
    fn add_noise(&self, wav: &Tensor) -> Result<Tensor>;
}

/// Additive-noise augmenter with a uniform random SNR per call.
#[derive(Debug, Clone)]
pub struct WavAug {
    /// Inclusive SNR range in dB the per-call draw is taken from.
    pub snr_range: (f32, f32),
}

impl Default for WavAug {
    fn default() -> Self {
        Self {
            snr_range: (5.0, 25.0),
        }
    }
}

impl NoiseAugment for WavAug {
    fn add_noise(&self, wav: &Tensor) -> Result<Tensor> {
        let samples: Vec<f32> = wav.to_vec1()?;
        if samples.is_empty() {
            return Ok(wav.clone());
        }

        let signal_power =
            samples.iter().map(|s| (s * s) as f64).sum::<f64>() / samples.len() as f64;
        if signal_power <= 0.0 {
            // Silent input: nothing meaningful to scale noise against.
            return Ok(wav.clone());
        }

        let mut rng = rand::thread_rng();
        let snr_db = rng.gen_range(self.snr_range.0..=self.snr_range.1) as f64;
        let noise_power = signal_power / 10f64.powf(snr_db / 10.0);
        let normal = Normal::new(0.0, noise_power.sqrt())
            .map_err(|e| crate::Error::Audio(format!("noise distribution: {e}")))?;

        let noisy: Vec<f32> = samples
            .iter()
            .map(|&s| s + normal.sample(&mut rng) as f32)
            .collect();

        let len = noisy.len();
        Ok(Tensor::from_vec(noisy, len, &Device::Cpu)?)
    }
}

/// Pass-through augmenter for deterministic pipelines and tests.
#[derive(Debug, Clone, Default)]
pub struct NoAug;

impl NoiseAugment for NoAug {
    fn add_noise(&self, wav: &Tensor) -> Result<Tensor> {
        Ok(wav.clone())
    }
}
