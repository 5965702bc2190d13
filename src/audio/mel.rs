//! Log-mel spectrogram computation via STFT + mel filterbank.
//!
//! Defaults target 16kHz mono speech:
//! - FFT size: 1024 (513 frequency bins), Hann window, hop 256
//! - Mel bins: 80, range 0–8000 Hz, Slaney scale/norm
//! - Centered frames (reflect padding of n_fft/2 on both sides)
//! - Log compression: `ln(clamp(mel, min=1e-5))`
//!
//! Output is frame-major `(num_frames, n_mels)` to match the (time, channel)
//! layout of feature bundles.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Configuration for the mel spectrogram.
#[derive(Debug, Clone)]
pub struct MelConfig {
    pub sample_rate: u32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    pub f_min: f64,
    pub f_max: f64,
}

impl Default for MelConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            n_fft: 1024,
            hop_length: 256,
            n_mels: 80,
            f_min: 0.0,
            f_max: 8000.0,
        }
    }
}

/// Mel spectrogram processor.
///
/// Pre-computes the Hann window, FFT plan, and mel filterbank on
/// construction; [`MelSpectrogram::process`] then converts audio samples to
/// a log-mel spectrogram.
pub struct MelSpectrogram {
    config: MelConfig,
    window: Vec<f64>,
    filterbank: Vec<Vec<f64>>,
    fft: std::sync::Arc<dyn rustfft::Fft<f64>>,
}

impl MelSpectrogram {
    /// Create a new mel spectrogram processor with the given config.
    pub fn new(config: MelConfig) -> Self {
        let window = hann_window(config.n_fft);
        let filterbank = mel_filterbank(
            config.n_fft,
            config.n_mels,
            config.sample_rate,
            config.f_min,
            config.f_max,
        );
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(config.n_fft);

        Self {
            config,
            window,
            filterbank,
            fft,
        }
    }

    /// Number of mel channels in the output.
    pub fn n_mels(&self) -> usize {
        self.config.n_mels
    }

    /// Compute a log-mel spectrogram from raw mono audio samples.
    ///
    /// Output is `(num_frames, n_mels)`, frame-major.
    pub fn process(&self, samples: &[f32]) -> Vec<Vec<f32>> {
        let samples_f64: Vec<f64> = samples.iter().map(|&s| s as f64).collect();

        // Centered frames: reflect-pad n_fft/2 on both sides.
        let pad = self.config.n_fft / 2;
        let padded = reflect_pad(&samples_f64, pad, pad);

        let magnitudes = self.stft(&padded);

        let mut mel_spec = Vec::with_capacity(magnitudes.len());
        for frame_magnitudes in &magnitudes {
            let mut frame = Vec::with_capacity(self.config.n_mels);
            for filter in &self.filterbank {
                let mut sum = 0.0;
                for (bin_idx, &weight) in filter.iter().enumerate() {
                    if weight > 0.0 {
                        sum += weight * frame_magnitudes[bin_idx];
                    }
                }
                // Log compression: ln(clamp(x, min=1e-5))
                frame.push(sum.max(1e-5).ln() as f32);
            }
            mel_spec.push(frame);
        }

        mel_spec
    }

    /// Short-time Fourier transform. Returns magnitude spectra per frame,
    /// each with `n_fft/2 + 1` one-sided bins.
    fn stft(&self, padded: &[f64]) -> Vec<Vec<f64>> {
        let n_fft = self.config.n_fft;
        let hop = self.config.hop_length;
        let num_bins = n_fft / 2 + 1;

        let num_frames = (padded.len().saturating_sub(n_fft)) / hop + 1;
        let mut frames = Vec::with_capacity(num_frames);

        for frame_idx in 0..num_frames {
            let start = frame_idx * hop;
            let end = start + n_fft;
            if end > padded.len() {
                break;
            }

            let mut buffer: Vec<Complex<f64>> = (0..n_fft)
                .map(|i| Complex::new(padded[start + i] * self.window[i], 0.0))
                .collect();

            self.fft.process(&mut buffer);

            let magnitudes: Vec<f64> = buffer[..num_bins]
                .iter()
                .map(|c| (c.re * c.re + c.im * c.im).sqrt())
                .collect();

            frames.push(magnitudes);
        }

        frames
    }
}

/// Generate a Hann window of the given length.
fn hann_window(length: usize) -> Vec<f64> {
    (0..length)
        .map(|i| {
            let phase = 2.0 * std::f64::consts::PI * i as f64 / length as f64;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

/// Reflect-pad a signal on both sides.
fn reflect_pad(signal: &[f64], pad_left: usize, pad_right: usize) -> Vec<f64> {
    let len = signal.len();
    if len == 0 {
        return vec![0.0; pad_left + pad_right];
    }
    let mut padded = Vec::with_capacity(pad_left + len + pad_right);

    for i in (1..=pad_left).rev() {
        padded.push(signal[i.min(len - 1)]);
    }

    padded.extend_from_slice(signal);

    for i in 0..pad_right {
        let idx = len.saturating_sub(2 + i);
        padded.push(signal[idx]);
    }

    padded
}

/// Build a Slaney-normalized mel filterbank.
///
/// Returns `n_mels` filters, each with `n_fft/2 + 1` weights.
fn mel_filterbank(
    n_fft: usize,
    n_mels: usize,
    sample_rate: u32,
    f_min: f64,
    f_max: f64,
) -> Vec<Vec<f64>> {
    let num_bins = n_fft / 2 + 1;
    let sr = sample_rate as f64;

    let mel_min = hz_to_mel_slaney(f_min);
    let mel_max = hz_to_mel_slaney(f_max);

    let mel_points: Vec<f64> = (0..=(n_mels + 1))
        .map(|i| mel_min + (mel_max - mel_min) * i as f64 / (n_mels + 1) as f64)
        .collect();

    let hz_points: Vec<f64> = mel_points.iter().map(|&m| mel_to_hz_slaney(m)).collect();

    let bin_freqs: Vec<f64> = (0..num_bins)
        .map(|i| sr * i as f64 / n_fft as f64)
        .collect();

    let mut filters = Vec::with_capacity(n_mels);

    for i in 0..n_mels {
        let f_left = hz_points[i];
        let f_center = hz_points[i + 1];
        let f_right = hz_points[i + 2];

        // Slaney normalization: 2 / (f_right - f_left)
        let norm = 2.0 / (f_right - f_left);

        let filter: Vec<f64> = bin_freqs
            .iter()
            .map(|&f| {
                if f < f_left || f > f_right {
                    0.0
                } else if f <= f_center {
                    norm * (f - f_left) / (f_center - f_left)
                } else {
                    norm * (f_right - f) / (f_right - f_center)
                }
            })
            .collect();

        filters.push(filter);
    }

    filters
}

/// Convert frequency in Hz to Slaney mel scale.
///
/// Below 1000 Hz: linear (mel = 3 * f / 200).
/// Above 1000 Hz: logarithmic (mel = 15 + 27 * ln(f / 1000) / ln(6.4)).
fn hz_to_mel_slaney(hz: f64) -> f64 {
    if hz < 1000.0 {
        3.0 * hz / 200.0
    } else {
        15.0 + 27.0 * (hz / 1000.0).ln() / (6.4_f64).ln()
    }
}

/// Convert Slaney mel scale to frequency in Hz.
fn mel_to_hz_slaney(mel: f64) -> f64 {
    if mel < 15.0 {
        200.0 * mel / 3.0
    } else {
        1000.0 * ((mel - 15.0) * (6.4_f64).ln() / 27.0).exp()
    }
}
