//! P.862-style perceptual speech-quality score.
//!
//! A simplified rendition of the PESQ perceptual model:
//!
//! 1. Level-align both signals to a common RMS.
//! 2. Power spectra over 32 ms Hann frames, 50% overlap.
//! 3. Group bins into Bark-scale bands (Zwicker critical-band mapping).
//! 4. Compressed band loudness (`P^0.23`); per-frame symmetric and
//!    asymmetric disturbances (the asymmetric term only counts bands where
//!    the degraded signal exceeds the reference — additive noise hurts more
//!    than attenuation).
//! 5. `score = 4.5 − 0.1·d_sym − 0.0309·d_asym`, clamped to [−0.5, 4.5].
//!
//! The time-alignment stage of full P.862 is omitted: inputs are assumed
//! sample-aligned, which holds for enhancement pipelines that process in
//! place. Identical signals score exactly 4.5 (the PESQ ceiling).

use crate::{Error, Result};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Maximum raw PESQ score.
const MAX_SCORE: f64 = 4.5;
const MIN_SCORE: f64 = -0.5;

/// Target RMS for level alignment.
const TARGET_RMS: f64 = 0.1;

/// Loudness compression exponent (Zwicker).
const LOUDNESS_EXP: f64 = 0.23;

/// Gain applied to the symmetric disturbance before the score mapping.
const SYM_GAIN: f64 = 10.0;
/// Gain applied to the asymmetric disturbance.
const ASYM_GAIN: f64 = 10.0;
/// Cap on the per-band asymmetry ratio.
const ASYM_CAP: f64 = 12.0;

const EPS: f64 = 1e-12;

/// Compute the PESQ-style score of `degraded` against `clean`.
///
/// Both signals must share `sample_rate` (8kHz or above); differing
/// lengths are truncated to the shorter one. Returns a score in
/// [−0.5, 4.5].
pub fn pesq(clean: &[f32], degraded: &[f32], sample_rate: u32) -> Result<f64> {
    if sample_rate < 8000 {
        return Err(Error::Metric(format!(
            "pesq: sample rate {sample_rate} below 8kHz"
        )));
    }
    let len = clean.len().min(degraded.len());
    let frame_len = (sample_rate as usize * 32) / 1000;
    if len < frame_len {
        return Err(Error::Metric(format!(
            "pesq: signal too short ({len} samples, need {frame_len})"
        )));
    }

    let clean = level_align(&clean[..len]);
    let degraded = level_align(&degraded[..len]);

    let nfft = frame_len.next_power_of_two();
    let bands = bark_bands(sample_rate, nfft);

    let clean_spectra = band_powers(&clean, frame_len, nfft, &bands);
    let degraded_spectra = band_powers(&degraded, frame_len, nfft, &bands);

    let mut sym_sq_sum = 0.0;
    let mut asym_sum = 0.0;
    let num_frames = clean_spectra.len().min(degraded_spectra.len());

    for f in 0..num_frames {
        let ref_bands = &clean_spectra[f];
        let deg_bands = &degraded_spectra[f];

        let mut sym = 0.0;
        let mut asym = 0.0;
        for (&pr, &pd) in ref_bands.iter().zip(deg_bands.iter()) {
            let diff = (loudness(pd) - loudness(pr)).abs();
            sym += diff;
            if pd > pr {
                let ratio = ((pd + EPS) / (pr + EPS)).powf(1.2).min(ASYM_CAP);
                asym += diff * ratio;
            }
        }
        let n = ref_bands.len() as f64;
        sym /= n;
        asym /= n;

        sym_sq_sum += sym * sym;
        asym_sum += asym;
    }

    // L2 over frames for the symmetric term, L1 for the asymmetric one.
    let d_sym = (sym_sq_sum / num_frames as f64).sqrt() * SYM_GAIN;
    let d_asym = (asym_sum / num_frames as f64) * ASYM_GAIN;

    let score = MAX_SCORE - 0.1 * d_sym - 0.0309 * d_asym;
    Ok(score.clamp(MIN_SCORE, MAX_SCORE))
}

/// Scale a signal to [`TARGET_RMS`]. Silent signals pass through unscaled;
/// the disturbance terms then penalize them against any non-silent
/// reference.
fn level_align(signal: &[f32]) -> Vec<f64> {
    let rms = (signal.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>()
        / signal.len() as f64)
        .sqrt();
    let scale = if rms > 0.0 { TARGET_RMS / rms } else { 1.0 };
    signal.iter().map(|&s| s as f64 * scale).collect()
}

fn loudness(power: f64) -> f64 {
    power.max(0.0).powf(LOUDNESS_EXP)
}

/// Mean power per Bark band for each 50%-overlapped Hann frame.
fn band_powers(
    signal: &[f64],
    frame_len: usize,
    nfft: usize,
    bands: &[(usize, usize)],
) -> Vec<Vec<f64>> {
    let hop = frame_len / 2;
    let window: Vec<f64> = (0..frame_len)
        .map(|i| {
            let phase = 2.0 * std::f64::consts::PI * i as f64 / frame_len as f64;
            0.5 * (1.0 - phase.cos())
        })
        .collect();

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(nfft);

    let num_frames = (signal.len() - frame_len) / hop + 1;
    let mut frames = Vec::with_capacity(num_frames);

    for f in 0..num_frames {
        let start = f * hop;
        let mut buffer: Vec<Complex<f64>> = (0..nfft)
            .map(|i| {
                if i < frame_len {
                    Complex::new(signal[start + i] * window[i], 0.0)
                } else {
                    Complex::new(0.0, 0.0)
                }
            })
            .collect();
        fft.process(&mut buffer);

        let powers: Vec<f64> = bands
            .iter()
            .map(|&(lo, hi)| {
                if hi > lo {
                    buffer[lo..hi]
                        .iter()
                        .map(|c| c.re * c.re + c.im * c.im)
                        .sum::<f64>()
                        / (hi - lo) as f64
                } else {
                    0.0
                }
            })
            .collect();
        frames.push(powers);
    }
    frames
}

/// Group FFT bins into 1-Bark-wide bands using the Zwicker mapping
/// `z = 13·atan(0.00076 f) + 3.5·atan((f/7500)²)`.
fn bark_bands(sample_rate: u32, nfft: usize) -> Vec<(usize, usize)> {
    let bin_hz = sample_rate as f64 / nfft as f64;
    let num_bins = nfft / 2 + 1;

    let bark = |f: f64| 13.0 * (0.00076 * f).atan() + 3.5 * (f / 7500.0).powi(2).atan();
    let max_bark = bark(sample_rate as f64 / 2.0).floor() as usize;

    let mut bands = Vec::new();
    let mut bin = 1; // skip DC
    for z in 0..=max_bark {
        let lo = bin;
        while bin < num_bins && (bark(bin as f64 * bin_hz) as usize) <= z {
            bin += 1;
        }
        if bin > lo {
            bands.push((lo, bin));
        }
    }
    bands
}
