//! Short-Time Objective Intelligibility (STOI).
//!
//! Implementation of Taal et al., "An Algorithm for Intelligibility
//! Prediction of Time-Frequency Weighted Noisy Speech" (2011):
//!
//! 1. Resample both signals to 10kHz.
//! 2. Remove frames more than 40 dB below the loudest clean frame.
//! 3. STFT (256-sample Hann frames, 50% overlap, 512-point FFT).
//! 4. Group bins into 15 one-third-octave bands starting at 150 Hz.
//! 5. Over 30-frame segments, normalize and clip the degraded band
//!    envelope, then correlate it with the clean envelope.
//! 6. Average the correlations over all bands and segments.
//!
//! Identical signals score exactly 1.0.

use crate::audio::resample;
use crate::{Error, Result};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

const FS: u32 = 10_000;
const N_FRAME: usize = 256;
const HOP: usize = N_FRAME / 2;
const NFFT: usize = 512;
const NUM_BANDS: usize = 15;
const MIN_FREQ: f64 = 150.0;
/// Segment length in frames (~384 ms).
const SEG_LEN: usize = 30;
/// Clipping bound: -15 dB signal-to-distortion ratio.
const BETA_DB: f64 = -15.0;
/// Energy range below the loudest frame considered speech-active.
const DYN_RANGE_DB: f64 = 40.0;

const EPS: f64 = 1e-15;

/// Compute the STOI score of `degraded` against `clean`.
///
/// Both signals must share `sample_rate`; differing lengths are truncated
/// to the shorter one. Returns a value in roughly [0, 1]; fails when the
/// overlapping speech-active part is shorter than one analysis segment.
pub fn stoi(clean: &[f32], degraded: &[f32], sample_rate: u32) -> Result<f64> {
    let len = clean.len().min(degraded.len());
    if len == 0 {
        return Err(Error::Metric("stoi: empty signal".into()));
    }

    let clean: Vec<f64> = resample(&clean[..len], sample_rate, FS)
        .iter()
        .map(|&s| s as f64)
        .collect();
    let degraded: Vec<f64> = resample(&degraded[..len], sample_rate, FS)
        .iter()
        .map(|&s| s as f64)
        .collect();

    let (clean, degraded) = remove_silent_frames(&clean, &degraded);

    let clean_bands = third_octave_envelope(&clean);
    let degraded_bands = third_octave_envelope(&degraded);

    let num_frames = clean_bands.first().map_or(0, Vec::len);
    if num_frames < SEG_LEN {
        return Err(Error::Metric(format!(
            "stoi: only {num_frames} active frames, need at least {SEG_LEN}"
        )));
    }

    // Normalized, clipped correlation per (band, segment).
    let clip_factor = 10f64.powf(-BETA_DB / 20.0) + 1.0;
    let mut total = 0.0;
    let mut count = 0usize;

    for seg_end in SEG_LEN..=num_frames {
        let range = seg_end - SEG_LEN..seg_end;
        for band in 0..NUM_BANDS {
            let x = &clean_bands[band][range.clone()];
            let y = &degraded_bands[band][range.clone()];

            let x_norm = l2_norm(x);
            let y_norm = l2_norm(y);
            let scale = x_norm / (y_norm + EPS);

            let clipped: Vec<f64> = x
                .iter()
                .zip(y.iter())
                .map(|(&xi, &yi)| (yi * scale).min(xi * clip_factor))
                .collect();

            if let Some(r) = correlation(x, &clipped) {
                total += r;
                count += 1;
            }
        }
    }

    if count == 0 {
        return Err(Error::Metric(
            "stoi: no band segments with variance (silent input?)".into(),
        ));
    }
    Ok(total / count as f64)
}

/// Drop frames more than [`DYN_RANGE_DB`] below the loudest clean frame and
/// overlap-add the survivors back into continuous signals. The clean
/// signal's mask is applied to both.
fn remove_silent_frames(clean: &[f64], degraded: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let window = hann(N_FRAME);
    let num_frames = if clean.len() >= N_FRAME {
        (clean.len() - N_FRAME) / HOP + 1
    } else {
        0
    };

    let mut energies_db = Vec::with_capacity(num_frames);
    for f in 0..num_frames {
        let start = f * HOP;
        let energy: f64 = (0..N_FRAME)
            .map(|i| {
                let w = clean[start + i] * window[i];
                w * w
            })
            .sum();
        energies_db.push(20.0 * (energy.sqrt() + EPS).log10());
    }

    let max_db = energies_db.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let kept: Vec<usize> = (0..num_frames)
        .filter(|&f| energies_db[f] > max_db - DYN_RANGE_DB)
        .collect();

    let out_len = if kept.is_empty() {
        0
    } else {
        (kept.len() - 1) * HOP + N_FRAME
    };
    let mut clean_out = vec![0.0; out_len];
    let mut degraded_out = vec![0.0; out_len];

    for (k, &f) in kept.iter().enumerate() {
        let src = f * HOP;
        let dst = k * HOP;
        for i in 0..N_FRAME {
            clean_out[dst + i] += clean[src + i] * window[i];
            degraded_out[dst + i] += degraded[src + i] * window[i];
        }
    }

    (clean_out, degraded_out)
}

/// One-third-octave band envelope: `NUM_BANDS` rows of per-frame energies.
fn third_octave_envelope(signal: &[f64]) -> Vec<Vec<f64>> {
    let spectra = stft(signal);
    let bands = band_edges();

    let mut envelope = vec![Vec::with_capacity(spectra.len()); NUM_BANDS];
    for frame in &spectra {
        for (band, &(lo, hi)) in bands.iter().enumerate() {
            let energy: f64 = frame[lo..hi].iter().sum();
            envelope[band].push(energy.sqrt());
        }
    }
    envelope
}

/// Bin ranges [lo, hi) of the 15 one-third-octave bands.
fn band_edges() -> Vec<(usize, usize)> {
    let bin_hz = FS as f64 / NFFT as f64;
    let max_bin = NFFT / 2 + 1;
    (0..NUM_BANDS)
        .map(|k| {
            let cf = MIN_FREQ * 2f64.powf(k as f64 / 3.0);
            let f_lo = cf / 2f64.powf(1.0 / 6.0);
            let f_hi = cf * 2f64.powf(1.0 / 6.0);
            let lo = (f_lo / bin_hz).round() as usize;
            let hi = ((f_hi / bin_hz).round() as usize).min(max_bin);
            (lo.min(max_bin), hi)
        })
        .collect()
}

/// Power spectra of 256-sample Hann frames zero-padded to 512 points.
fn stft(signal: &[f64]) -> Vec<Vec<f64>> {
    let window = hann(N_FRAME);
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(NFFT);
    let num_bins = NFFT / 2 + 1;

    let num_frames = if signal.len() >= N_FRAME {
        (signal.len() - N_FRAME) / HOP + 1
    } else {
        0
    };

    let mut spectra = Vec::with_capacity(num_frames);
    for f in 0..num_frames {
        let start = f * HOP;
        let mut buffer: Vec<Complex<f64>> = (0..NFFT)
            .map(|i| {
                if i < N_FRAME {
                    Complex::new(signal[start + i] * window[i], 0.0)
                } else {
                    Complex::new(0.0, 0.0)
                }
            })
            .collect();
        fft.process(&mut buffer);
        spectra.push(
            buffer[..num_bins]
                .iter()
                .map(|c| c.re * c.re + c.im * c.im)
                .collect(),
        );
    }
    spectra
}

fn hann(length: usize) -> Vec<f64> {
    (0..length)
        .map(|i| {
            let phase = 2.0 * std::f64::consts::PI * i as f64 / length as f64;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

fn l2_norm(v: &[f64]) -> f64 {
    v.iter().map(|&x| x * x).sum::<f64>().sqrt()
}

/// Pearson correlation; `None` when either vector has zero variance (the
/// pair is skipped rather than polluted with an epsilon).
fn correlation(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len() as f64;
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (&xi, &yi) in x.iter().zip(y.iter()) {
        sxy += (xi - mx) * (yi - my);
        sxx += (xi - mx) * (xi - mx);
        syy += (yi - my) * (yi - my);
    }

    if sxx <= 0.0 || syy <= 0.0 {
        return None;
    }
    Some(sxy / (sxx * syy).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic pseudo-noise (LCG), roughly white, in [-0.5, 0.5].
    fn pseudo_noise(len: usize, mut state: u64) -> Vec<f32> {
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((state >> 33) as f32 / (1u64 << 31) as f32) - 0.5
            })
            .collect()
    }

    #[test]
    fn identical_signals_score_one() {
        let signal = pseudo_noise(16000, 7);
        let score = stoi(&signal, &signal, 16000).unwrap();
        assert!(
            (score - 1.0).abs() < 1e-7,
            "identical signals must score 1.0, got {score}"
        );
    }

    #[test]
    fn noise_degrades_the_score() {
        let clean = pseudo_noise(16000, 7);
        let interference = pseudo_noise(16000, 99);
        let degraded: Vec<f32> = clean
            .iter()
            .zip(interference.iter())
            .map(|(c, n)| c + n)
            .collect();

        let score = stoi(&clean, &degraded, 16000).unwrap();
        assert!(score < 0.999, "degraded signal should score below 1, got {score}");
    }

    #[test]
    fn heavier_noise_scores_lower() {
        let clean = pseudo_noise(16000, 7);
        let interference = pseudo_noise(16000, 99);
        let light: Vec<f32> = clean
            .iter()
            .zip(interference.iter())
            .map(|(c, n)| c + 0.2 * n)
            .collect();
        let heavy: Vec<f32> = clean
            .iter()
            .zip(interference.iter())
            .map(|(c, n)| c + 2.0 * n)
            .collect();

        let s_light = stoi(&clean, &light, 16000).unwrap();
        let s_heavy = stoi(&clean, &heavy, 16000).unwrap();
        assert!(
            s_light > s_heavy,
            "light {s_light} should beat heavy {s_heavy}"
        );
    }

    #[test]
    fn too_short_signal_fails() {
        let signal = pseudo_noise(1000, 7);
        assert!(stoi(&signal, &signal, 16000).is_err());
    }

    #[test]
    fn empty_signal_fails() {
        assert!(stoi(&[], &[], 16000).is_err());
    }

    #[test]
    fn band_edges_are_ordered_and_in_range() {
        let edges = band_edges();
        assert_eq!(edges.len(), NUM_BANDS);
        for &(lo, hi) in &edges {
            assert!(lo <= hi);
            assert!(hi <= NFFT / 2 + 1);
        }
        // Bands ascend in frequency.
        for pair in edges.windows(2) {
            assert!(pair[0].0 <= pair[1].0);
        }
    }
}
