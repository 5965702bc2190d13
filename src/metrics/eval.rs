//! Directory-pair speech-quality evaluation.
//!
//! Scans a clean-reference tree, derives each file's counterpart in the
//! degraded tree by relative path, and averages PESQ and STOI over all
//! pairs, scored in parallel on the global rayon pool. Any per-pair failure
//! (missing tensor, sample-rate mismatch) aborts the whole evaluation — an
//! average over a silently shrunken file set would be misleading.

use crate::audio::read_wav_mono;
use crate::metrics::{pesq, stoi};
use crate::{Error, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// One clean/degraded file pair.
#[derive(Debug, Clone)]
pub struct WavPair {
    pub clean: PathBuf,
    pub degraded: PathBuf,
}

/// Averaged metrics over an evaluated file set.
#[derive(Debug, Clone, Copy)]
pub struct MetricReport {
    pub pesq_avg: f64,
    pub stoi_avg: f64,
    pub n_files: usize,
}

/// Enumerate clean/degraded pairs.
///
/// Recursively collects `.wav` files under `clean_dir` (sorted for
/// determinism), maps each to `degraded_dir` by relative path, and keeps
/// only pairs where both files exist. Fails when the two directories
/// resolve to the same path or the clean directory is missing.
pub fn collect_pairs(clean_dir: &Path, degraded_dir: &Path) -> Result<Vec<WavPair>> {
    if !clean_dir.is_dir() {
        return Err(Error::Metric(format!(
            "clean directory {} does not exist",
            clean_dir.display()
        )));
    }
    let clean_root = clean_dir.canonicalize()?;
    let degraded_root = match degraded_dir.canonicalize() {
        Ok(path) => path,
        // A missing degraded tree simply yields zero pairs downstream.
        Err(_) => degraded_dir.to_path_buf(),
    };
    if clean_root == degraded_root {
        return Err(Error::Metric(
            "clean and degraded directories must differ".into(),
        ));
    }

    let mut clean_files = Vec::new();
    find_wav_files(&clean_root, &mut clean_files)?;
    clean_files.sort();

    let pairs: Vec<WavPair> = clean_files
        .into_iter()
        .filter_map(|clean| {
            let rel = clean.strip_prefix(&clean_root).ok()?.to_path_buf();
            let degraded = degraded_root.join(rel);
            degraded.is_file().then(|| WavPair { clean, degraded })
        })
        .collect();

    tracing::info!(pairs = pairs.len(), "matched clean/degraded wav pairs");
    Ok(pairs)
}

/// Score every pair in parallel and average.
///
/// Zero pairs is an error, never a divide-by-zero. A sample-rate mismatch
/// within any pair is fatal.
pub fn evaluate_pairs(pairs: &[WavPair]) -> Result<MetricReport> {
    if pairs.is_empty() {
        return Err(Error::Metric("no clean/degraded wav pairs to score".into()));
    }

    let scores: Vec<(f64, f64)> = pairs
        .par_iter()
        .map(score_pair)
        .collect::<Result<Vec<_>>>()?;

    let n_files = scores.len();
    let pesq_sum: f64 = scores.iter().map(|s| s.0).sum();
    let stoi_sum: f64 = scores.iter().map(|s| s.1).sum();

    Ok(MetricReport {
        pesq_avg: pesq_sum / n_files as f64,
        stoi_avg: stoi_sum / n_files as f64,
        n_files,
    })
}

/// Convenience wrapper: collect then evaluate.
pub fn evaluate_dirs(clean_dir: &Path, degraded_dir: &Path) -> Result<MetricReport> {
    let pairs = collect_pairs(clean_dir, degraded_dir)?;
    evaluate_pairs(&pairs)
}

fn score_pair(pair: &WavPair) -> Result<(f64, f64)> {
    let (clean, clean_rate) = read_wav_mono(&pair.clean)?;
    let (degraded, degraded_rate) = read_wav_mono(&pair.degraded)?;

    if clean_rate != degraded_rate {
        return Err(Error::Metric(format!(
            "sample rate mismatch for {}: clean {clean_rate} Hz vs degraded {degraded_rate} Hz",
            pair.clean.display()
        )));
    }

    let pesq_score = pesq(&clean, &degraded, clean_rate)?;
    let stoi_score = stoi(&clean, &degraded, clean_rate)?;
    Ok((pesq_score, stoi_score))
}

fn find_wav_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            find_wav_files(&path, out)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
        {
            out.push(path);
        }
    }
    Ok(())
}
