//! Voice-conversion training data pipeline in pure Rust.
//!
//! Pairs speaker utterances with precomputed SSL features and mel
//! spectrograms, applies waveform noise augmentation, and collates
//! variable-length batches for model training. A separate metrics path
//! computes PESQ/STOI speech-quality scores between clean/degraded
//! directory trees.
//!
//! ## Data path
//!
//! ```text
//! manifest.json → speaker/utterance index
//!                        ↓
//! feature bundles (wav + feat + mel, safetensors)
//!                        ↓
//! ReconstructionDataset — noise augmentation + feature extraction
//!                        ↓
//! collate_batch — padding, ignore masks, overlap lengths
//! ```
//!
//! ## Modules
//!
//! - [`audio`] — WAV I/O, log-mel spectrogram (STFT + filterbank), resampling
//! - [`augment`] — waveform noise augmentation at a random SNR
//! - [`extract`] — feature-extractor seam for SSL embeddings
//! - [`dataset`] — manifest, feature bundles, dataset assembly, collation
//! - [`metrics`] — PESQ/STOI scorers and the directory-pair evaluator

pub mod audio;
pub mod augment;
pub mod config;
pub mod dataset;
pub mod extract;
pub mod metrics;

mod error;

pub use error::{Error, Result};
