//! Dataset build configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Describes one dataset build: which split, which speakers, where the
/// offline artifacts live, and which feature types to pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Split identifier ("train", "valid", ...). Informational only.
    pub split_type: String,

    /// Speakers belonging to this split. Utterances of any other speaker in
    /// the manifest are excluded from the assembled dataset.
    pub split_speakers: BTreeSet<String>,

    /// Root directory that bundle paths in the manifest resolve against.
    pub data_dir: PathBuf,

    /// Path to the JSON manifest (speaker-id → utterance records).
    pub metadata_path: PathBuf,

    /// Feature-type key naming the content (source) bundle per utterance.
    pub src_feat: String,

    /// Feature-type key naming the reference bundle per utterance.
    pub ref_feat: String,

    /// Reserved for speaker-conditional sampling; not used by indexing.
    #[serde(default = "default_n_samples")]
    pub n_samples: usize,

    /// Eagerly load every bundle at construction. When false, bundles are
    /// re-read from disk on every access (memory for I/O trade).
    #[serde(default)]
    pub pre_load: bool,

    /// Training mode flag (augmentation is applied either way; retained for
    /// callers that branch on it).
    #[serde(default = "default_training")]
    pub training: bool,
}

fn default_n_samples() -> usize {
    5
}

fn default_training() -> bool {
    true
}

impl DatasetConfig {
    /// Basic sanity checks before assembly.
    pub fn validate(&self) -> Result<()> {
        if self.split_speakers.is_empty() {
            return Err(Error::Config(format!(
                "split '{}' has no speakers",
                self.split_type
            )));
        }
        if self.src_feat.is_empty() || self.ref_feat.is_empty() {
            return Err(Error::Config(
                "src_feat and ref_feat must be non-empty feature keys".into(),
            ));
        }
        Ok(())
    }
}
