//! JSON manifest of offline-preprocessed utterances.
//!
//! The manifest maps speaker-id → array of utterance records. Each record
//! carries the original audio path plus one key per feature type pointing at
//! a bundle path relative to the data root:
//!
//! ```json
//! {
//!   "p225": [
//!     {"audio_path": "wav/p225_001.wav", "cpc": "cpc/p225_001.tensor"},
//!     {"audio_path": "wav/p225_002.wav", "cpc": "cpc/p225_002.tensor"}
//!   ]
//! }
//! ```

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// One utterance entry in the manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct UtteranceRecord {
    /// Path of the original audio file (informational; bundles are what get
    /// loaded).
    pub audio_path: String,

    /// Feature-type name → bundle path, relative to the data root.
    #[serde(flatten)]
    pub features: HashMap<String, String>,
}

impl UtteranceRecord {
    /// Bundle path for a named feature type, or an error naming the missing
    /// key.
    pub fn feature_path(&self, feat: &str) -> Result<&str> {
        self.features.get(feat).map(String::as_str).ok_or_else(|| {
            Error::Dataset(format!(
                "utterance '{}' has no '{feat}' feature entry",
                self.audio_path
            ))
        })
    }
}

/// Speaker-id → utterances. BTreeMap so iteration (and therefore dataset
/// index assignment) is deterministic across runs.
pub type Manifest = BTreeMap<String, Vec<UtteranceRecord>>;

/// Load and parse a manifest file.
///
/// Fails if the file is missing or is not valid JSON of the expected shape.
pub fn load_manifest(path: impl AsRef<Path>) -> Result<Manifest> {
    let text = std::fs::read_to_string(path.as_ref())?;
    let manifest: Manifest = serde_json::from_str(&text)?;
    Ok(manifest)
}
