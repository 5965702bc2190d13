//! Dataset assembly and batching.
//!
//! - [`manifest`] — JSON manifest of speaker → utterance records
//! - [`bundle`] — feature bundle files (wav + feat + mel, safetensors)
//! - [`assembler`] — the reconstruction dataset (index, augment, extract)
//! - [`collate`] — variable-length batch padding, masks, overlap lengths

pub mod assembler;
pub mod bundle;
pub mod collate;
pub mod manifest;

pub use assembler::{DatasetItem, FeatureDims, ReconstructionDataset};
pub use collate::{collate_batch, Batch, PAD_VALUE};
pub use manifest::{load_manifest, Manifest, UtteranceRecord};
