//! Reconstruction dataset: speaker utterances paired with precomputed
//! features, assembled in parallel, augmented on access.
//!
//! Construction builds one task per in-split utterance and runs them on a
//! fixed 4-worker pool. Entry `i` always corresponds to the `i`-th submitted
//! task regardless of completion order. Access applies noise augmentation
//! and feature extraction; when the source and reference feature types are
//! the same, a single noisy draw is extracted once and shared (the identity
//! shortcut — see [`ReconstructionDataset::get`]).

use crate::augment::NoiseAugment;
use crate::config::DatasetConfig;
use crate::dataset::bundle::load_bundle;
use crate::dataset::manifest::load_manifest;
use crate::extract::FeatureExtractor;
use crate::{Error, Result};
use candle_core::Tensor;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Fixed worker count for assembly (path resolution or bundle I/O).
const ASSEMBLY_WORKERS: usize = 4;

/// One dataset entry: either paths to resolve on access, or fully
/// materialized tensors when pre-loaded.
enum Entry {
    Lazy {
        speaker: String,
        src_path: PathBuf,
        ref_path: PathBuf,
    },
    Loaded(Box<LoadedEntry>),
}

struct LoadedEntry {
    speaker: String,
    content_wav: Tensor,
    target_wav: Tensor,
    target_mel: Tensor,
}

impl Entry {
    fn speaker(&self) -> &str {
        match self {
            Entry::Lazy { speaker, .. } => speaker,
            Entry::Loaded(loaded) => &loaded.speaker,
        }
    }
}

/// What one access yields: the **features contract**.
///
/// `content_emb` and `target_emb` are `(time, channel)` embeddings extracted
/// from independently noise-augmented waveforms; `target_mel` is the
/// `(time, channel)` log-mel of the source utterance. Waveforms are never
/// returned.
#[derive(Debug, Clone)]
pub struct DatasetItem {
    pub content_emb: Tensor,
    pub target_emb: Tensor,
    pub target_mel: Tensor,
}

/// Channel dimensionalities observed for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureDims {
    pub src: usize,
    pub reference: usize,
    pub mel: usize,
}

/// Dataset pairing each utterance's content features with its reference
/// features for reconstruction training.
pub struct ReconstructionDataset {
    config: DatasetConfig,
    entries: Vec<Entry>,
    speaker_to_indices: HashMap<String, Vec<usize>>,
    src_extractor: Box<dyn FeatureExtractor>,
    ref_extractor: Box<dyn FeatureExtractor>,
    augmenter: Box<dyn NoiseAugment>,
}

impl ReconstructionDataset {
    /// Assemble the dataset described by `config`.
    ///
    /// Parses the manifest, enumerates utterances of in-split speakers in
    /// manifest order, and resolves them on a 4-worker pool — lazily (path
    /// tuples) or eagerly (`pre_load`: bundles read up front). Any task
    /// failure aborts construction.
    pub fn new(
        config: DatasetConfig,
        src_extractor: Box<dyn FeatureExtractor>,
        ref_extractor: Box<dyn FeatureExtractor>,
        augmenter: Box<dyn NoiseAugment>,
    ) -> Result<Self> {
        config.validate()?;
        let manifest = load_manifest(&config.metadata_path)?;

        let mut tasks = Vec::new();
        for (speaker, utterances) in &manifest {
            if !config.split_speakers.contains(speaker) {
                continue;
            }
            for utterance in utterances {
                let src_path = config.data_dir.join(utterance.feature_path(&config.src_feat)?);
                let ref_path = config.data_dir.join(utterance.feature_path(&config.ref_feat)?);
                tasks.push((speaker.clone(), src_path, ref_path));
            }
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(ASSEMBLY_WORKERS)
            .build()
            .map_err(|e| Error::Dataset(format!("worker pool: {e}")))?;

        // Indexed parallel collect: entry i stays aligned with task i no
        // matter which worker finishes first.
        let pre_load = config.pre_load;
        let entries: Vec<Entry> = pool.install(|| {
            tasks
                .into_par_iter()
                .map(|(speaker, src_path, ref_path)| {
                    if pre_load {
                        load_entry(speaker, &src_path, &ref_path)
                    } else {
                        Ok(Entry::Lazy {
                            speaker,
                            src_path,
                            ref_path,
                        })
                    }
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let mut speaker_to_indices: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            speaker_to_indices
                .entry(entry.speaker().to_string())
                .or_default()
                .push(i);
        }

        tracing::info!(
            split = %config.split_type,
            entries = entries.len(),
            speakers = speaker_to_indices.len(),
            pre_load,
            "assembled reconstruction dataset"
        );

        Ok(Self {
            config,
            entries,
            speaker_to_indices,
            src_extractor,
            ref_extractor,
            augmenter,
        })
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry positions belonging to one speaker, in index order. Supports
    /// speaker-conditional sampling; `None` for speakers outside the split.
    pub fn speaker_indices(&self, speaker: &str) -> Option<&[usize]> {
        self.speaker_to_indices.get(speaker).map(Vec::as_slice)
    }

    /// Speakers present in the assembled dataset.
    pub fn speakers(&self) -> impl Iterator<Item = &str> {
        self.speaker_to_indices.keys().map(String::as_str)
    }

    /// Produce the augmented item at `index`.
    ///
    /// Augmentation draws fresh noise per call, so successive accesses of
    /// the same index differ unless the augmenter is deterministic. When
    /// `src_feat == ref_feat` the single extracted embedding serves as both
    /// content and target (one noise draw, extracted once); otherwise the
    /// content and reference waveforms are perturbed independently and run
    /// through their own extractors.
    pub fn get(&self, index: usize) -> Result<DatasetItem> {
        let (content_wav, target_wav, target_mel) = self.resolve(index)?;

        let (content_emb, target_emb) = if self.config.src_feat == self.config.ref_feat {
            let noisy = self.augmenter.add_noise(&content_wav)?;
            let emb = self.src_extractor.get_feature(&noisy)?;
            // Same tensor for both: shared noise draw is the training scheme,
            // not a caching shortcut.
            (emb.clone(), emb)
        } else {
            let content_noisy = self.augmenter.add_noise(&content_wav)?;
            let target_noisy = self.augmenter.add_noise(&target_wav)?;
            (
                self.src_extractor.get_feature(&content_noisy)?,
                self.ref_extractor.get_feature(&target_noisy)?,
            )
        };

        Ok(DatasetItem {
            content_emb,
            target_emb,
            target_mel,
        })
    }

    /// Channel dims of content embedding, target embedding and mel.
    ///
    /// Computes item 0 in full to observe them — costs one augmentation and
    /// extraction pass, including its random noise draw. No state is
    /// mutated.
    pub fn feature_dims(&self) -> Result<FeatureDims> {
        let item = self.get(0)?;
        let (_, src) = item.content_emb.dims2()?;
        let (_, reference) = item.target_emb.dims2()?;
        let (_, mel) = item.target_mel.dims2()?;
        Ok(FeatureDims {
            src,
            reference,
            mel,
        })
    }

    /// Resolve (content_wav, target_wav, target_mel) for one entry. Lazy
    /// entries re-read both bundles from disk on every call.
    fn resolve(&self, index: usize) -> Result<(Tensor, Tensor, Tensor)> {
        let entry = self.entries.get(index).ok_or_else(|| {
            Error::Dataset(format!(
                "index {index} out of range for dataset of length {}",
                self.entries.len()
            ))
        })?;

        match entry {
            Entry::Loaded(loaded) => Ok((
                loaded.content_wav.clone(),
                loaded.target_wav.clone(),
                loaded.target_mel.clone(),
            )),
            Entry::Lazy {
                src_path, ref_path, ..
            } => {
                let src_bundle = load_bundle(src_path)?;
                let ref_bundle = load_bundle(ref_path)?;
                // The mel target comes from the source bundle: the model
                // reconstructs the content utterance.
                Ok((src_bundle.wav, ref_bundle.wav, src_bundle.mel))
            }
        }
    }
}

fn load_entry(speaker: String, src_path: &Path, ref_path: &Path) -> Result<Entry> {
    let src_bundle = load_bundle(src_path)?;
    let ref_bundle = load_bundle(ref_path)?;
    Ok(Entry::Loaded(Box::new(LoadedEntry {
        speaker,
        content_wav: src_bundle.wav,
        target_wav: ref_bundle.wav,
        target_mel: src_bundle.mel,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::augment::{NoAug, WavAug};
    use crate::dataset::bundle::{write_bundle, FeatureBundle};
    use candle_core::Device;
    use std::collections::BTreeSet;
    use std::path::Path;

    /// Deterministic, noise-sensitive extractor: frames of 160 samples,
    /// each frame is the frame mean repeated across `dim` channels.
    struct StubExtractor {
        dim: usize,
    }

    impl FeatureExtractor for StubExtractor {
        fn get_feature(&self, wav: &Tensor) -> Result<Tensor> {
            let samples: Vec<f32> = wav.to_vec1()?;
            let frames: Vec<f32> = samples
                .chunks(160)
                .map(|c| c.iter().sum::<f32>() / c.len() as f32)
                .collect();
            let num_frames = frames.len().max(1);
            let mut flat = Vec::with_capacity(num_frames * self.dim);
            for i in 0..num_frames {
                let v = frames.get(i).copied().unwrap_or(0.0);
                flat.extend(std::iter::repeat(v).take(self.dim));
            }
            Ok(Tensor::from_vec(
                flat,
                (num_frames, self.dim),
                &Device::Cpu,
            )?)
        }

        fn feature_dim(&self) -> usize {
            self.dim
        }
    }

    fn write_fixture(dir: &Path) -> std::path::PathBuf {
        // Three speakers, 2 + 1 + 1 utterances. All records carry both a
        // "cpc" and a "wav2vec2" bundle (pointing at the same file here).
        let mut manifest = serde_json::Map::new();
        for (speaker, count) in [("p225", 2usize), ("p226", 1), ("p227", 1)] {
            let utterances: Vec<serde_json::Value> = (0..count)
                .map(|u| {
                    let bundle_rel = format!("{speaker}_{u}.tensor");
                    let seed = (u + 1) as f32 * if speaker == "p225" { 0.1 } else { 0.2 };
                    let wav = Tensor::from_vec(
                        (0..800)
                            .map(|i| seed * ((i as f32) / 50.0).sin())
                            .collect::<Vec<f32>>(),
                        800,
                        &Device::Cpu,
                    )
                    .unwrap();
                    let feat =
                        Tensor::from_vec(vec![seed; 5 * 16], (5, 16), &Device::Cpu).unwrap();
                    let mel =
                        Tensor::from_vec(vec![-seed; 5 * 8], (5, 8), &Device::Cpu).unwrap();
                    write_bundle(dir.join(&bundle_rel), &FeatureBundle { wav, feat, mel })
                        .unwrap();
                    serde_json::json!({
                        "audio_path": format!("wav/{speaker}_{u}.wav"),
                        "cpc": bundle_rel,
                        "wav2vec2": bundle_rel,
                    })
                })
                .collect();
            manifest.insert(speaker.to_string(), serde_json::Value::Array(utterances));
        }
        let metadata_path = dir.join("metadata.json");
        std::fs::write(
            &metadata_path,
            serde_json::to_string_pretty(&manifest).unwrap(),
        )
        .unwrap();
        metadata_path
    }

    fn fixture_config(dir: &Path, src_feat: &str, ref_feat: &str) -> DatasetConfig {
        let split_speakers: BTreeSet<String> =
            ["p225".to_string(), "p226".to_string()].into_iter().collect();
        DatasetConfig {
            split_type: "train".into(),
            split_speakers,
            data_dir: dir.to_path_buf(),
            metadata_path: dir.join("metadata.json"),
            src_feat: src_feat.into(),
            ref_feat: ref_feat.into(),
            n_samples: 5,
            pre_load: false,
            training: true,
        }
    }

    fn build(
        config: DatasetConfig,
        augmenter: Box<dyn NoiseAugment>,
    ) -> ReconstructionDataset {
        ReconstructionDataset::new(
            config,
            Box::new(StubExtractor { dim: 16 }),
            Box::new(StubExtractor { dim: 16 }),
            augmenter,
        )
        .unwrap()
    }

    #[test]
    fn entry_count_covers_split_only() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let dataset = build(fixture_config(dir.path(), "cpc", "cpc"), Box::new(NoAug));

        // p225 has 2 utterances, p226 has 1; p227 is excluded.
        assert_eq!(dataset.len(), 3);
        assert!(dataset.speaker_indices("p227").is_none());
    }

    #[test]
    fn speaker_index_partitions_all_positions() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let dataset = build(fixture_config(dir.path(), "cpc", "cpc"), Box::new(NoAug));

        let mut all: Vec<usize> = dataset
            .speakers()
            .flat_map(|s| dataset.speaker_indices(s).unwrap().to_vec())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..dataset.len()).collect::<Vec<_>>());
    }

    #[test]
    fn lazy_and_eager_agree_on_shapes() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());

        let lazy = build(fixture_config(dir.path(), "cpc", "cpc"), Box::new(NoAug));
        let mut eager_config = fixture_config(dir.path(), "cpc", "cpc");
        eager_config.pre_load = true;
        let eager = build(eager_config, Box::new(NoAug));

        assert_eq!(lazy.len(), eager.len());
        for i in 0..lazy.len() {
            let a = lazy.get(i).unwrap();
            let b = eager.get(i).unwrap();
            assert_eq!(a.content_emb.dims(), b.content_emb.dims());
            assert_eq!(a.target_mel.dims(), b.target_mel.dims());
        }
    }

    #[test]
    fn identity_shortcut_shares_one_noise_draw() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        // Random augmenter on purpose: bit-equality must hold anyway because
        // the embedding is extracted once and shared.
        let dataset = build(
            fixture_config(dir.path(), "cpc", "cpc"),
            Box::new(WavAug::default()),
        );

        let item = dataset.get(0).unwrap();
        let content: Vec<Vec<f32>> = item.content_emb.to_vec2().unwrap();
        let target: Vec<Vec<f32>> = item.target_emb.to_vec2().unwrap();
        assert_eq!(content, target, "identity shortcut must share the tensor");
    }

    #[test]
    fn distinct_feature_types_draw_independently() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        // src and ref bundles hold the same waveform, so any difference in
        // the embeddings comes from independent noise draws.
        let dataset = build(
            fixture_config(dir.path(), "cpc", "wav2vec2"),
            Box::new(WavAug::default()),
        );

        let item = dataset.get(0).unwrap();
        let content: Vec<Vec<f32>> = item.content_emb.to_vec2().unwrap();
        let target: Vec<Vec<f32>> = item.target_emb.to_vec2().unwrap();
        assert_ne!(content, target, "expected two independent noise draws");
    }

    #[test]
    fn out_of_range_index_fails() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let dataset = build(fixture_config(dir.path(), "cpc", "cpc"), Box::new(NoAug));

        let err = dataset.get(dataset.len()).unwrap_err();
        assert!(err.to_string().contains("out of range"), "got: {err}");
    }

    #[test]
    fn lazy_missing_bundle_fails_at_access() {
        let dir = tempfile::tempdir().unwrap();
        let metadata_path = write_fixture(dir.path());
        std::fs::remove_file(dir.path().join("p225_0.tensor")).unwrap();

        // Construction only records paths; nothing is read yet.
        let dataset = build(fixture_config(dir.path(), "cpc", "cpc"), Box::new(NoAug));
        assert!(metadata_path.exists());
        assert!(dataset.get(0).is_err());
    }

    #[test]
    fn eager_missing_bundle_fails_at_construction() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        std::fs::remove_file(dir.path().join("p226_0.tensor")).unwrap();

        let mut config = fixture_config(dir.path(), "cpc", "cpc");
        config.pre_load = true;
        let result = ReconstructionDataset::new(
            config,
            Box::new(StubExtractor { dim: 16 }),
            Box::new(StubExtractor { dim: 16 }),
            Box::new(NoAug),
        );
        assert!(result.is_err());
    }

    #[test]
    fn feature_dims_match_extractor_and_mel() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let dataset = build(fixture_config(dir.path(), "cpc", "cpc"), Box::new(NoAug));

        let dims = dataset.feature_dims().unwrap();
        assert_eq!(
            dims,
            FeatureDims {
                src: 16,
                reference: 16,
                mel: 8
            }
        );
    }

    #[test]
    fn missing_manifest_fails_construction() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture_config(dir.path(), "cpc", "cpc");
        // No metadata.json written.
        let result = ReconstructionDataset::new(
            config,
            Box::new(StubExtractor { dim: 16 }),
            Box::new(StubExtractor { dim: 16 }),
            Box::new(NoAug),
        );
        assert!(result.is_err());
    }
}
