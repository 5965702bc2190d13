//! Batch collation: pad variable-length items to a common length, build
//! ignore masks, compute per-example overlap lengths.
//!
//! Two padding conventions on purpose:
//!
//! - sources are zero-padded, so padded frames contribute near-zero
//!   influence;
//! - targets and target mels are padded with [`PAD_VALUE`] (−20), far below
//!   the normalized log-mel range, so padding never aliases with real
//!   low-energy frames.
//!
//! Masks are **ignore** masks: 1 at padded positions, 0 at valid ones.

use crate::dataset::assembler::DatasetItem;
use crate::{Error, Result};
use candle_core::{Device, Tensor};

/// Sentinel pad value for target and target-mel tensors.
pub const PAD_VALUE: f32 = -20.0;

/// A collated batch of size B.
pub struct Batch {
    /// `(B, max_src_len, src_dim)`, zero-padded.
    pub srcs: Tensor,
    /// `(B, max_src_len)` u8, 1 at padded positions.
    pub src_masks: Tensor,
    /// `(B, feat_dim, max_tgt_len)`, padded with [`PAD_VALUE`].
    pub tgts: Tensor,
    /// `(B, max_tgt_len)` u8, 1 at padded positions.
    pub tgt_masks: Tensor,
    /// `(B, mel_dim, max_tgt_mel_len)`, padded with [`PAD_VALUE`].
    pub tgt_mels: Tensor,
    /// `min(src_len, tgt_mel_len)` per example: the frame count valid for
    /// losses aligning source and mel time axes.
    pub overlap_lens: Vec<usize>,
}

/// Collate items into one padded batch.
///
/// Every item's tensors are `(time, channel)`; channel dims must agree
/// across the batch within each group (candle surfaces a shape error
/// otherwise).
pub fn collate_batch(items: &[DatasetItem]) -> Result<Batch> {
    if items.is_empty() {
        return Err(Error::Dataset("cannot collate an empty batch".into()));
    }

    let srcs: Vec<&Tensor> = items.iter().map(|item| &item.content_emb).collect();
    let tgts: Vec<&Tensor> = items.iter().map(|item| &item.target_emb).collect();
    let tgt_mels: Vec<&Tensor> = items.iter().map(|item| &item.target_mel).collect();

    let src_lens = lens(&srcs)?;
    let tgt_lens = lens(&tgts)?;
    let tgt_mel_lens = lens(&tgt_mels)?;

    let overlap_lens: Vec<usize> = src_lens
        .iter()
        .zip(tgt_mel_lens.iter())
        .map(|(&s, &m)| s.min(m))
        .collect();

    let srcs = pad_stack(&srcs, &src_lens, 0.0)?;
    let src_masks = ignore_mask(&src_lens, srcs.dims3()?.1)?;

    let tgts = pad_stack(&tgts, &tgt_lens, PAD_VALUE)?;
    let tgt_masks = ignore_mask(&tgt_lens, tgts.dims3()?.1)?;
    let tgts = tgts.transpose(1, 2)?.contiguous()?; // (B, feat_dim, max_tgt_len)

    let tgt_mels = pad_stack(&tgt_mels, &tgt_mel_lens, PAD_VALUE)?;
    let tgt_mels = tgt_mels.transpose(1, 2)?.contiguous()?; // (B, mel_dim, max_tgt_mel_len)

    Ok(Batch {
        srcs,
        src_masks,
        tgts,
        tgt_masks,
        tgt_mels,
        overlap_lens,
    })
}

fn lens(group: &[&Tensor]) -> Result<Vec<usize>> {
    group
        .iter()
        .map(|t| Ok(t.dims2()?.0))
        .collect::<Result<Vec<_>>>()
}

/// Right-pad each `(time, channel)` tensor to the group maximum with
/// `value`, then stack into `(B, max_len, channel)`.
fn pad_stack(group: &[&Tensor], group_lens: &[usize], value: f32) -> Result<Tensor> {
    let max_len = group_lens.iter().copied().max().unwrap_or(0);

    let padded: Vec<Tensor> = group
        .iter()
        .zip(group_lens.iter())
        .map(|(t, &len)| {
            if len == max_len {
                return Ok((*t).clone());
            }
            let (_, dim) = t.dims2()?;
            let pad = Tensor::full(value, (max_len - len, dim), t.device())?;
            Ok(Tensor::cat(&[*t, &pad], 0)?)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Tensor::stack(&padded, 0)?)
}

/// `(B, max_len)` u8 mask, 1 where time index ≥ original length.
fn ignore_mask(group_lens: &[usize], max_len: usize) -> Result<Tensor> {
    let batch = group_lens.len();
    let mut flat = Vec::with_capacity(batch * max_len);
    for &len in group_lens {
        for t in 0..max_len {
            flat.push(u8::from(t >= len));
        }
    }
    Ok(Tensor::from_vec(flat, (batch, max_len), &Device::Cpu)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(src_len: usize, tgt_len: usize, mel_len: usize) -> DatasetItem {
        let fill = |len: usize, dim: usize, base: f32| {
            let data: Vec<f32> = (0..len * dim).map(|i| base + i as f32 * 0.01).collect();
            Tensor::from_vec(data, (len, dim), &Device::Cpu).unwrap()
        };
        DatasetItem {
            content_emb: fill(src_len, 4, 1.0),
            target_emb: fill(tgt_len, 4, 2.0),
            target_mel: fill(mel_len, 3, -3.0),
        }
    }

    #[test]
    fn equal_lengths_pass_through_unchanged() {
        let items = vec![item(5, 5, 5), item(5, 5, 5)];
        let batch = collate_batch(&items).unwrap();

        assert_eq!(batch.srcs.dims3().unwrap(), (2, 5, 4));
        assert_eq!(batch.tgts.dims3().unwrap(), (2, 4, 5));
        assert_eq!(batch.tgt_mels.dims3().unwrap(), (2, 3, 5));

        // All-false masks.
        let src_masks: Vec<Vec<u8>> = batch.src_masks.to_vec2().unwrap();
        assert!(src_masks.iter().flatten().all(|&m| m == 0));
        let tgt_masks: Vec<Vec<u8>> = batch.tgt_masks.to_vec2().unwrap();
        assert!(tgt_masks.iter().flatten().all(|&m| m == 0));

        // Source passes through unchanged.
        let src0: Vec<Vec<f32>> = batch.srcs.get(0).unwrap().to_vec2().unwrap();
        let orig0: Vec<Vec<f32>> = items[0].content_emb.to_vec2().unwrap();
        assert_eq!(src0, orig0);

        // Target comes back transposed but otherwise unchanged.
        let tgt0: Vec<Vec<f32>> = batch.tgts.get(0).unwrap().to_vec2().unwrap();
        let orig_t0: Vec<Vec<f32>> = items[0]
            .target_emb
            .t()
            .unwrap()
            .contiguous()
            .unwrap()
            .to_vec2()
            .unwrap();
        assert_eq!(tgt0, orig_t0);
    }

    #[test]
    fn source_padding_is_zero() {
        let items = vec![item(3, 4, 4), item(6, 4, 4)];
        let batch = collate_batch(&items).unwrap();

        let src0: Vec<Vec<f32>> = batch.srcs.get(0).unwrap().to_vec2().unwrap();
        for frame in &src0[3..] {
            for &v in frame {
                assert_eq!(v, 0.0, "source padding must be exactly zero");
            }
        }
    }

    #[test]
    fn target_padding_is_minus_twenty() {
        let items = vec![item(4, 3, 2), item(4, 6, 5)];
        let batch = collate_batch(&items).unwrap();

        // tgts: (B, dim, max_len); padded frames of example 0 are cols 3..6.
        let tgt0: Vec<Vec<f32>> = batch.tgts.get(0).unwrap().to_vec2().unwrap();
        for channel in &tgt0 {
            for &v in &channel[3..] {
                assert_eq!(v, PAD_VALUE, "target padding must be exactly -20");
            }
        }

        let mel0: Vec<Vec<f32>> = batch.tgt_mels.get(0).unwrap().to_vec2().unwrap();
        for channel in &mel0 {
            for &v in &channel[2..] {
                assert_eq!(v, PAD_VALUE, "mel padding must be exactly -20");
            }
        }
    }

    #[test]
    fn masks_flag_padded_positions_only() {
        let items = vec![item(2, 3, 3), item(5, 4, 4)];
        let batch = collate_batch(&items).unwrap();

        let src_masks: Vec<Vec<u8>> = batch.src_masks.to_vec2().unwrap();
        assert_eq!(src_masks[0], vec![0, 0, 1, 1, 1]);
        assert_eq!(src_masks[1], vec![0, 0, 0, 0, 0]);

        let tgt_masks: Vec<Vec<u8>> = batch.tgt_masks.to_vec2().unwrap();
        assert_eq!(tgt_masks[0], vec![0, 0, 0, 1]);
        assert_eq!(tgt_masks[1], vec![0, 0, 0, 0]);
    }

    #[test]
    fn overlap_is_min_of_src_and_mel_lengths() {
        let items = vec![item(3, 7, 5), item(6, 2, 4), item(4, 4, 4)];
        let batch = collate_batch(&items).unwrap();
        assert_eq!(batch.overlap_lens, vec![3, 4, 4]);
    }

    #[test]
    fn empty_batch_is_an_error() {
        assert!(collate_batch(&[]).is_err());
    }
}
