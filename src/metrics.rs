//! Objective speech-quality metrics.
//!
//! - [`stoi`] — short-time objective intelligibility (Taal et al. 2011)
//! - [`pesq`] — P.862-style perceptual quality score (simplified model)
//! - [`eval`] — directory-pair evaluator: match clean/degraded files by
//!   relative path and average both metrics in parallel

pub mod eval;
pub mod pesq;
pub mod stoi;

pub use eval::{collect_pairs, evaluate_dirs, evaluate_pairs, MetricReport, WavPair};
pub use pesq::pesq;
pub use stoi::stoi;
