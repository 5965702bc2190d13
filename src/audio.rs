//! Audio utilities: WAV I/O, log-mel spectrograms, resampling.
//!
//! Everything here operates on mono f32 sample buffers in [-1, 1].

mod mel;
mod resample;
mod wav;

pub use mel::{MelConfig, MelSpectrogram};
pub use resample::resample;
pub use wav::{peak_normalize, read_wav, read_wav_mono, write_wav};
