//! Error types for vc-data-rs.

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Candle tensor error.
    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),

    /// Audio processing error (WAV I/O, resampling, STFT).
    #[error("audio: {0}")]
    Audio(String),

    /// Dataset assembly or access error (bad manifest entry, index out of
    /// range, malformed feature bundle).
    #[error("dataset: {0}")]
    Dataset(String),

    /// Speech-quality metric error (unpaired directories, sample-rate
    /// mismatch, empty file set).
    #[error("metric: {0}")]
    Metric(String),

    /// Invalid configuration.
    #[error("config: {0}")]
    Config(String),

    /// I/O error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error (manifest parsing).
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<hound::Error> for Error {
    fn from(error: hound::Error) -> Self {
        Error::Audio(error.to_string())
    }
}
