use std::path::PathBuf;

use thiserror::Error;

/// Domain failures raised by the pipeline.
///
/// Functions return `anyhow::Result`; these variants travel inside it and can
/// be recovered with `downcast_ref`.
#[derive(Error, Debug)]
pub enum MurmurError {
    #[error("no supported audio tracks found in {}", path.display())]
    NoAudioTrack { path: PathBuf },

    #[error("could not determine {what} of {}", path.display())]
    UnknownStreamParameter { path: PathBuf, what: &'static str },

    #[error("decoded audio was empty: {}", path.display())]
    EmptyAudio { path: PathBuf },

    #[error("decoder reset required (chained streams) in {}", path.display())]
    DecoderReset { path: PathBuf },

    #[error("invalid window: length {length}s, overlap {overlap}s")]
    InvalidWindow { length: f64, overlap: f64 },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("dataset is empty: {0}")]
    EmptyDataset(String),

    #[error("feature shape mismatch: expected {expected:?}, got {actual:?}")]
    FeatureShape {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error(
        "windows differ from the training run (trained on {trained}, found {found}); \
         the held-out split would include training windows"
    )]
    DatasetMismatch { trained: String, found: String },

    #[error("unknown class index {0}")]
    UnknownClass(usize),
}
