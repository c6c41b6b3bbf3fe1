//! Heart-sound dataset preparation: decoding, window slicing and MFCC features.

pub mod audio;
pub mod config;
pub mod dataset;
pub mod error;
pub mod features;

pub use config::PipelineConfig;
pub use error::MurmurError;
pub use features::FeatureExtractor;
