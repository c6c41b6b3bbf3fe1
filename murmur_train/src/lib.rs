//! CNN classifier for heart-sound feature matrices: model, training loop, metrics and artifacts.

pub mod artifact;
pub mod batcher;
pub mod metrics;
pub mod model;
pub mod stats;
pub mod training;

pub use artifact::{ArtifactPaths, ModelMetadata, load_model, save_history, save_model};
pub use batcher::{HeartSoundBatch, HeartSoundBatcher, Sample};
pub use metrics::{ClassificationReport, ConfusionMatrix};
pub use model::{HeartSoundCnn, HeartSoundCnnConfig};
pub use training::{Evaluation, Prediction, TrainingHistory, TrainingOutcome, evaluate, train};
