use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use burn::{prelude::*, record::CompactRecorder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use murmur_core::config::{DatasetConfig, FeatureConfig, TrainingSettings};
use murmur_core::dataset::{RecordSetId, WindowSpec};

use crate::model::{HeartSoundCnn, HeartSoundCnnConfig};
use crate::training::TrainingHistory;

/// Everything needed to rebuild a trained classifier and feed it matching features.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub created: DateTime<Utc>,
    pub classes: Vec<String>,
    /// Directory scan settings the windows came from.
    pub dataset: DatasetConfig,
    /// Manifest the windows were read from, if any.
    pub manifest: Option<PathBuf>,
    /// Windows before the split.
    pub records: RecordSetId,
    pub features: FeatureConfig,
    pub window: WindowSpec,
    pub training: TrainingSettings,
    pub model: HeartSoundCnnConfig,
    pub test_accuracy: f64,
    pub test_loss: f64,
}

/// Paths of one saved model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub weights: PathBuf,
    pub metadata: PathBuf,
    pub history: PathBuf,
}

impl ArtifactPaths {
    pub fn new(model_path: &Path) -> Self {
        Self {
            weights: model_path.with_extension("mpk"),
            metadata: model_path.with_extension("json"),
            history: model_path.with_extension("history.json"),
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }

    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("failed to write {}", path.display()))
}

/// Saves weights with the compact recorder, then the metadata sidecar next to them.
///
/// The sidecar is only written once the weights are on disk.
pub fn save_model<B: Backend>(
    model: &HeartSoundCnn<B>,
    metadata: &ModelMetadata,
    model_path: &Path,
) -> Result<ArtifactPaths> {
    let paths = ArtifactPaths::new(model_path);

    if let Some(parent) = model_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    model
        .clone()
        .save_file(model_path, &CompactRecorder::new())
        .map_err(|e| anyhow!("failed to save model {}: {e:?}", paths.weights.display()))?;
    write_json(&paths.metadata, metadata)?;

    log::info!("Saved model to {}", paths.weights.display());
    Ok(paths)
}

pub fn save_history(history: &TrainingHistory, model_path: &Path) -> Result<PathBuf> {
    let path = ArtifactPaths::new(model_path).history;
    write_json(&path, history)?;
    log::info!("Saved training history to {}", path.display());
    Ok(path)
}

pub fn read_metadata(model_path: &Path) -> Result<ModelMetadata> {
    let path = ArtifactPaths::new(model_path).metadata;
    let file = File::open(&path).with_context(|| format!("failed to open {}", path.display()))?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("failed to parse {}", path.display()))
}

/// Rebuilds the network described by the sidecar and loads its weights.
pub fn load_model<B: Backend>(
    model_path: &Path,
    device: &B::Device,
) -> Result<(HeartSoundCnn<B>, ModelMetadata)> {
    let metadata = read_metadata(model_path)?;
    let paths = ArtifactPaths::new(model_path);

    let model = metadata
        .model
        .init::<B>(device)
        .load_file(model_path, &CompactRecorder::new(), device)
        .map_err(|e| anyhow!("failed to load model {}: {e:?}", paths.weights.display()))?;

    log::info!(
        "Loaded model {} (trained {}, test accuracy {:.2}%)",
        paths.weights.display(),
        metadata.created.format("%Y-%m-%d %H:%M"),
        metadata.test_accuracy * 100.0
    );
    Ok((model, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use murmur_core::dataset::{Label, WindowRecord};

    use crate::training::EpochRecord;

    type TestBackend = NdArray;

    fn metadata() -> ModelMetadata {
        ModelMetadata {
            created: Utc::now(),
            classes: Label::class_names(),
            dataset: DatasetConfig::default(),
            manifest: None,
            records: RecordSetId::of(&[WindowRecord {
                path: PathBuf::from("normal__1.wav"),
                label: Label::Normal,
                offset_secs: 0.0,
                file_duration_secs: 3.0,
            }]),
            features: FeatureConfig::default(),
            window: WindowSpec::default(),
            training: TrainingSettings::default(),
            model: HeartSoundCnnConfig::new(),
            test_accuracy: 0.8125,
            test_loss: 0.45,
        }
    }

    #[test]
    fn paths_share_a_stem() {
        let paths = ArtifactPaths::new(Path::new("out/trained_heartbeat_classifier"));
        assert_eq!(Path::new("out/trained_heartbeat_classifier.mpk"), paths.weights);
        assert_eq!(Path::new("out/trained_heartbeat_classifier.json"), paths.metadata);
        assert_eq!(
            Path::new("out/trained_heartbeat_classifier.history.json"),
            paths.history
        );
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("models").join("classifier");
        let device = Default::default();

        let model = HeartSoundCnnConfig::new().init::<TestBackend>(&device);
        let paths = save_model(&model, &metadata(), &model_path).unwrap();
        assert!(paths.weights.is_file());
        assert!(paths.metadata.is_file());

        let (loaded, meta) = load_model::<TestBackend>(&model_path, &device).unwrap();
        assert_eq!(vec!["abnormal", "normal"], meta.classes);
        assert_eq!(0.8125, meta.test_accuracy);
        assert_eq!(FeatureConfig::default(), meta.features);
        assert_eq!(DatasetConfig::default(), meta.dataset);
        assert_eq!(metadata().records, meta.records);

        let input = Tensor::<TestBackend, 4>::ones([1, 1, 40, 130], &device);
        let before: Vec<f32> = model.forward(input.clone()).into_data().iter::<f32>().collect();
        let after: Vec<f32> = loaded.forward(input).into_data().iter::<f32>().collect();
        // weights are stored at half precision
        for (a, b) in before.iter().zip(&after) {
            assert!((a - b).abs() < 5e-2, "{a} vs {b}");
        }
    }

    #[test]
    fn failed_weights_leave_no_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("classifier");
        // a directory where the weights file should go
        std::fs::create_dir(dir.path().join("classifier.mpk")).unwrap();

        let device = Default::default();
        let model = HeartSoundCnnConfig::new().init::<TestBackend>(&device);
        assert!(save_model(&model, &metadata(), &model_path).is_err());
        assert!(!ArtifactPaths::new(&model_path).metadata.exists());
    }

    #[test]
    fn history_is_json() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("classifier");
        let history = TrainingHistory {
            epochs: vec![EpochRecord {
                epoch: 1,
                train_loss: 0.7,
                train_accuracy: 0.5,
                valid_loss: 0.69,
                valid_accuracy: 0.55,
                duration_secs: 1.5,
            }],
        };

        let path = save_history(&history, &model_path).unwrap();
        let read: TrainingHistory =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(history, read);
    }

    #[test]
    fn missing_sidecar_fails() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        assert!(load_model::<TestBackend>(&dir.path().join("nothing"), &device).is_err());
    }
}
