use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::dataset::split::SplitStrategy;
use crate::dataset::slicing::WindowSpec;
use crate::error::MurmurError;

/// Whole pipeline configuration, loadable from TOML.
///
/// Every field has a default, so an empty file (or no file) is valid.
///
/// ```
/// use murmur_core::config::PipelineConfig;
/// let config: PipelineConfig = toml::from_str("[training]\nepochs = 10\n").unwrap();
/// assert_eq!(config.training.epochs, 10);
/// assert_eq!(config.training.batch_size, 128);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub dataset: DatasetConfig,
    pub features: FeatureConfig,
    pub training: TrainingSettings,
    pub output: OutputConfig,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Directories scanned for recordings.
    pub directories: Vec<PathBuf>,
    /// Descend into sub-directories.
    pub recursive: bool,
    /// Accepted file extensions, lower case, without the dot.
    pub extensions: Vec<String>,
    /// Label key mapped to the normal class. Every other kept key is abnormal.
    pub normal_label: String,
    /// Label keys whose files are left out of the dataset.
    pub excluded_labels: Vec<String>,
    pub window: WindowSpec,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            directories: vec![
                PathBuf::from("./datasets/set_a"),
                PathBuf::from("./datasets/set_b"),
            ],
            recursive: false,
            extensions: vec!["wav".to_string()],
            normal_label: "normal".to_string(),
            excluded_labels: vec![
                "Aunlabelledtest".to_string(),
                "Bunlabelledtest".to_string(),
                "artifact".to_string(),
            ],
            window: WindowSpec::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub sample_rate: u32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    pub n_mfcc: usize,
    /// Floor of the dB scale relative to the loudest bin.
    pub top_db: f32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22_050,
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
            n_mfcc: 40,
            top_db: 80.0,
        }
    }
}

impl FeatureConfig {
    /// Number of samples in one window of `window_secs` at the feature rate.
    pub fn window_samples(&self, window_secs: f64) -> usize {
        (window_secs * f64::from(self.sample_rate)).round() as usize
    }

    /// STFT frame count for `samples` input samples (centered frames).
    pub fn frames_for(&self, samples: usize) -> usize {
        1 + samples / self.hop_length
    }

    /// Shape `(n_mfcc, frames)` of a feature matrix for one window.
    pub fn matrix_shape(&self, window_secs: f64) -> (usize, usize) {
        (self.n_mfcc, self.frames_for(self.window_samples(window_secs)))
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TrainingSettings {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Fraction of windows held out for validation.
    pub test_fraction: f64,
    pub seed: u64,
    pub split: SplitStrategy,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            epochs: 300,
            batch_size: 128,
            learning_rate: 0.001,
            test_fraction: 0.2,
            seed: 42,
            split: SplitStrategy::Window,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Model weights path. The recorder appends its own extension.
    pub model_path: PathBuf,
    /// Write per-epoch history as JSON next to the model.
    pub write_history: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("trained_heartbeat_classifier"),
            write_history: true,
        }
    }
}

impl PipelineConfig {
    /// Checks the values a run depends on.
    ///
    /// # Errors
    /// Returns [`MurmurError::Config`] or [`MurmurError::InvalidWindow`].
    pub fn validate(&self) -> Result<()> {
        self.dataset.window.validate()?;

        let f = &self.features;
        if f.sample_rate == 0 || f.n_fft == 0 || f.hop_length == 0 {
            return Err(MurmurError::Config(
                "sample_rate, n_fft and hop_length must be positive".into(),
            )
            .into());
        }
        if f.n_mfcc == 0 || f.n_mfcc > f.n_mels {
            return Err(MurmurError::Config(format!(
                "n_mfcc must be in 1..={}, given {}",
                f.n_mels, f.n_mfcc
            ))
            .into());
        }

        let t = &self.training;
        if !(t.test_fraction > 0.0 && t.test_fraction < 1.0) {
            return Err(MurmurError::Config(format!(
                "test_fraction must be in (0, 1), given {}",
                t.test_fraction
            ))
            .into());
        }
        if t.epochs == 0 || t.batch_size == 0 {
            return Err(
                MurmurError::Config("epochs and batch_size must be positive".into()).into(),
            );
        }
        if !(t.learning_rate > 0.0) {
            return Err(MurmurError::Config(format!(
                "learning_rate must be positive, given {}",
                t.learning_rate
            ))
            .into());
        }

        Ok(())
    }
}

/// Reads a TOML configuration file.
///
/// # Errors
/// Fails if the file can't be read or parsed.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;

    toml::from_str(&content)
        .with_context(|| format!("failed to parse TOML config: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matrix_shape() {
        let f = FeatureConfig::default();
        assert_eq!(f.window_samples(3.0), 66_150);
        assert_eq!(f.matrix_shape(3.0), (40, 130));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [dataset]
            recursive = true

            [dataset.window]
            length_secs = 4.0

            [training]
            split = "file"
            "#,
        )
        .unwrap();

        assert!(config.dataset.recursive);
        assert_eq!(config.dataset.window.length_secs, 4.0);
        assert_eq!(config.dataset.window.overlap_secs, 1.0);
        assert_eq!(config.dataset.normal_label, "normal");
        assert_eq!(config.training.split, SplitStrategy::File);
        assert_eq!(config.training.epochs, 300);
        assert_eq!(config.features, FeatureConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("murmur.toml");
        std::fs::write(&path, "[features]\nn_mfcc = 20\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.features.n_mfcc, 20);
        assert!(load_config(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.features.n_mfcc = 200;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.training.test_fraction = 1.0;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MurmurError>(),
            Some(MurmurError::Config(_))
        ));

        let mut config = PipelineConfig::default();
        config.dataset.window.overlap_secs = 3.0;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MurmurError>(),
            Some(MurmurError::InvalidWindow { .. })
        ));
    }
}
