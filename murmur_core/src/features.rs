use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use kdam::{BarExt, tqdm};
use ndarray::Array2;
use rayon::prelude::*;

use crate::audio::{MfccExtractor, cut_window, decode_to_f32_mono};
use crate::config::FeatureConfig;
use crate::dataset::{WindowRecord, WindowSpec};
use crate::error::MurmurError;

/// Turns window records into MFCC matrices of one fixed shape.
pub struct FeatureExtractor {
    mfcc: MfccExtractor,
    window_secs: f64,
}

impl FeatureExtractor {
    pub fn new(config: &FeatureConfig, window: WindowSpec) -> Self {
        Self {
            mfcc: MfccExtractor::new(config),
            window_secs: window.length_secs,
        }
    }

    /// `(n_mfcc, frames)` of every matrix this extractor produces.
    pub fn shape(&self) -> (usize, usize) {
        self.mfcc.config().matrix_shape(self.window_secs)
    }

    /// Features of a single window.
    pub fn extract(&self, record: &WindowRecord) -> Result<Array2<f32>> {
        let samples = self.decode(&record.path)?;
        self.extract_from_samples(&samples, record.offset_secs)
    }

    /// Features of the window at `offset_secs` of an already decoded clip.
    pub fn extract_from_samples(&self, samples: &[f32], offset_secs: f64) -> Result<Array2<f32>> {
        let rate = self.mfcc.config().sample_rate;
        let window = cut_window(samples, rate, offset_secs, self.window_secs);
        let matrix = self.mfcc.compute(&window);

        if matrix.dim() != self.shape() {
            return Err(MurmurError::FeatureShape {
                expected: self.shape(),
                actual: matrix.dim(),
            }
            .into());
        }
        Ok(matrix)
    }

    /// Features for all `records`, in the same order.
    ///
    /// Each file is decoded once; files are processed on the rayon pool.
    pub fn extract_all(&self, records: &[WindowRecord], desc: &str) -> Result<Vec<Array2<f32>>> {
        let mut by_file: BTreeMap<&Path, Vec<usize>> = BTreeMap::new();
        for (i, record) in records.iter().enumerate() {
            by_file.entry(record.path.as_path()).or_default().push(i);
        }

        let pb = Mutex::new(tqdm!(
            total = records.len(),
            desc = desc.to_string(),
            unit = "window",
            force_refresh = true
        ));

        let per_file: Vec<Vec<(usize, Array2<f32>)>> = by_file
            .into_par_iter()
            .map(|(path, indices)| {
                let samples = self.decode(path)?;
                let matrices = indices
                    .iter()
                    .map(|&i| {
                        self.extract_from_samples(&samples, records[i].offset_secs)
                            .map(|m| (i, m))
                    })
                    .collect::<Result<Vec<_>>>()
                    .with_context(|| format!("failed to extract features: {}", path.display()))?;

                if let Ok(mut pb) = pb.lock() {
                    if let Err(e) = pb.update(matrices.len()) {
                        log::warn!("progress bar: {e}");
                    }
                }
                Ok(matrices)
            })
            .collect::<Result<_>>()?;

        let mut slots: Vec<Option<Array2<f32>>> = vec![None; records.len()];
        for (i, matrix) in per_file.into_iter().flatten() {
            slots[i] = Some(matrix);
        }

        eprintln!();
        slots
            .into_iter()
            .enumerate()
            .map(|(i, m)| {
                m.ok_or_else(|| {
                    anyhow::anyhow!("no features produced for window {i} ({})", records[i].path.display())
                })
            })
            .collect()
    }

    fn decode(&self, path: &Path) -> Result<Vec<f32>> {
        decode_to_f32_mono(path, self.mfcc.config().sample_rate)
            .with_context(|| format!("failed to decode {}", path.display()))
    }
}
