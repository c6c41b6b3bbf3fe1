pub mod evaluate;
pub mod index;
pub mod train;

use anyhow::Result;

use murmur_core::dataset::{DatasetIndexer, WindowRecord};
use murmur_core::{FeatureExtractor, MurmurError, PipelineConfig};
use murmur_train::{Evaluation, Sample};

use crate::cli::DataArgs;

/// Held-out windows of a run and how the model scored on them.
pub struct HeldOutRun {
    pub test_records: Vec<WindowRecord>,
    pub evaluation: Evaluation,
}

/// Windows from the manifest when one is given, otherwise from a fresh scan.
pub fn load_records(data: &DataArgs, config: &PipelineConfig) -> Result<Vec<WindowRecord>> {
    let records = match &data.manifest {
        Some(path) => murmur_tools::read_manifest(path)?,
        None => {
            DatasetIndexer::new(config.dataset.clone())
                .index_configured()?
                .records
        }
    };

    if records.is_empty() {
        return Err(MurmurError::EmptyDataset("no windows to work with".into()).into());
    }
    Ok(records)
}

pub fn to_samples(
    extractor: &FeatureExtractor,
    records: &[WindowRecord],
    desc: &str,
) -> Result<Vec<Sample>> {
    let features = extractor.extract_all(records, desc)?;
    Ok(features
        .into_iter()
        .zip(records)
        .map(|(features, record)| Sample {
            features,
            label: record.label,
        })
        .collect())
}

pub fn print_evaluation(evaluation: &Evaluation) -> Result<()> {
    let report = evaluation.report()?;
    println!("Test loss: {:.4}", evaluation.loss);
    println!("Test accuracy: {:.2}%", evaluation.accuracy * 100.0);
    println!();
    println!("{report}");
    Ok(())
}
