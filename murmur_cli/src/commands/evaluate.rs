use anyhow::Result;
use burn::{
    backend::{NdArray, Wgpu},
    prelude::Backend,
};

use murmur_core::dataset::{RecordSetId, split_dataset};
use murmur_core::{FeatureExtractor, MurmurError, PipelineConfig};
use murmur_train::{ModelMetadata, evaluate, load_model};

use crate::cli::{BackendArg, DataArgs, EvaluateArgs};
use crate::commands::{HeldOutRun, load_records, print_evaluation, to_samples};

pub fn run(args: &EvaluateArgs, config: PipelineConfig) -> Result<()> {
    match args.backend {
        BackendArg::Wgpu => run_on::<Wgpu>(args, config).map(|_| ()),
        BackendArg::Ndarray => run_on::<NdArray>(args, config).map(|_| ()),
    }
}

/// Data source of the training run unless the command line names another.
fn data_source(args: &DataArgs, metadata: &ModelMetadata) -> DataArgs {
    let overridden = args.manifest.is_some() || !args.data_dir.is_empty() || args.recursive;
    if overridden {
        args.clone()
    } else {
        DataArgs {
            manifest: metadata.manifest.clone(),
            ..args.clone()
        }
    }
}

fn check_record_set(trained: &RecordSetId, found: &RecordSetId, allow_mismatch: bool) -> Result<()> {
    if trained == found {
        return Ok(());
    }

    let err = MurmurError::DatasetMismatch {
        trained: trained.to_string(),
        found: found.to_string(),
    };
    if allow_mismatch {
        log::warn!("{err}");
        Ok(())
    } else {
        Err(err.into())
    }
}

pub(crate) fn run_on<B: Backend>(args: &EvaluateArgs, mut config: PipelineConfig) -> Result<HeldOutRun> {
    let device = B::Device::default();
    let model_path = args
        .model
        .clone()
        .unwrap_or_else(|| config.output.model_path.clone());

    let (model, metadata) = load_model::<B>(&model_path, &device)?;

    // Windows, features and split follow the training run.
    config.dataset = metadata.dataset.clone();
    config.dataset.window = metadata.window;
    config.features = metadata.features.clone();
    config.training = metadata.training.clone();
    args.data.apply(&mut config);
    args.split.apply(&mut config);
    if let Some(batch_size) = args.batch_size {
        config.training.batch_size = batch_size;
    }
    config.validate()?;

    if config.training.split != metadata.training.split
        || config.training.seed != metadata.training.seed
        || config.training.test_fraction != metadata.training.test_fraction
    {
        log::warn!("Split settings differ from training; held-out windows may have been trained on");
    }

    let records = load_records(&data_source(&args.data, &metadata), &config)?;
    check_record_set(
        &metadata.records,
        &RecordSetId::of(&records),
        args.allow_dataset_mismatch,
    )?;

    let settings = &config.training;
    let (_, test_records) = split_dataset(
        records,
        settings.test_fraction,
        settings.seed,
        settings.split,
    );
    log::info!("Evaluating on {} held-out windows", test_records.len());

    let extractor = FeatureExtractor::new(&config.features, config.dataset.window);
    let test_set = to_samples(&extractor, &test_records, "Test features")?;

    let evaluation = evaluate(&model, &test_set, settings.batch_size, &device)?;
    print_evaluation(&evaluation)?;

    Ok(HeldOutRun {
        test_records,
        evaluation,
    })
}
