use anyhow::Result;
use burn::{
    backend::{Autodiff, NdArray, Wgpu},
    module::AutodiffModule,
    tensor::backend::AutodiffBackend,
};
use chrono::Utc;

use murmur_core::dataset::{Label, RecordSetId, split_dataset};
use murmur_core::{FeatureExtractor, PipelineConfig};
use murmur_train::{HeartSoundCnnConfig, ModelMetadata, evaluate, save_history, save_model, train};

use crate::cli::{BackendArg, TrainArgs};
use crate::commands::{HeldOutRun, load_records, print_evaluation, to_samples};

pub fn run(args: &TrainArgs, mut config: PipelineConfig) -> Result<()> {
    args.apply(&mut config);
    config.validate()?;

    match args.backend {
        BackendArg::Wgpu => run_on::<Autodiff<Wgpu>>(args, &config).map(|_| ()),
        BackendArg::Ndarray => run_on::<Autodiff<NdArray>>(args, &config).map(|_| ()),
    }
}

pub(crate) fn run_on<B: AutodiffBackend>(
    args: &TrainArgs,
    config: &PipelineConfig,
) -> Result<HeldOutRun> {
    let device = B::Device::default();
    let settings = &config.training;

    let records = load_records(&args.data, config)?;
    let record_set = RecordSetId::of(&records);
    log::info!("Dataset: {record_set}");

    let (train_records, test_records) = split_dataset(
        records,
        settings.test_fraction,
        settings.seed,
        settings.split,
    );
    log::info!(
        "Split ({:?}): {} training windows, {} test windows",
        settings.split,
        train_records.len(),
        test_records.len()
    );

    let extractor = FeatureExtractor::new(&config.features, config.dataset.window);
    log::info!("Feature matrix shape {:?}", extractor.shape());
    let train_set = to_samples(&extractor, &train_records, "Train features")?;
    let test_set = to_samples(&extractor, &test_records, "Test features")?;

    let model_config = HeartSoundCnnConfig::new();
    let outcome = train::<B>(settings, &model_config, &train_set, &test_set, &device)?;

    let model = outcome.model.valid();
    let evaluation = evaluate(&model, &test_set, settings.batch_size, &device)?;

    let history = &outcome.history;
    if let (Some(best), Some(avg_secs)) = (
        history.accuracy_stats().max(),
        history.timing_stats().avg(),
    ) {
        log::info!(
            "Best validation accuracy {:.2}%, {avg_secs:.2}s per epoch",
            best * 100.0
        );
    }
    print_evaluation(&evaluation)?;

    let metadata = ModelMetadata {
        created: Utc::now(),
        classes: Label::class_names(),
        dataset: config.dataset.clone(),
        manifest: args
            .data
            .manifest
            .as_ref()
            .map(|p| std::fs::canonicalize(p).unwrap_or_else(|_| p.clone())),
        records: record_set,
        features: config.features.clone(),
        window: config.dataset.window,
        training: settings.clone(),
        model: model_config,
        test_accuracy: evaluation.accuracy,
        test_loss: evaluation.loss,
    };
    save_model(&model, &metadata, &config.output.model_path)?;
    if config.output.write_history {
        save_history(history, &config.output.model_path)?;
    }

    Ok(HeldOutRun {
        test_records,
        evaluation,
    })
}
