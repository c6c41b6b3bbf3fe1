use std::time::Instant;

use anyhow::{Result, ensure};
use burn::{
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::{ElementConversion, backend::AutodiffBackend},
};
use kdam::{BarExt, tqdm};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use murmur_core::MurmurError;
use murmur_core::config::TrainingSettings;
use murmur_core::dataset::Label;

use crate::batcher::{HeartSoundBatcher, Sample};
use crate::metrics::{ClassificationReport, ConfusionMatrix};
use crate::model::{HeartSoundCnn, HeartSoundCnnConfig, min_input_side};
use crate::stats::{RunningAverage, Stats};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub valid_loss: f64,
    pub valid_accuracy: f64,
    pub duration_secs: f64,
}

/// Per-epoch curves of a training run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochRecord>,
}

impl TrainingHistory {
    pub fn accuracy_stats(&self) -> Stats {
        self.epochs
            .iter()
            .fold(Stats::new(), |s, e| s.push(e.valid_accuracy))
    }

    pub fn timing_stats(&self) -> Stats {
        self.epochs
            .iter()
            .fold(Stats::new(), |s, e| s.push(e.duration_secs))
    }
}

pub struct TrainingOutcome<B: AutodiffBackend> {
    pub model: HeartSoundCnn<B>,
    pub history: TrainingHistory,
}

/// Prediction for one window.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Prediction {
    pub truth: Label,
    pub predicted: Label,
    pub probabilities: Vec<f32>,
}

#[derive(Clone, Debug)]
pub struct Evaluation {
    pub loss: f64,
    pub accuracy: f64,
    pub predictions: Vec<Prediction>,
}

impl Evaluation {
    pub fn report(&self) -> Result<ClassificationReport> {
        let confusion = ConfusionMatrix::from_pairs(
            Label::class_names(),
            self.predictions
                .iter()
                .map(|p| (p.truth.index(), p.predicted.index())),
        )?;
        Ok(ClassificationReport::new(confusion))
    }
}

fn check_samples(samples: &[Sample], what: &str) -> Result<()> {
    let Some(first) = samples.first() else {
        return Err(MurmurError::EmptyDataset(format!("{what} set has no samples")).into());
    };

    let shape = first.features.dim();
    let min_side = min_input_side();
    ensure!(
        shape.0 >= min_side && shape.1 >= min_side,
        "{what} features {shape:?} are smaller than the network's {min_side}x{min_side} minimum"
    );

    if let Some(bad) = samples.iter().find(|s| s.features.dim() != shape) {
        return Err(MurmurError::FeatureShape {
            expected: shape,
            actual: bad.features.dim(),
        }
        .into());
    }
    Ok(())
}

/// Fits a fresh network on `train_set`, validating on `valid_set` after every epoch.
pub fn train<B: AutodiffBackend>(
    settings: &TrainingSettings,
    model_config: &HeartSoundCnnConfig,
    train_set: &[Sample],
    valid_set: &[Sample],
    device: &B::Device,
) -> Result<TrainingOutcome<B>> {
    check_samples(train_set, "training")?;
    check_samples(valid_set, "validation")?;
    ensure!(settings.batch_size > 0, "batch size must be positive");

    let batcher = HeartSoundBatcher;
    let mut rng = StdRng::seed_from_u64(settings.seed);
    let mut model = model_config.init::<B>(device);
    let mut optim = AdamConfig::new().init::<B, HeartSoundCnn<B>>();
    let loss_fn = CrossEntropyLossConfig::new().init(device);

    let mut history = TrainingHistory::default();
    let mut order: Vec<usize> = (0..train_set.len()).collect();

    let mut epoch_pb = tqdm!(
        total = settings.epochs,
        desc = "Training",
        animation = "fillup",
        unit = "epoch",
        force_refresh = true
    );

    for epoch in 1..=settings.epochs {
        let timer_epoch = Instant::now();
        order.shuffle(&mut rng);

        let mut loss_avg = RunningAverage::new();
        let mut correct = 0usize;

        for chunk in order.chunks(settings.batch_size) {
            let items: Vec<&Sample> = chunk.iter().map(|&i| &train_set[i]).collect();
            let batch = batcher.batch_refs::<B>(&items, device);

            let output = model.forward(batch.features);
            let loss = loss_fn.forward(output.clone(), batch.targets.clone());

            correct += count_correct(output, batch.targets);
            loss_avg = loss_avg.push_weighted(loss.clone().into_scalar().elem::<f64>(), items.len());

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(settings.learning_rate, model, grads);
        }

        let valid = evaluate(&model.valid(), valid_set, settings.batch_size, device)?;

        let record = EpochRecord {
            epoch,
            train_loss: loss_avg.avg().unwrap_or_default(),
            train_accuracy: correct as f64 / train_set.len() as f64,
            valid_loss: valid.loss,
            valid_accuracy: valid.accuracy,
            duration_secs: timer_epoch.elapsed().as_secs_f64(),
        };

        let line = format!(
            "EPOCH {epoch:>3}: loss {:.4}, accuracy {:>6.2}% | val_loss {:.4}, val_accuracy {:>6.2}%",
            record.train_loss,
            record.train_accuracy * 100.0,
            record.valid_loss,
            record.valid_accuracy * 100.0,
        );
        if let Err(e) = epoch_pb.write(&line).and_then(|_| epoch_pb.update(1)) {
            log::warn!("progress bar: {e}");
            log::info!("{line}");
        }

        log::debug!("{record:?}");
        history.epochs.push(record);
    }

    // Preserve space for the progress bar.
    eprintln!();

    Ok(TrainingOutcome { model, history })
}

fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let [batch, _] = logits.dims();
    let predicted = logits.argmax(1).reshape([batch]);
    let correct = predicted.equal(targets).int().sum().into_scalar().elem::<i64>();
    correct.max(0) as usize
}

/// Loss, accuracy and per-window predictions of `model` on `samples`.
pub fn evaluate<B: Backend>(
    model: &HeartSoundCnn<B>,
    samples: &[Sample],
    batch_size: usize,
    device: &B::Device,
) -> Result<Evaluation> {
    let batcher = HeartSoundBatcher;
    let loss_fn = CrossEntropyLossConfig::new().init(device);

    let mut loss_avg = RunningAverage::new();
    let mut predictions = Vec::with_capacity(samples.len());

    for chunk in samples.chunks(batch_size.max(1)) {
        let items: Vec<&Sample> = chunk.iter().collect();
        let batch = batcher.batch_refs::<B>(&items, device);

        let logits = model.forward(batch.features);
        let loss = loss_fn.forward(logits.clone(), batch.targets);
        loss_avg = loss_avg.push_weighted(loss.into_scalar().elem::<f64>(), items.len());

        let [_, classes] = logits.dims();
        let probabilities: Vec<f32> = burn::tensor::activation::softmax(logits, 1)
            .into_data()
            .iter::<f32>()
            .collect();

        for (sample, probs) in chunk.iter().zip(probabilities.chunks(classes)) {
            predictions.push(Prediction {
                truth: sample.label,
                predicted: predicted_label(probs)?,
                probabilities: probs.to_vec(),
            });
        }
    }

    let correct = predictions.iter().filter(|p| p.truth == p.predicted).count();
    let accuracy = if predictions.is_empty() {
        0.0
    } else {
        correct as f64 / predictions.len() as f64
    };

    Ok(Evaluation {
        loss: loss_avg.avg().unwrap_or_default(),
        accuracy,
        predictions,
    })
}

/// Class with the highest probability.
fn predicted_label(probabilities: &[f32]) -> Result<Label, MurmurError> {
    Label::from_index(argmax(probabilities))
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use ndarray::Array2;

    type TestBackend = Autodiff<NdArray>;

    fn samples(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| {
                let label = if i % 2 == 0 { Label::Normal } else { Label::Abnormal };
                let level = if label == Label::Normal { 1.0 } else { -1.0 };
                Sample {
                    features: Array2::from_shape_fn((32, 40), |(r, c)| {
                        level + ((r * 7 + c * 3 + i) % 5) as f32 * 0.1
                    }),
                    label,
                }
            })
            .collect()
    }

    fn settings(epochs: usize) -> TrainingSettings {
        TrainingSettings {
            epochs,
            batch_size: 4,
            ..TrainingSettings::default()
        }
    }

    #[test]
    fn records_one_entry_per_epoch() {
        let device = Default::default();
        let outcome = train::<TestBackend>(
            &settings(2),
            &HeartSoundCnnConfig::new(),
            &samples(10),
            &samples(4),
            &device,
        )
        .unwrap();

        assert_eq!(2, outcome.history.epochs.len());
        for (i, e) in outcome.history.epochs.iter().enumerate() {
            assert_eq!(i + 1, e.epoch);
            assert!(e.train_loss.is_finite());
            assert!(e.valid_loss.is_finite());
            assert!((0.0..=1.0).contains(&e.train_accuracy));
            assert!((0.0..=1.0).contains(&e.valid_accuracy));
        }
        assert_eq!(2, outcome.history.accuracy_stats().count());
    }

    #[test]
    fn evaluation_covers_every_sample() {
        let device = Default::default();
        let model = HeartSoundCnnConfig::new().init::<NdArray>(&device);
        let valid = samples(7);

        let evaluation = evaluate(&model, &valid, 3, &device).unwrap();
        assert_eq!(7, evaluation.predictions.len());
        for (p, s) in evaluation.predictions.iter().zip(&valid) {
            assert_eq!(s.label, p.truth);
            assert_eq!(2, p.probabilities.len());
        }

        let report = evaluation.report().unwrap();
        assert_eq!(7, report.confusion.total());
        assert!((report.accuracy - evaluation.accuracy).abs() < 1e-9);
    }

    #[test]
    fn rejects_empty_or_ragged_sets() {
        let device = Default::default();
        let config = HeartSoundCnnConfig::new();

        let err = train::<TestBackend>(&settings(1), &config, &[], &samples(2), &device)
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<MurmurError>(),
            Some(MurmurError::EmptyDataset(_))
        ));

        let mut ragged = samples(3);
        ragged[2].features = Array2::zeros((32, 41));
        let err = train::<TestBackend>(&settings(1), &config, &ragged, &samples(2), &device)
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<MurmurError>(),
            Some(MurmurError::FeatureShape { .. })
        ));

        let tiny = vec![Sample {
            features: Array2::zeros((8, 8)),
            label: Label::Normal,
        }];
        assert!(train::<TestBackend>(&settings(1), &config, &tiny, &tiny, &device).is_err());
    }

    #[test]
    fn argmax_picks_first_maximum() {
        assert_eq!(1, argmax(&[0.2, 0.8]));
        assert_eq!(0, argmax(&[0.5, 0.5]));
    }

    #[test]
    fn out_of_range_prediction_is_an_error() {
        assert_eq!(Label::Normal, predicted_label(&[0.3, 0.7]).unwrap());
        assert!(matches!(
            predicted_label(&[0.1, 0.2, 0.7]),
            Err(MurmurError::UnknownClass(2))
        ));
    }
}
