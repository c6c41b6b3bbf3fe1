use burn::prelude::*;
use ndarray::Array2;

use murmur_core::dataset::Label;

/// One feature matrix with its class.
#[derive(Clone, Debug)]
pub struct Sample {
    pub features: Array2<f32>,
    pub label: Label,
}

#[derive(Clone, Debug)]
pub struct HeartSoundBatch<B: Backend> {
    /// `[batch, 1, n_mfcc, frames]`
    pub features: Tensor<B, 4>,
    /// `[batch]` class indices.
    pub targets: Tensor<B, 1, Int>,
}

#[derive(Clone, Debug, Default)]
pub struct HeartSoundBatcher;

impl HeartSoundBatcher {
    /// Stacks borrowed samples into one batch. All matrices must share a shape.
    pub fn batch_refs<B: Backend>(&self, items: &[&Sample], device: &B::Device) -> HeartSoundBatch<B> {
        let (rows, cols) = items.first().map_or((0, 0), |s| s.features.dim());

        let mut flat = Vec::with_capacity(items.len() * rows * cols);
        let mut targets = Vec::with_capacity(items.len());
        for item in items {
            debug_assert_eq!((rows, cols), item.features.dim());
            flat.extend(item.features.iter().copied());
            targets.push(item.label.index() as i64);
        }

        HeartSoundBatch {
            features: Tensor::from_data(TensorData::new(flat, [items.len(), 1, rows, cols]), device),
            targets: Tensor::from_data(TensorData::new(targets, [items.len()]), device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn stacks_samples_in_order() {
        let device = Default::default();
        let samples = vec![
            Sample {
                features: Array2::from_shape_fn((2, 3), |(r, c)| (r * 3 + c) as f32),
                label: Label::Normal,
            },
            Sample {
                features: Array2::from_elem((2, 3), -1.0),
                label: Label::Abnormal,
            },
        ];

        let refs: Vec<&Sample> = samples.iter().collect();
        let batch = HeartSoundBatcher.batch_refs::<NdArray>(&refs, &device);
        assert_eq!([2, 1, 2, 3], batch.features.dims());

        let values: Vec<f32> = batch.features.into_data().iter::<f32>().collect();
        assert_eq!(
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, -1.0, -1.0, -1.0, -1.0, -1.0, -1.0],
            values
        );

        let targets: Vec<i64> = batch.targets.into_data().iter::<i64>().collect();
        assert_eq!(vec![1, 0], targets);
    }
}
