use burn::{
    nn::{
        Dropout, DropoutConfig, Linear, LinearConfig, Relu,
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
    },
    prelude::*,
};

use murmur_core::dataset::Label;

/// Filters of the four convolution blocks.
pub const BLOCK_FILTERS: [usize; 4] = [16, 32, 64, 128];

#[derive(Config, Debug)]
pub struct HeartSoundCnnConfig {
    /// Dropout after the first three blocks.
    #[config(default = 0.2)]
    pub dropout: f64,
    /// Dropout after the last block.
    #[config(default = 0.5)]
    pub final_dropout: f64,
}

/// `Conv2d(k=2) -> ReLU -> MaxPool(2) -> Dropout`.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    activation: Relu,
    pool: MaxPool2d,
    dropout: Dropout,
}

impl<B: Backend> ConvBlock<B> {
    fn new(channels: [usize; 2], dropout: f64, device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new(channels, [2, 2]).init(device),
            activation: Relu::new(),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            dropout: DropoutConfig::new(dropout).init(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool.forward(x);
        self.dropout.forward(x)
    }
}

/// Four convolution blocks, global average pooling and a dense output layer.
///
/// Input `[batch, 1, n_mfcc, frames]`, output one logit per [`Label`].
#[derive(Module, Debug)]
pub struct HeartSoundCnn<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
    global_pool: AdaptiveAvgPool2d,
    output: Linear<B>,
}

impl HeartSoundCnnConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> HeartSoundCnn<B> {
        let mut blocks = Vec::with_capacity(BLOCK_FILTERS.len());
        let mut channels_in = 1;
        for (i, &filters) in BLOCK_FILTERS.iter().enumerate() {
            let dropout = if i + 1 == BLOCK_FILTERS.len() {
                self.final_dropout
            } else {
                self.dropout
            };
            blocks.push(ConvBlock::new([channels_in, filters], dropout, device));
            channels_in = filters;
        }

        HeartSoundCnn {
            blocks,
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            output: LinearConfig::new(channels_in, Label::ALL.len()).init(device),
        }
    }
}

impl<B: Backend> HeartSoundCnn<B> {
    pub fn forward(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = features;
        for block in &self.blocks {
            x = block.forward(x);
        }

        let x = self.global_pool.forward(x);
        let [batch, channels, _, _] = x.dims();
        self.output.forward(x.reshape([batch, channels]))
    }

    /// Class probabilities.
    pub fn predict(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        burn::tensor::activation::softmax(self.forward(features), 1)
    }
}

/// Smallest `(n_mfcc, frames)` input that survives four `conv(2) + pool(2)` blocks.
pub fn min_input_side() -> usize {
    BLOCK_FILTERS.iter().fold(1, |side, _| side * 2 + 1)
}
