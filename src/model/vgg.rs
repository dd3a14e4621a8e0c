//! VGG feature extractor
//!
//! Stages of 3x3 convolutions with ReLU, each closed by a 2x2 max-pool,
//! followed by adaptive average pooling and flattening. Only the
//! convolutional part is built here; the classifier on top is replaced by
//! [`ClassifierHead`](super::head::ClassifierHead).

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

/// Configuration for a VGG backbone
#[derive(Config, Debug)]
pub struct VggConfig {
    /// `(out_channels, conv_layers)` per stage
    pub stages: Vec<(usize, usize)>,

    /// Side of the adaptive average pool output
    #[config(default = "7")]
    pub pool_size: usize,

    #[config(default = "3")]
    pub in_channels: usize,
}

impl VggConfig {
    /// VGG-13: two convolutions in each of five stages
    pub fn vgg13() -> Self {
        Self::new(vec![(64, 2), (128, 2), (256, 2), (512, 2), (512, 2)])
    }

    /// Length of the flattened feature vector
    pub fn num_features(&self) -> usize {
        let channels = self
            .stages
            .last()
            .map(|(channels, _)| *channels)
            .unwrap_or(self.in_channels);
        channels * self.pool_size * self.pool_size
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Vgg<B> {
        let mut in_channels = self.in_channels;
        let stages = self
            .stages
            .iter()
            .map(|&(out_channels, layers)| {
                let stage = VggStage::new(in_channels, out_channels, layers, device);
                in_channels = out_channels;
                stage
            })
            .collect();

        Vgg {
            stages,
            avgpool: AdaptiveAvgPool2dConfig::new([self.pool_size, self.pool_size]).init(),
        }
    }
}

/// Convolutions of one resolution level, followed by max-pooling
#[derive(Module, Debug)]
pub struct VggStage<B: Backend> {
    convs: Vec<Conv2d<B>>,
    relu: Relu,
    pool: MaxPool2d,
}

impl<B: Backend> VggStage<B> {
    fn new(in_channels: usize, out_channels: usize, layers: usize, device: &B::Device) -> Self {
        let convs = (0..layers)
            .map(|i| {
                let channels_in = if i == 0 { in_channels } else { out_channels };
                Conv2dConfig::new([channels_in, out_channels], [3, 3])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .init(device)
            })
            .collect();

        Self {
            convs,
            relu: Relu::new(),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self
            .convs
            .iter()
            .fold(x, |x, conv| self.relu.forward(conv.forward(x)));
        self.pool.forward(x)
    }
}

/// VGG convolutional backbone
#[derive(Module, Debug)]
pub struct Vgg<B: Backend> {
    stages: Vec<VggStage<B>>,
    avgpool: AdaptiveAvgPool2d,
}

impl<B: Backend> Vgg<B> {
    /// `[batch, 3, H, W]` images to `[batch, features]`
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self
            .stages
            .iter()
            .fold(images, |x, stage| stage.forward(x));
        self.avgpool.forward(x).flatten(1, 3)
    }
}
