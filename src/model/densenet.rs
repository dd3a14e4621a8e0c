//! DenseNet feature extractor
//!
//! Each dense layer sees the concatenation of every earlier feature map in
//! its block and contributes `growth_rate` new channels. Transitions between
//! blocks halve both the channel count and the resolution.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{
            AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, AvgPool2d, AvgPool2dConfig, MaxPool2d,
            MaxPool2dConfig,
        },
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

/// Configuration for a DenseNet backbone
#[derive(Config, Debug)]
pub struct DenseNetConfig {
    /// Dense layers per block
    pub block_config: Vec<usize>,

    /// Channels added by each dense layer
    #[config(default = "32")]
    pub growth_rate: usize,

    /// Channels produced by the stem convolution
    #[config(default = "64")]
    pub num_init_features: usize,

    /// Bottleneck width as a multiple of the growth rate
    #[config(default = "4")]
    pub bn_size: usize,

    #[config(default = "3")]
    pub in_channels: usize,
}

impl DenseNetConfig {
    /// DenseNet-121
    pub fn densenet121() -> Self {
        Self::new(vec![6, 12, 24, 16])
    }

    /// Channels after the final block, i.e. the feature vector length
    pub fn num_features(&self) -> usize {
        let last = self.block_config.len().saturating_sub(1);
        self.block_config
            .iter()
            .enumerate()
            .fold(self.num_init_features, |features, (i, &layers)| {
                let features = features + layers * self.growth_rate;
                if i == last {
                    features
                } else {
                    features / 2
                }
            })
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> DenseNet<B> {
        let mut features = self.num_init_features;
        let mut blocks = Vec::with_capacity(self.block_config.len());
        let mut transitions = Vec::new();

        for (i, &layers) in self.block_config.iter().enumerate() {
            blocks.push(DenseBlock::new(
                features,
                layers,
                self.growth_rate,
                self.bn_size,
                device,
            ));
            features += layers * self.growth_rate;

            if i + 1 < self.block_config.len() {
                transitions.push(Transition::new(features, features / 2, device));
                features /= 2;
            }
        }

        DenseNet {
            conv0: Conv2dConfig::new([self.in_channels, self.num_init_features], [7, 7])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(3, 3))
                .with_bias(false)
                .init(device),
            norm0: BatchNormConfig::new(self.num_init_features).init(device),
            pool0: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
            blocks,
            transitions,
            norm5: BatchNormConfig::new(features).init(device),
            relu: Relu::new(),
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
        }
    }
}

/// BN-ReLU-Conv1x1-BN-ReLU-Conv3x3 bottleneck
#[derive(Module, Debug)]
pub struct DenseLayer<B: Backend> {
    norm1: BatchNorm<B, 2>,
    conv1: Conv2d<B>,
    norm2: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    relu: Relu,
}

impl<B: Backend> DenseLayer<B> {
    fn new(in_channels: usize, growth_rate: usize, bn_size: usize, device: &B::Device) -> Self {
        let bottleneck = bn_size * growth_rate;
        Self {
            norm1: BatchNormConfig::new(in_channels).init(device),
            conv1: Conv2dConfig::new([in_channels, bottleneck], [1, 1])
                .with_bias(false)
                .init(device),
            norm2: BatchNormConfig::new(bottleneck).init(device),
            conv2: Conv2dConfig::new([bottleneck, growth_rate], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device),
            relu: Relu::new(),
        }
    }

    /// Returns only the new feature maps
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv1.forward(self.relu.forward(self.norm1.forward(x)));
        self.conv2.forward(self.relu.forward(self.norm2.forward(x)))
    }
}

#[derive(Module, Debug)]
pub struct DenseBlock<B: Backend> {
    layers: Vec<DenseLayer<B>>,
}

impl<B: Backend> DenseBlock<B> {
    fn new(
        in_channels: usize,
        layers: usize,
        growth_rate: usize,
        bn_size: usize,
        device: &B::Device,
    ) -> Self {
        let layers = (0..layers)
            .map(|i| DenseLayer::new(in_channels + i * growth_rate, growth_rate, bn_size, device))
            .collect();
        Self { layers }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.layers.iter().fold(x, |x, layer| {
            let new_features = layer.forward(x.clone());
            Tensor::cat(vec![x, new_features], 1)
        })
    }
}

/// BN-ReLU-Conv1x1 followed by 2x2 average pooling
#[derive(Module, Debug)]
pub struct Transition<B: Backend> {
    norm: BatchNorm<B, 2>,
    conv: Conv2d<B>,
    pool: AvgPool2d,
    relu: Relu,
}

impl<B: Backend> Transition<B> {
    fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        Self {
            norm: BatchNormConfig::new(in_channels).init(device),
            conv: Conv2dConfig::new([in_channels, out_channels], [1, 1])
                .with_bias(false)
                .init(device),
            pool: AvgPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(self.relu.forward(self.norm.forward(x)));
        self.pool.forward(x)
    }
}

/// DenseNet convolutional backbone
#[derive(Module, Debug)]
pub struct DenseNet<B: Backend> {
    conv0: Conv2d<B>,
    norm0: BatchNorm<B, 2>,
    pool0: MaxPool2d,
    blocks: Vec<DenseBlock<B>>,
    transitions: Vec<Transition<B>>,
    norm5: BatchNorm<B, 2>,
    relu: Relu,
    avgpool: AdaptiveAvgPool2d,
}

impl<B: Backend> DenseNet<B> {
    /// `[batch, 3, H, W]` images to `[batch, features]`
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.relu.forward(self.norm0.forward(self.conv0.forward(images)));
        let mut x = self.pool0.forward(x);

        for (i, block) in self.blocks.iter().enumerate() {
            x = block.forward(x);
            if let Some(transition) = self.transitions.get(i) {
                x = transition.forward(x);
            }
        }

        let x = self.relu.forward(self.norm5.forward(x));
        self.avgpool.forward(x).flatten(1, 3)
    }
}
