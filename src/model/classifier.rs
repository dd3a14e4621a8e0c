//! Frozen backbone plus trainable head
//!
//! The backbone is excluded from gradient tracking and always runs in
//! inference mode, so its batch-norm statistics and weights stay exactly as
//! they were loaded. Only the head learns.

use std::path::Path;

use burn::{
    module::{AutodiffModule, Module},
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder},
    tensor::{
        backend::{AutodiffBackend, Backend},
        Tensor,
    },
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::densenet::{DenseNet, DenseNetConfig};
use crate::model::head::{ClassifierHead, HeadConfig};
use crate::model::vgg::{Vgg, VggConfig};
use crate::utils::error::{ClassifierError, Result};

/// Backbone definition, one variant per supported family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BackboneConfig {
    Vgg(VggConfig),
    DenseNet(DenseNetConfig),
}

impl BackboneConfig {
    pub fn num_features(&self) -> usize {
        match self {
            BackboneConfig::Vgg(config) => config.num_features(),
            BackboneConfig::DenseNet(config) => config.num_features(),
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Backbone<B> {
        match self {
            BackboneConfig::Vgg(config) => Backbone::Vgg(config.init(device)),
            BackboneConfig::DenseNet(config) => Backbone::DenseNet(config.init(device)),
        }
    }
}

/// Convolutional feature extractor
#[derive(Module, Debug)]
pub enum Backbone<B: Backend> {
    Vgg(Vgg<B>),
    DenseNet(DenseNet<B>),
}

impl<B: Backend> Backbone<B> {
    /// Images `[batch, 3, H, W]` to features `[batch, num_features]`
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        match self {
            Backbone::Vgg(vgg) => vgg.forward(images),
            Backbone::DenseNet(densenet) => densenet.forward(images),
        }
    }
}

/// Full model definition, stored in checkpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferClassifierConfig {
    /// Registry tag the definition was built from
    pub architecture: String,
    pub backbone: BackboneConfig,
    pub head: HeadConfig,
}

impl TransferClassifierConfig {
    /// Build the model with a frozen backbone
    pub fn init<B: Backend>(&self, device: &B::Device) -> TransferClassifier<B> {
        TransferClassifier {
            backbone: self.backbone.init(device),
            head: self.head.init(device),
        }
        .freeze_backbone()
    }

    pub fn num_classes(&self) -> usize {
        self.head.num_classes
    }
}

#[derive(Module, Debug)]
pub struct TransferClassifier<B: Backend> {
    pub backbone: Backbone<B>,
    pub head: ClassifierHead<B>,
}

impl<B: Backend> TransferClassifier<B> {
    /// Log-probabilities `[batch, classes]` for normalized images
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.head.forward(self.backbone.forward(images))
    }

    /// Exclude every backbone parameter from gradient tracking
    pub fn freeze_backbone(mut self) -> Self {
        self.backbone = self.backbone.no_grad();
        self
    }

    pub fn num_classes(&self) -> usize {
        self.head.num_classes()
    }

    /// Load backbone weights from a Burn record file (`.mpk.gz`)
    pub fn load_backbone_weights(mut self, path: &Path, device: &B::Device) -> Result<Self> {
        let recorder = NamedMpkGzFileRecorder::<FullPrecisionSettings>::new();
        self.backbone = self
            .backbone
            .load_file(path.to_path_buf(), &recorder, device)
            .map_err(|e| {
                ClassifierError::Model(format!(
                    "failed to load backbone weights from {}: {e}",
                    path.display()
                ))
            })?
            .no_grad();

        info!("Loaded pretrained backbone weights from {}", path.display());
        Ok(self)
    }
}

impl<B: AutodiffBackend> TransferClassifier<B> {
    /// Training forward pass: the backbone runs on the inner backend in
    /// inference mode, the head on the autodiff backend.
    pub fn forward_train(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.valid().forward(images.inner());
        self.head.forward(Tensor::from_inner(features))
    }
}
