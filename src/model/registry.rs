//! Architecture registry
//!
//! Maps an architecture tag to its backbone definition and the shape of the
//! head placed on top of it. Supporting a new backbone means adding a row.

use crate::model::classifier::{BackboneConfig, TransferClassifierConfig};
use crate::model::densenet::DenseNetConfig;
use crate::model::head::HeadConfig;
use crate::model::vgg::VggConfig;
use crate::utils::error::{ClassifierError, Result};

/// One supported architecture
#[derive(Debug, Clone, Copy)]
pub struct ArchitectureEntry {
    /// Value accepted by `--arch`
    pub tag: &'static str,
    backbone: fn() -> BackboneConfig,
    /// Default width of the hidden head layer
    pub hidden_units: usize,
    pub dropout: f64,
}

impl ArchitectureEntry {
    pub fn backbone(&self) -> BackboneConfig {
        (self.backbone)()
    }

    /// Full model definition for `num_classes` outputs.
    /// `hidden_units` replaces the default hidden width when given.
    pub fn model_config(
        &self,
        num_classes: usize,
        hidden_units: Option<usize>,
    ) -> TransferClassifierConfig {
        let backbone = self.backbone();
        let head = HeadConfig::new(
            backbone.num_features(),
            hidden_units.unwrap_or(self.hidden_units),
            num_classes,
        )
        .with_dropout(self.dropout);

        TransferClassifierConfig {
            architecture: self.tag.to_string(),
            backbone,
            head,
        }
    }
}

fn vgg13() -> BackboneConfig {
    BackboneConfig::Vgg(VggConfig::vgg13())
}

fn densenet121() -> BackboneConfig {
    BackboneConfig::DenseNet(DenseNetConfig::densenet121())
}

pub static ARCHITECTURES: &[ArchitectureEntry] = &[
    ArchitectureEntry {
        tag: "vgg13",
        backbone: vgg13,
        hidden_units: 1024,
        dropout: 0.5,
    },
    ArchitectureEntry {
        tag: "densenet121",
        backbone: densenet121,
        hidden_units: 500,
        dropout: 0.6,
    },
];

/// Supported tags, comma separated
pub fn available_tags() -> String {
    ARCHITECTURES
        .iter()
        .map(|entry| entry.tag)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn lookup(tag: &str) -> Result<&'static ArchitectureEntry> {
    ARCHITECTURES
        .iter()
        .find(|entry| entry.tag == tag)
        .ok_or_else(|| ClassifierError::UnknownArchitecture(tag.to_string(), available_tags()))
}
