//! Model definitions: backbones, classification head and the registry that
//! pairs them.

pub mod classifier;
pub mod densenet;
pub mod head;
pub mod registry;
pub mod vgg;

pub use classifier::{Backbone, BackboneConfig, TransferClassifier, TransferClassifierConfig};
pub use densenet::{DenseNet, DenseNetConfig};
pub use head::{ClassifierHead, HeadConfig};
pub use registry::{lookup, ArchitectureEntry, ARCHITECTURES};
pub use vgg::{Vgg, VggConfig};
