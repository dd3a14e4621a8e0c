//! # Transfer Classifier
//!
//! Fine-tunes a small classification head on top of a frozen convolutional
//! backbone, using the Burn framework.
//!
//! ## Modules
//!
//! - `backend`: device token parsing and backend selection (Wgpu or NdArray)
//! - `config`: run configuration with TOML and command-line layering
//! - `dataset`: class-per-directory image folders, transforms and batching
//! - `model`: VGG-13 and DenseNet-121 backbones, the head and the registry
//! - `training`: loss, step reporting, the training loop and the session
//! - `checkpoint`: checkpoint directory persistence
//! - `inference`: top-k prediction from a checkpoint
//! - `utils`: errors, logging and formatting helpers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use transfer_classifier::backend::host_placement;
//! use transfer_classifier::config::TrainConfig;
//! use transfer_classifier::training::TrainingSession;
//!
//! let config = TrainConfig {
//!     data_dir: "ImageClassifier/flowers".into(),
//!     ..Default::default()
//! };
//! let summary = TrainingSession::new(config, host_placement())?.run()?;
//! println!("{} steps", summary.steps);
//! ```

pub mod backend;
pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use backend::{DeviceChoice, Placement};
pub use checkpoint::{load_checkpoint, save_checkpoint, CheckpointMetadata};
pub use config::{ConfigOverrides, TrainConfig};
pub use dataset::{DataSplits, ImageFolder};
pub use inference::{PredictionResult, Predictor};
pub use model::{TransferClassifier, TransferClassifierConfig};
pub use training::{MetricReport, TrainingLoop, TrainingSession};
pub use utils::error::{ClassifierError, Result};

/// Side of the square crop fed to the backbone
pub const IMAGE_SIZE: usize = 224;

/// Shorter-side resize applied before the evaluation center crop
pub const RESIZE_SIZE: usize = 256;
