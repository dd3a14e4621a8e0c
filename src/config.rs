//! Run configuration
//!
//! Every hyperparameter of a training run lives in [`TrainConfig`]. Values
//! come from the built-in defaults, optionally replaced by a TOML file, and
//! finally by command-line overrides. The resolved config is stored in the
//! checkpoint metadata.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backend::DeviceChoice;
use crate::model::registry;
use crate::utils::error::{ClassifierError, Result};

pub const DEFAULT_DATA_DIR: &str = "ImageClassifier/flowers";
pub const DEFAULT_ARCH: &str = "densenet121";
pub const DEFAULT_LEARNING_RATE: f64 = 0.0005;
pub const DEFAULT_EPOCHS: usize = 3;
pub const DEFAULT_SAVE_DIR: &str = "checkpoint.pth";
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Resolved configuration of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Dataset root containing `train/`, `valid/` and `test/`
    pub data_dir: PathBuf,
    /// Backbone architecture tag (see [`registry::ARCHITECTURES`])
    pub arch: String,
    pub learning_rate: f64,
    /// Replaces the architecture's default hidden width when set
    pub hidden_units: Option<usize>,
    pub epochs: usize,
    /// Device token; serialized as `"gpu"` or `"cpu"`
    pub gpu: DeviceChoice,
    /// Checkpoint directory
    pub save_dir: PathBuf,
    pub batch_size: usize,
    /// Data loader worker threads
    pub num_workers: usize,
    /// Seeds the backend and the training shuffle
    pub seed: u64,
    /// Side of the square crop fed to the network
    pub image_size: usize,
    /// Shorter-side resize before the evaluation center crop
    pub resize: usize,
    /// Maximum absolute rotation of the training augmentation, in degrees
    pub rotation_degrees: f32,
    /// Backbone record file with pretrained weights
    pub pretrained: Option<PathBuf>,
    /// Evaluate on the test split after training
    pub evaluate_test: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            arch: DEFAULT_ARCH.to_string(),
            learning_rate: DEFAULT_LEARNING_RATE,
            hidden_units: None,
            epochs: DEFAULT_EPOCHS,
            gpu: DeviceChoice::Accelerated,
            save_dir: PathBuf::from(DEFAULT_SAVE_DIR),
            batch_size: DEFAULT_BATCH_SIZE,
            num_workers: 2,
            seed: 42,
            image_size: crate::IMAGE_SIZE,
            resize: crate::RESIZE_SIZE,
            rotation_degrees: 30.0,
            pretrained: None,
            evaluate_test: false,
        }
    }
}

/// Command-line values that replace config entries when present
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub data_dir: Option<PathBuf>,
    pub arch: Option<String>,
    pub learning_rate: Option<f64>,
    pub hidden_units: Option<usize>,
    pub epochs: Option<usize>,
    pub gpu: Option<String>,
    pub save_dir: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub num_workers: Option<usize>,
    pub seed: Option<u64>,
    pub pretrained: Option<PathBuf>,
    pub evaluate_test: bool,
}

impl TrainConfig {
    /// Load a config from a TOML file; missing keys keep their defaults
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ClassifierError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;

        toml::from_str(&content).map_err(|e| {
            ClassifierError::Config(format!("Failed to parse config {}: {e}", path.display()))
        })
    }

    /// Defaults, or the given TOML file, with CLI overrides applied on top
    pub fn resolve(file: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(data_dir) = &overrides.data_dir {
            self.data_dir = data_dir.clone();
        }
        if let Some(arch) = &overrides.arch {
            self.arch = arch.clone();
        }
        if let Some(lr) = overrides.learning_rate {
            self.learning_rate = lr;
        }
        if let Some(hidden) = overrides.hidden_units {
            self.hidden_units = Some(hidden);
        }
        if let Some(epochs) = overrides.epochs {
            self.epochs = epochs;
        }
        if let Some(token) = &overrides.gpu {
            self.gpu = DeviceChoice::from_token(token);
        }
        if let Some(save_dir) = &overrides.save_dir {
            self.save_dir = save_dir.clone();
        }
        if let Some(batch_size) = overrides.batch_size {
            self.batch_size = batch_size;
        }
        if let Some(workers) = overrides.num_workers {
            self.num_workers = workers;
        }
        if let Some(seed) = overrides.seed {
            self.seed = seed;
        }
        if let Some(pretrained) = &overrides.pretrained {
            self.pretrained = Some(pretrained.clone());
        }
        if overrides.evaluate_test {
            self.evaluate_test = true;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(ClassifierError::Config("epochs must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(ClassifierError::Config("batch_size must be at least 1".into()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ClassifierError::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.hidden_units == Some(0) {
            return Err(ClassifierError::Config("hidden_units must be at least 1".into()));
        }
        if self.image_size == 0 {
            return Err(ClassifierError::Config("image_size must be at least 1".into()));
        }
        if self.resize < self.image_size {
            return Err(ClassifierError::Config(format!(
                "resize ({}) must not be smaller than image_size ({})",
                self.resize, self.image_size
            )));
        }
        registry::lookup(&self.arch)?;
        Ok(())
    }
}
