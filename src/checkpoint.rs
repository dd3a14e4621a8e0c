//! Checkpoint persistence
//!
//! A checkpoint is a directory:
//!
//! ```text
//! checkpoint.pth/
//! ├── metadata.json      architecture, model definition, class index, hyperparameters
//! ├── model.mpk.gz       model weights
//! └── optimizer.mpk.gz   Adam state
//! ```
//!
//! Weights are stored at full precision so a reloaded model reproduces the
//! predictions of the model that was saved.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::optim::Optimizer;
use burn::record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder};
use burn::tensor::backend::{AutodiffBackend, Backend};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::TrainConfig;
use crate::model::{TransferClassifier, TransferClassifierConfig};
use crate::training::MetricReport;
use crate::utils::error::{ClassifierError, Result};

pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;
pub const METADATA_FILE: &str = "metadata.json";
/// Record file stems; the recorder appends `.mpk.gz`
pub const MODEL_FILE: &str = "model";
pub const OPTIMIZER_FILE: &str = "optimizer";

pub type CheckpointRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

/// Everything needed to rebuild the model besides its weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub format_version: u32,
    pub architecture: String,
    pub model: TransferClassifierConfig,
    /// Class directory name to output index
    pub class_to_idx: BTreeMap<String, usize>,
    pub hyperparameters: TrainConfig,
    pub epochs: usize,
    pub steps: usize,
    pub last_report: Option<MetricReport>,
    /// RFC 3339 timestamp
    pub created_at: String,
}

impl CheckpointMetadata {
    pub fn new(
        model: TransferClassifierConfig,
        class_to_idx: BTreeMap<String, usize>,
        hyperparameters: TrainConfig,
        steps: usize,
        last_report: Option<MetricReport>,
    ) -> Self {
        Self {
            format_version: CHECKPOINT_FORMAT_VERSION,
            architecture: model.architecture.clone(),
            epochs: hyperparameters.epochs,
            model,
            class_to_idx,
            hyperparameters,
            steps,
            last_report,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Class names ordered by output index
    pub fn idx_to_class(&self) -> Vec<String> {
        let mut classes = vec![String::new(); self.class_to_idx.len()];
        for (name, &idx) in &self.class_to_idx {
            if let Some(slot) = classes.get_mut(idx) {
                *slot = name.clone();
            }
        }
        classes
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| {
            ClassifierError::Checkpoint(format!("cannot read {}: {e}", path.display()))
        })?;
        let metadata: Self = serde_json::from_str(&json)?;

        if metadata.format_version != CHECKPOINT_FORMAT_VERSION {
            return Err(ClassifierError::Checkpoint(format!(
                "unsupported checkpoint format {} (expected {})",
                metadata.format_version, CHECKPOINT_FORMAT_VERSION
            )));
        }
        if metadata.class_to_idx.len() != metadata.model.num_classes() {
            return Err(ClassifierError::Checkpoint(format!(
                "class index has {} entries but the model has {} outputs",
                metadata.class_to_idx.len(),
                metadata.model.num_classes()
            )));
        }

        Ok(metadata)
    }
}

/// Write metadata, model weights and optimizer state into `dir`
pub fn save_checkpoint<B, O>(
    dir: &Path,
    model: &TransferClassifier<B>,
    optimizer: &O,
    metadata: &CheckpointMetadata,
) -> Result<()>
where
    B: AutodiffBackend,
    O: Optimizer<TransferClassifier<B>, B>,
{
    fs::create_dir_all(dir)?;
    let recorder = CheckpointRecorder::new();

    metadata.save(&dir.join(METADATA_FILE))?;
    model.clone().save_file(dir.join(MODEL_FILE), &recorder)?;
    Recorder::<B>::record(&recorder, optimizer.to_record(), dir.join(OPTIMIZER_FILE))?;

    info!("Checkpoint saved to {}", dir.display());
    Ok(())
}

/// A model rebuilt from a checkpoint directory
#[derive(Debug)]
pub struct LoadedCheckpoint<B: Backend> {
    pub metadata: CheckpointMetadata,
    pub model: TransferClassifier<B>,
}

/// Rebuild the model described by `dir/metadata.json` and load its weights
pub fn load_checkpoint<B: Backend>(dir: &Path, device: &B::Device) -> Result<LoadedCheckpoint<B>> {
    if !dir.is_dir() {
        return Err(ClassifierError::PathNotFound(dir.to_path_buf()));
    }

    let metadata = CheckpointMetadata::load(&dir.join(METADATA_FILE))?;
    let model = metadata
        .model
        .init::<B>(device)
        .load_file(dir.join(MODEL_FILE), &CheckpointRecorder::new(), device)?
        .freeze_backbone();

    info!(
        "Loaded {} checkpoint ({} classes, {} steps) from {}",
        metadata.architecture,
        metadata.class_to_idx.len(),
        metadata.steps,
        dir.display()
    );

    Ok(LoadedCheckpoint { metadata, model })
}

/// Restore the optimizer state saved next to the model
pub fn load_optimizer<B, O>(dir: &Path, optimizer: O, device: &B::Device) -> Result<O>
where
    B: AutodiffBackend,
    O: Optimizer<TransferClassifier<B>, B>,
{
    let record = Recorder::<B>::load::<O::Record>(
        &CheckpointRecorder::new(),
        dir.join(OPTIMIZER_FILE),
        device,
    )?;
    Ok(optimizer.load_record(record))
}

/// Paths of the files inside a checkpoint directory
pub fn checkpoint_files(dir: &Path) -> [PathBuf; 3] {
    [
        dir.join(METADATA_FILE),
        dir.join(format!("{MODEL_FILE}.mpk.gz")),
        dir.join(format!("{OPTIMIZER_FILE}.mpk.gz")),
    ]
}
