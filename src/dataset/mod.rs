//! Dataset loading: folder discovery, transforms and Burn integration

pub mod burn_dataset;
pub mod folder;
pub mod transform;

use std::path::{Path, PathBuf};

pub use burn_dataset::{
    build_loader, ImageBatch, ImageBatcher, ImageFolderDataset, ImageItem, LoaderOptions,
};
pub use folder::{DatasetStats, ImageFolder, ImageSample};
pub use transform::{EvalPreprocess, ImageTransform, TrainAugmentation};

/// The three split directories below a dataset root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSplits {
    pub train: PathBuf,
    pub valid: PathBuf,
    pub test: PathBuf,
}

impl DataSplits {
    pub fn from_root<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self {
            train: root.join("train"),
            valid: root.join("valid"),
            test: root.join("test"),
        }
    }
}
