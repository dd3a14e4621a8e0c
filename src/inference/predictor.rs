//! Inference Predictor Module
//!
//! Loads a checkpoint and ranks the classes of single images.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::prelude::*;
use image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};

use crate::checkpoint::{load_checkpoint, CheckpointMetadata};
use crate::dataset::burn_dataset::normalize;
use crate::dataset::transform::{to_chw, EvalPreprocess};
use crate::model::TransferClassifier;
use crate::utils::error::{ClassifierError, Result, ResultExt};

/// One ranked class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassPrediction {
    /// Output index of the model
    pub index: usize,
    /// Class directory name
    pub class: String,
    /// Human-readable name from the category map, when one was loaded
    pub name: Option<String>,
    pub probability: f32,
}

impl ClassPrediction {
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.class)
    }
}

/// Result of a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub image_path: Option<PathBuf>,
    /// Most probable classes first
    pub top_k: Vec<ClassPrediction>,
    pub inference_time_ms: f64,
}

impl PredictionResult {
    pub fn best(&self) -> Option<&ClassPrediction> {
        self.top_k.first()
    }
}

/// Read a JSON object mapping class directory names to display names
pub fn load_category_names(path: &Path) -> Result<BTreeMap<String, String>> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read category names {}", path.display()))?;
    Ok(serde_json::from_str(&json)?)
}

pub struct Predictor<B: Backend> {
    model: TransferClassifier<B>,
    metadata: CheckpointMetadata,
    classes: Vec<String>,
    preprocess: EvalPreprocess,
    category_names: Option<BTreeMap<String, String>>,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    pub fn from_checkpoint(dir: &Path, device: B::Device) -> Result<Self> {
        let loaded = load_checkpoint::<B>(dir, &device)?;
        let hyper = &loaded.metadata.hyperparameters;
        let preprocess = EvalPreprocess::new(hyper.resize as u32, hyper.image_size as u32);

        Ok(Self {
            classes: loaded.metadata.idx_to_class(),
            model: loaded.model,
            metadata: loaded.metadata,
            preprocess,
            category_names: None,
            device,
        })
    }

    pub fn with_category_names(mut self, names: BTreeMap<String, String>) -> Self {
        self.category_names = Some(names);
        self
    }

    pub fn metadata(&self) -> &CheckpointMetadata {
        &self.metadata
    }

    /// Class probabilities for one image, indexed by output
    pub fn probabilities(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        let size = self.preprocess.crop_size as usize;
        let data = to_chw(&self.preprocess.apply(image));

        let input = Tensor::<B, 4>::from_floats(TensorData::new(data, [1, 3, size, size]), &self.device);
        let input = normalize(input, &self.device);

        self.model
            .forward(input)
            .exp()
            .into_data()
            .convert::<f32>()
            .to_vec()
            .map_err(|e| ClassifierError::Inference(format!("{e:?}")))
    }

    pub fn predict_image(&self, image: &DynamicImage, top_k: usize) -> Result<PredictionResult> {
        let start = Instant::now();
        let probabilities = self.probabilities(image)?;

        let mut ranked: Vec<(usize, f32)> = probabilities.into_iter().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let top_k = ranked
            .into_iter()
            .take(top_k.max(1))
            .map(|(index, probability)| {
                let class = self.classes.get(index).cloned().unwrap_or_else(|| index.to_string());
                let name = self
                    .category_names
                    .as_ref()
                    .and_then(|names| names.get(&class).cloned());
                ClassPrediction {
                    index,
                    class,
                    name,
                    probability,
                }
            })
            .collect();

        Ok(PredictionResult {
            image_path: None,
            top_k,
            inference_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        })
    }

    pub fn predict_path(&self, path: &Path, top_k: usize) -> Result<PredictionResult> {
        let image = ImageReader::open(path)
            .map_err(|e| ClassifierError::ImageLoad(path.to_path_buf(), e.to_string()))?
            .decode()
            .map_err(|e| ClassifierError::ImageLoad(path.to_path_buf(), e.to_string()))?;

        let mut result = self.predict_image(&image, top_k)?;
        result.image_path = Some(path.to_path_buf());
        Ok(result)
    }
}
