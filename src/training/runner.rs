//! End-to-end training session
//!
//! Loads the dataset splits, builds the model from the registry, runs the
//! training loop, optionally scores the test split and writes the
//! checkpoint.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use burn::module::AutodiffModule;
use burn::optim::AdamConfig;
use burn::tensor::backend::AutodiffBackend;
use colored::Colorize;
use tracing::{info, warn};

use crate::backend::Placement;
use crate::checkpoint::{save_checkpoint, CheckpointMetadata};
use crate::config::TrainConfig;
use crate::dataset::{
    build_loader, DataSplits, EvalPreprocess, ImageFolder, ImageFolderDataset, ImageTransform,
    LoaderOptions, TrainAugmentation,
};
use crate::model::{registry, TransferClassifier, TransferClassifierConfig};
use crate::training::driver::{evaluate, TrainingLoop};
use crate::training::loss::NllLoss;
use crate::training::metrics::{MetricReport, ValidationMetrics};
use crate::utils::format_duration;

/// Scanned dataset splits
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub train: ImageFolder,
    pub valid: ImageFolder,
    /// Present when the test directory exists
    pub test: Option<ImageFolder>,
}

/// Result of a finished session
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub steps: usize,
    pub reports: Vec<MetricReport>,
    pub test_metrics: Option<ValidationMetrics>,
    pub checkpoint_dir: PathBuf,
    pub elapsed_secs: f64,
}

pub struct TrainingSession<B: AutodiffBackend> {
    config: TrainConfig,
    placement: Placement<B>,
}

impl<B: AutodiffBackend> TrainingSession<B> {
    pub fn new(config: TrainConfig, placement: Placement<B>) -> Result<Self> {
        config.validate().context("Invalid training configuration")?;
        Ok(Self { config, placement })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Scan and header-check the dataset splits below `data_dir`
    pub fn load_data(&self) -> Result<PreparedData> {
        let splits = DataSplits::from_root(&self.config.data_dir);

        let train = ImageFolder::new(&splits.train)
            .with_context(|| format!("Failed to scan training split {}", splits.train.display()))?;
        train.require_samples("train")?;

        let valid = ImageFolder::with_class_index(&splits.valid, &train.class_to_idx)
            .with_context(|| format!("Failed to scan validation split {}", splits.valid.display()))?;
        valid.require_samples("valid")?;

        let test = if splits.test.is_dir() {
            Some(ImageFolder::with_class_index(&splits.test, &train.class_to_idx)?)
        } else {
            None
        };

        println!("{}", "Verifying images...".cyan());
        train.verify_images()?;
        valid.verify_images()?;
        if self.config.evaluate_test {
            if let Some(test) = &test {
                test.verify_images()?;
            }
        }

        Ok(PreparedData { train, valid, test })
    }

    /// Full run with the model chosen by `config.arch`
    pub fn run(&self) -> Result<TrainingSummary> {
        let data = self.load_data()?;
        let entry = registry::lookup(&self.config.arch)?;
        let model_config = entry.model_config(data.train.num_classes(), self.config.hidden_units);
        self.run_with(data, model_config)
    }

    /// Run with an explicit model definition
    pub fn run_with(
        &self,
        data: PreparedData,
        model_config: TransferClassifierConfig,
    ) -> Result<TrainingSummary> {
        let start = Instant::now();
        let config = &self.config;
        let device = &self.placement.device;

        B::seed(config.seed);

        println!("{}", "Creating Model...".cyan());
        let mut model: TransferClassifier<B> = model_config.init(device);
        match &config.pretrained {
            Some(path) => {
                model = model.load_backbone_weights(path, device)?;
            }
            None => warn!(
                "No pretrained weights given for {}; the frozen backbone keeps its random initialization",
                model_config.architecture
            ),
        }

        let mut optimizer = AdamConfig::new()
            .with_epsilon(1e-8)
            .init::<B, TransferClassifier<B>>();

        let size = config.image_size as u32;
        let train_loader = build_loader::<B, _>(
            ImageFolderDataset::new(&data.train),
            ImageTransform::Train(TrainAugmentation::new(size, config.rotation_degrees)),
            LoaderOptions {
                batch_size: config.batch_size,
                num_workers: config.num_workers,
                shuffle_seed: Some(config.seed),
            },
            device.clone(),
        );
        let eval_transform = ImageTransform::Eval(EvalPreprocess::new(config.resize as u32, size));
        let eval_options = LoaderOptions {
            batch_size: config.batch_size,
            num_workers: config.num_workers,
            shuffle_seed: None,
        };
        let valid_loader = build_loader::<B::InnerBackend, _>(
            ImageFolderDataset::new(&data.valid),
            eval_transform.clone(),
            eval_options,
            self.placement.eval_device.clone(),
        );

        print_configuration(config, &model_config, &data);

        println!("{}", "Starting Training...".green().bold());
        let outcome = TrainingLoop::new(config.epochs, config.learning_rate).run(
            model,
            &NllLoss,
            &mut optimizer,
            train_loader.as_ref(),
            valid_loader.as_ref(),
            &self.placement,
            |report| println!("{report}"),
        )?;

        let test_metrics = match (&data.test, config.evaluate_test) {
            (Some(test), true) if !test.is_empty() => {
                let test_loader = build_loader::<B::InnerBackend, _>(
                    ImageFolderDataset::new(test),
                    eval_transform,
                    eval_options,
                    self.placement.eval_device.clone(),
                );
                let metrics = evaluate(
                    &outcome.model.valid(),
                    &NllLoss,
                    test_loader.as_ref(),
                    &self.placement.eval_device,
                )?;
                println!(
                    "Test Loss: {:.3} Test Accuracy: {:.3}",
                    metrics.loss, metrics.accuracy
                );
                Some(metrics)
            }
            (None, true) => {
                warn!("Test evaluation requested but no test split was found");
                None
            }
            _ => None,
        };

        println!("{}", "Saving Checkpoint...".cyan());
        let metadata = CheckpointMetadata::new(
            model_config,
            data.train.class_to_idx.clone(),
            config.clone(),
            outcome.steps,
            outcome.reports.last().copied(),
        );
        save_checkpoint(&config.save_dir, &outcome.model, &optimizer, &metadata)
            .with_context(|| format!("Failed to write checkpoint {}", config.save_dir.display()))?;

        let elapsed_secs = start.elapsed().as_secs_f64();
        info!("Session finished in {}", format_duration(elapsed_secs));
        println!("  💾 Saved to: {}", config.save_dir.display());

        Ok(TrainingSummary {
            steps: outcome.steps,
            reports: outcome.reports,
            test_metrics,
            checkpoint_dir: config.save_dir.clone(),
            elapsed_secs,
        })
    }
}

fn print_configuration(
    config: &TrainConfig,
    model_config: &TransferClassifierConfig,
    data: &PreparedData,
) {
    println!();
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  🧠 Architecture:       {}", model_config.architecture);
    println!(
        "  🔗 Head:               {} -> {} -> {} (dropout {})",
        model_config.head.in_features,
        model_config.head.hidden_units,
        model_config.head.num_classes,
        model_config.head.dropout
    );
    println!("  🏷️  Training samples:   {}", data.train.len());
    println!("  ✅ Validation samples: {}", data.valid.len());
    if let Some(test) = &data.test {
        println!("  🧪 Test samples:       {}", test.len());
    }
    println!("  🔄 Epochs:             {}", config.epochs);
    println!("  📦 Batch size:         {}", config.batch_size);
    println!("  📈 Learning rate:      {}", config.learning_rate);
    println!("  🖥️  Device:             {}", config.gpu);
    println!();
}
