//! Transfer Classifier CLI
//!
//! Trains a classification head on a frozen pretrained backbone, predicts
//! image classes from a checkpoint and prints dataset statistics.
#![recursion_limit = "256"]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::tensor::backend::{AutodiffBackend, Backend};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use transfer_classifier::backend::{self, host_placement, DeviceChoice, HostBackend, Placement, ResolvedBackend};
use transfer_classifier::config::{
    ConfigOverrides, TrainConfig, DEFAULT_DATA_DIR, DEFAULT_SAVE_DIR,
};
use transfer_classifier::dataset::{DataSplits, ImageFolder};
use transfer_classifier::inference::{load_category_names, Predictor, DEFAULT_TOP_K};
use transfer_classifier::model::registry;
use transfer_classifier::training::TrainingSession;
use transfer_classifier::utils::format_duration;
use transfer_classifier::utils::logging::{init_logging, LogConfig, LogLevel};

/// Transfer-learning image classifier
///
/// Fine-tunes a small head on a frozen VGG-13 or DenseNet-121 backbone with
/// the Burn framework.
#[derive(Parser, Debug)]
#[command(name = "transfer_classifier")]
#[command(version)]
#[command(about = "Transfer-learning image classifier with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long = "log_level", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fine-tune the classifier head and save a checkpoint
    Train {
        /// TOML file with training settings; flags given here take precedence
        #[arg(long)]
        config: Option<PathBuf>,

        /// Dataset root with train/, valid/ and test/ class folders
        #[arg(long = "data_dir")]
        data_dir: Option<PathBuf>,

        /// Backbone architecture (vgg13 or densenet121)
        #[arg(long)]
        arch: Option<String>,

        #[arg(long = "learning_rate")]
        learning_rate: Option<f64>,

        /// Hidden width of the head; the architecture default when omitted
        #[arg(long = "hidden_units")]
        hidden_units: Option<usize>,

        #[arg(long)]
        epochs: Option<usize>,

        /// Device token: "gpu" selects the accelerator, anything else the CPU
        #[arg(long)]
        gpu: Option<String>,

        /// Checkpoint directory
        #[arg(long = "save_dir")]
        save_dir: Option<PathBuf>,

        #[arg(long = "batch_size")]
        batch_size: Option<usize>,

        /// Data loader worker threads
        #[arg(long = "num_workers")]
        num_workers: Option<usize>,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,

        /// Backbone record with pretrained weights
        #[arg(long)]
        pretrained: Option<PathBuf>,

        /// Score the test split after training
        #[arg(long = "evaluate_test", default_value = "false")]
        evaluate_test: bool,
    },

    /// Predict the most likely classes of an image
    Predict {
        /// Checkpoint directory written by `train`
        #[arg(long, default_value = DEFAULT_SAVE_DIR)]
        checkpoint: PathBuf,

        /// Image to classify
        #[arg(short, long)]
        input: PathBuf,

        /// Number of classes to show
        #[arg(long = "top_k", default_value_t = DEFAULT_TOP_K)]
        top_k: usize,

        /// JSON file mapping class folders to display names
        #[arg(long = "category_names")]
        category_names: Option<PathBuf>,

        /// Device token: "gpu" selects the accelerator, anything else the CPU
        #[arg(long, default_value = "gpu")]
        gpu: String,
    },

    /// Show per-split dataset statistics
    Stats {
        #[arg(long = "data_dir", default_value = DEFAULT_DATA_DIR)]
        data_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    if let Some(level) = &cli.log_level {
        log_config.level = LogLevel::parse(level);
    }
    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Train {
            config,
            data_dir,
            arch,
            learning_rate,
            hidden_units,
            epochs,
            gpu,
            save_dir,
            batch_size,
            num_workers,
            seed,
            pretrained,
            evaluate_test,
        } => {
            let overrides = ConfigOverrides {
                data_dir,
                arch,
                learning_rate,
                hidden_units,
                epochs,
                gpu,
                save_dir,
                batch_size,
                num_workers,
                seed,
                pretrained,
                evaluate_test,
            };
            let config = TrainConfig::resolve(config.as_deref(), &overrides)
                .context("Failed to resolve training configuration")?;
            cmd_train(config)?;
        }

        Commands::Predict {
            checkpoint,
            input,
            top_k,
            category_names,
            gpu,
        } => {
            cmd_predict(
                &checkpoint,
                &input,
                top_k,
                category_names.as_deref(),
                DeviceChoice::from_token(&gpu),
            )?;
        }

        Commands::Stats { data_dir } => {
            cmd_stats(&data_dir)?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════╗
 ║   🌸 Transfer Classifier                              ║
 ║   Frozen backbone + trainable head with Burn + Rust   ║
 ╚══════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

fn cmd_train(config: TrainConfig) -> Result<()> {
    let resolved = backend::resolve(config.gpu);
    println!("  🖥️  Backend: {}", resolved.name().cyan());

    match resolved {
        #[cfg(feature = "wgpu")]
        ResolvedBackend::Wgpu => run_session(config, backend::accelerated_placement()),
        ResolvedBackend::NdArray => run_session(config, host_placement()),
    }
}

fn run_session<B: AutodiffBackend>(config: TrainConfig, placement: Placement<B>) -> Result<()> {
    info!(
        "Training {} on {} for {} epochs",
        config.arch,
        config.data_dir.display(),
        config.epochs
    );

    let summary = TrainingSession::new(config, placement)?.run()?;

    println!();
    println!("{}", "Training Complete!".green().bold());
    println!("  🔢 Steps:       {}", summary.steps);
    println!("  📊 Reports:     {}", summary.reports.len());
    if let Some(last) = summary.reports.last() {
        println!("  🎯 Valid Acc:   {:.2}%", last.valid_accuracy * 100.0);
    }
    if let Some(test) = &summary.test_metrics {
        println!("  🧪 Test Acc:    {:.2}%", test.accuracy * 100.0);
    }
    println!("  ⏱️  Time:        {}", format_duration(summary.elapsed_secs));
    println!("  💾 Checkpoint:  {}", summary.checkpoint_dir.display());

    Ok(())
}

fn cmd_predict(
    checkpoint: &Path,
    input: &Path,
    top_k: usize,
    category_names: Option<&Path>,
    choice: DeviceChoice,
) -> Result<()> {
    match backend::resolve(choice) {
        #[cfg(feature = "wgpu")]
        ResolvedBackend::Wgpu => predict_with::<backend::AcceleratedBackend>(
            Default::default(),
            checkpoint,
            input,
            top_k,
            category_names,
        ),
        ResolvedBackend::NdArray => {
            predict_with::<HostBackend>(Default::default(), checkpoint, input, top_k, category_names)
        }
    }
}

fn predict_with<B: Backend>(
    device: B::Device,
    checkpoint: &Path,
    input: &Path,
    top_k: usize,
    category_names: Option<&Path>,
) -> Result<()> {
    info!("Loading checkpoint from: {}", checkpoint.display());

    let mut predictor = Predictor::<B>::from_checkpoint(checkpoint, device)
        .with_context(|| format!("Failed to load checkpoint {}", checkpoint.display()))?;
    if let Some(path) = category_names {
        predictor = predictor.with_category_names(load_category_names(path)?);
    }

    let result = predictor
        .predict_path(input, top_k)
        .with_context(|| format!("Failed to classify {}", input.display()))?;

    println!();
    println!(
        "{} {} ({})",
        "Prediction for".cyan().bold(),
        input.display(),
        predictor.metadata().architecture
    );
    for (rank, prediction) in result.top_k.iter().enumerate() {
        let line = format!(
            "  {}. {:<30} {:>6.2}%",
            rank + 1,
            prediction.label(),
            prediction.probability * 100.0
        );
        if rank == 0 {
            println!("{}", line.green().bold());
        } else {
            println!("{line}");
        }
    }
    println!("  ⏱️  {:.1} ms", result.inference_time_ms);

    Ok(())
}

fn cmd_stats(data_dir: &Path) -> Result<()> {
    info!("Computing dataset statistics for: {}", data_dir.display());

    if !data_dir.exists() {
        println!(
            "{} Dataset directory not found: {}",
            "Error:".red(),
            data_dir.display()
        );
        println!();
        println!("{}", "Expected structure:".yellow());
        println!("  {}/", data_dir.display());
        println!("  ├── train/<class>/*.jpg");
        println!("  ├── valid/<class>/*.jpg");
        println!("  └── test/<class>/*.jpg");
        return Ok(());
    }

    let splits = DataSplits::from_root(data_dir);
    let train = ImageFolder::new(&splits.train)
        .with_context(|| format!("Failed to scan {}", splits.train.display()))?;
    train.stats().print("Train");

    for (name, dir) in [("Valid", &splits.valid), ("Test", &splits.test)] {
        if !dir.is_dir() {
            println!("{} {} split not found at {}", "Note:".yellow(), name, dir.display());
            continue;
        }
        let folder = ImageFolder::with_class_index(dir, &train.class_to_idx)
            .with_context(|| format!("Failed to scan {}", dir.display()))?;
        folder.stats().print(name);
    }

    println!();
    println!("Known architectures: {}", registry::available_tags());

    Ok(())
}
