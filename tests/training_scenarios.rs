//! End-to-end training scenarios on small on-disk image folders.

use std::fs;
use std::path::Path;

use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::{Distribution, Tensor};
use image::{Rgb, RgbImage};

use transfer_classifier::backend::{self, host_placement, DeviceChoice, HostBackend, HostTraining, ResolvedBackend};
use transfer_classifier::checkpoint::{
    checkpoint_files, load_checkpoint, load_optimizer, save_checkpoint, CheckpointMetadata,
};
use transfer_classifier::config::{ConfigOverrides, TrainConfig};
use transfer_classifier::dataset::{
    build_loader, EvalPreprocess, ImageBatch, ImageFolder, ImageFolderDataset, ImageTransform,
    LoaderOptions, TrainAugmentation,
};
use transfer_classifier::inference::Predictor;
use transfer_classifier::model::{
    BackboneConfig, HeadConfig, TransferClassifier, TransferClassifierConfig, VggConfig,
};
use transfer_classifier::training::{
    ClassificationLoss, NllLoss, TrainOutcome, TrainingLoop, TrainingSession,
};

const CLASSES: [(&str, [u8; 3]); 2] = [("daisy", [240, 230, 40]), ("rose", [200, 20, 40])];

fn write_split(root: &Path, split: &str, per_class: usize) {
    for (class, color) in CLASSES {
        let dir = root.join(split).join(class);
        fs::create_dir_all(&dir).unwrap();
        for i in 0..per_class {
            let shade = (i * 9) as u8;
            let pixel = Rgb([color[0].saturating_sub(shade), color[1], color[2].saturating_add(shade)]);
            RgbImage::from_pixel(12, 12, pixel)
                .save(dir.join(format!("image_{i:04}.png")))
                .unwrap();
        }
    }
}

/// train/ with 10 images per class, valid/ and test/ with 2 per class
fn write_dataset(root: &Path) {
    write_split(root, "train", 10);
    write_split(root, "valid", 2);
    write_split(root, "test", 2);
}

fn tiny_model_config() -> TransferClassifierConfig {
    let backbone = BackboneConfig::Vgg(VggConfig::new(vec![(4, 1)]).with_pool_size(2));
    TransferClassifierConfig {
        architecture: "vgg-tiny".into(),
        head: HeadConfig::new(backbone.num_features(), 8, CLASSES.len()),
        backbone,
    }
}

fn train_folder(
    root: &Path,
    epochs: usize,
    batch_size: usize,
    model: TransferClassifier<HostTraining>,
) -> TrainOutcome<HostTraining> {
    train_folder_with_optimizer(root, epochs, batch_size, model).0
}

/// Train and hand back the optimizer that did the updates
fn train_folder_with_optimizer(
    root: &Path,
    epochs: usize,
    batch_size: usize,
    model: TransferClassifier<HostTraining>,
) -> (
    TrainOutcome<HostTraining>,
    impl Optimizer<TransferClassifier<HostTraining>, HostTraining>,
) {
    let placement = host_placement();
    let train = ImageFolder::new(root.join("train")).unwrap();
    let valid = ImageFolder::with_class_index(root.join("valid"), &train.class_to_idx).unwrap();

    let train_loader = build_loader::<HostTraining, _>(
        ImageFolderDataset::new(&train),
        ImageTransform::Train(TrainAugmentation::new(8, 30.0)),
        LoaderOptions {
            batch_size,
            num_workers: 0,
            shuffle_seed: Some(7),
        },
        placement.device.clone(),
    );
    let valid_loader = build_loader::<HostBackend, _>(
        ImageFolderDataset::new(&valid),
        ImageTransform::Eval(EvalPreprocess::new(10, 8)),
        LoaderOptions {
            batch_size: 4,
            num_workers: 0,
            shuffle_seed: None,
        },
        placement.eval_device.clone(),
    );

    let mut optimizer = AdamConfig::new()
        .with_epsilon(1e-8)
        .init::<HostTraining, TransferClassifier<HostTraining>>();

    let outcome = TrainingLoop::new(epochs, 1e-2)
        .run(
            model,
            &NllLoss,
            &mut optimizer,
            train_loader.as_ref(),
            valid_loader.as_ref(),
            &placement,
            |_| {},
        )
        .unwrap();
    (outcome, optimizer)
}

/// One Adam step on the head using a fixed batch
fn next_step<O>(
    model: TransferClassifier<HostTraining>,
    optimizer: &mut O,
    batch: &ImageBatch<HostTraining>,
) -> TransferClassifier<HostTraining>
where
    O: Optimizer<TransferClassifier<HostTraining>, HostTraining>,
{
    let log_probs = model.forward_train(batch.images.clone());
    let mut grads = NllLoss.forward(log_probs, batch.targets.clone()).backward();
    let head_grads = GradientsParams::from_module(&mut grads, &model.head);
    optimizer.step(1e-2, model, head_grads)
}

fn to_vec<const D: usize>(tensor: Tensor<HostBackend, D>) -> Vec<f32> {
    tensor.into_data().to_vec().unwrap()
}

#[test]
fn twenty_images_batch_four_gives_five_steps_and_no_report() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());

    let model = tiny_model_config().init::<HostTraining>(&Default::default());
    let outcome = train_folder(dir.path(), 1, 4, model);

    assert_eq!(outcome.steps, 5);
    assert!(outcome.reports.is_empty());
}

#[test]
fn twenty_images_batch_two_reports_once_at_step_ten() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());

    let model = tiny_model_config().init::<HostTraining>(&Default::default());
    let outcome = train_folder(dir.path(), 1, 2, model);

    assert_eq!(outcome.steps, 10);
    assert_eq!(outcome.reports.len(), 1);
    let report = outcome.reports[0];
    assert_eq!(report.step, 10);
    assert_eq!(report.epoch, 1);
    assert!(report.train_loss.is_finite() && report.train_loss > 0.0);
    assert!((0.0..=1.0).contains(&report.valid_accuracy));

    let line = report.to_string();
    assert!(line.starts_with("epochs: 1, Training Loss: "), "{line}");
    assert!(line.contains(" Valid Loss: ") && line.contains(" Valid Accuracy: "));
}

#[test]
fn backbone_stays_frozen_while_head_learns() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());

    let device = Default::default();
    let model = tiny_model_config().init::<HostTraining>(&device);
    let before = model.valid();

    let outcome = train_folder(dir.path(), 2, 2, model);
    let after = outcome.model.valid();

    let images = Tensor::<HostBackend, 4>::random([3, 3, 8, 8], Distribution::Default, &device);
    let features_before = before.backbone.forward(images.clone());
    let features_after = after.backbone.forward(images.clone());
    assert_eq!(to_vec(features_before.clone()), to_vec(features_after));

    let head_before = to_vec(before.head.forward(features_before.clone()));
    let head_after = to_vec(after.head.forward(features_before));
    assert!(head_before
        .iter()
        .zip(&head_after)
        .any(|(a, b)| (a - b).abs() > 1e-7));
}

#[test]
fn trained_checkpoint_reproduces_predictions() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    let ckpt_dir = dir.path().join("checkpoint.pth");

    let device = Default::default();
    let model = tiny_model_config().init::<HostTraining>(&device);
    let (outcome, optimizer) = train_folder_with_optimizer(dir.path(), 1, 4, model);

    let train = ImageFolder::new(dir.path().join("train")).unwrap();
    let metadata = CheckpointMetadata::new(
        tiny_model_config(),
        train.class_to_idx.clone(),
        TrainConfig {
            image_size: 8,
            resize: 10,
            ..Default::default()
        },
        outcome.steps,
        outcome.reports.last().copied(),
    );
    save_checkpoint(&ckpt_dir, &outcome.model, &optimizer, &metadata).unwrap();

    let loaded = load_checkpoint::<HostBackend>(&ckpt_dir, &device).unwrap();
    assert_eq!(loaded.metadata.idx_to_class(), vec!["daisy", "rose"]);
    assert_eq!(loaded.metadata.steps, 5);

    let images = Tensor::<HostBackend, 4>::random([4, 3, 8, 8], Distribution::Default, &device);
    let expected = to_vec(outcome.model.valid().forward(images.clone()));
    let actual = to_vec(loaded.model.forward(images));
    for (a, b) in expected.iter().zip(&actual) {
        assert!((a - b).abs() < 1e-5, "{a} vs {b}");
    }

    let predictor = Predictor::<HostBackend>::from_checkpoint(&ckpt_dir, device).unwrap();
    let image = dir.path().join("valid/rose/image_0000.png");
    let result = predictor.predict_path(&image, 5).unwrap();
    assert_eq!(result.top_k.len(), 2);
    assert!(["daisy", "rose"].contains(&result.top_k[0].class.as_str()));
}

#[test]
fn restored_optimizer_state_reproduces_the_next_update() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    let ckpt_dir = dir.path().join("checkpoint.pth");

    let device = Default::default();
    let mut config = tiny_model_config();
    config.head = config.head.with_dropout(0.0);
    let (outcome, mut trained) =
        train_folder_with_optimizer(dir.path(), 1, 2, config.init::<HostTraining>(&device));

    let train = ImageFolder::new(dir.path().join("train")).unwrap();
    let metadata = CheckpointMetadata::new(
        config.clone(),
        train.class_to_idx.clone(),
        TrainConfig::default(),
        outcome.steps,
        None,
    );
    save_checkpoint(&ckpt_dir, &outcome.model, &trained, &metadata).unwrap();

    let fresh = || {
        AdamConfig::new()
            .with_epsilon(1e-8)
            .init::<HostTraining, TransferClassifier<HostTraining>>()
    };
    let mut restored = load_optimizer(&ckpt_dir, fresh(), &device).unwrap();
    let mut untrained = fresh();

    let valid = ImageFolder::with_class_index(dir.path().join("valid"), &train.class_to_idx).unwrap();
    let batch = build_loader::<HostTraining, _>(
        ImageFolderDataset::new(&valid),
        ImageTransform::Eval(EvalPreprocess::new(10, 8)),
        LoaderOptions {
            batch_size: 4,
            num_workers: 0,
            shuffle_seed: None,
        },
        device.clone(),
    )
    .iter()
    .next()
    .unwrap();

    let images = Tensor::<HostBackend, 4>::random([2, 3, 8, 8], Distribution::Default, &device);
    let output = |model: TransferClassifier<HostTraining>| to_vec(model.valid().forward(images.clone()));

    let in_memory = output(next_step(outcome.model.clone(), &mut trained, &batch));
    let from_disk = output(next_step(outcome.model.clone(), &mut restored, &batch));
    let from_scratch = output(next_step(outcome.model.clone(), &mut untrained, &batch));

    for (a, b) in in_memory.iter().zip(&from_disk) {
        assert!((a - b).abs() < 1e-6, "{a} vs {b}");
    }
    assert!(in_memory
        .iter()
        .zip(&from_scratch)
        .any(|(a, b)| (a - b).abs() > 1e-6));
}

#[test]
fn body_corrupted_image_aborts_before_training() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());

    let path = dir.path().join("train/rose/image_0003.png");
    RgbImage::from_fn(32, 32, |x, y| Rgb([(x * 8) as u8, (y * 8) as u8, 90]))
        .save(&path)
        .unwrap();
    let mut bytes = fs::read(&path).unwrap();
    let end = bytes.len() - 12;
    for byte in &mut bytes[45..end] {
        *byte ^= 0xAA;
    }
    fs::write(&path, &bytes).unwrap();

    let config = TrainConfig {
        data_dir: dir.path().to_path_buf(),
        save_dir: dir.path().join("checkpoint.pth"),
        gpu: DeviceChoice::HostOnly,
        ..Default::default()
    };
    let session = TrainingSession::new(config, host_placement()).unwrap();
    let err = session.load_data().unwrap_err();
    assert!(format!("{err:#}").contains("image_0003.png"), "{err:#}");
    assert!(!dir.path().join("checkpoint.pth").exists());
}

#[test]
fn non_gpu_tokens_select_host_compute() {
    for token in ["cpu", "cuda", "GPU", ""] {
        let overrides = ConfigOverrides {
            gpu: Some(token.to_string()),
            ..Default::default()
        };
        let config = TrainConfig::resolve(None, &overrides).unwrap();
        assert_eq!(config.gpu, DeviceChoice::HostOnly, "{token:?}");
        assert_eq!(backend::resolve(config.gpu), ResolvedBackend::NdArray);
    }
}

#[test]
fn session_trains_scores_test_split_and_writes_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    let ckpt_dir = dir.path().join("out/checkpoint.pth");

    let config = TrainConfig {
        data_dir: dir.path().to_path_buf(),
        arch: "vgg13".into(),
        epochs: 2,
        batch_size: 2,
        num_workers: 0,
        image_size: 8,
        resize: 10,
        gpu: DeviceChoice::HostOnly,
        save_dir: ckpt_dir.clone(),
        evaluate_test: true,
        ..Default::default()
    };

    let session = TrainingSession::new(config, host_placement()).unwrap();
    let data = session.load_data().unwrap();
    assert_eq!(data.train.len(), 20);
    assert_eq!(data.valid.len(), 4);
    assert_eq!(data.test.as_ref().map(|t| t.len()), Some(4));

    let summary = session.run_with(data, tiny_model_config()).unwrap();
    assert_eq!(summary.steps, 20);
    let steps: Vec<usize> = summary.reports.iter().map(|r| r.step).collect();
    assert_eq!(steps, vec![10, 20]);

    let test = summary.test_metrics.expect("test split was scored");
    assert_eq!(test.samples, 4);

    for file in checkpoint_files(&ckpt_dir) {
        assert!(file.exists(), "{}", file.display());
    }
    let loaded = load_checkpoint::<HostBackend>(&ckpt_dir, &Default::default()).unwrap();
    assert_eq!(loaded.metadata.hyperparameters.epochs, 2);
    assert_eq!(loaded.metadata.architecture, "vgg-tiny");
}

#[test]
fn session_rejects_missing_validation_split() {
    let dir = tempfile::tempdir().unwrap();
    write_split(dir.path(), "train", 2);

    let config = TrainConfig {
        data_dir: dir.path().to_path_buf(),
        gpu: DeviceChoice::HostOnly,
        ..Default::default()
    };
    let session = TrainingSession::new(config, host_placement()).unwrap();
    assert!(session.load_data().is_err());
}
