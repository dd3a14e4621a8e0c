//! Burn Dataset Integration
//!
//! Implements Burn's `Dataset` over an [`ImageFolder`] and a `Batcher` that
//! applies an [`ImageTransform`] and ImageNet normalization to each batch.

use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataloader::{DataLoader, DataLoaderBuilder};
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::{DynamicImage, ImageReader};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::error;

use crate::dataset::folder::{ImageFolder, ImageSample};
use crate::dataset::transform::{to_chw, ImageTransform, IMAGENET_MEAN, IMAGENET_STD};
use crate::utils::error::{ClassifierError, Result};

/// A decoded image with its label, before any transform
#[derive(Clone)]
pub struct ImageItem {
    pub image: DynamicImage,
    pub label: usize,
    pub path: PathBuf,
}

impl ImageItem {
    pub fn load(sample: &ImageSample) -> Result<Self> {
        let image = ImageReader::open(&sample.path)
            .map_err(|e| ClassifierError::ImageLoad(sample.path.clone(), e.to_string()))?
            .decode()
            .map_err(|e| ClassifierError::ImageLoad(sample.path.clone(), e.to_string()))?;

        Ok(Self {
            image,
            label: sample.label,
            path: sample.path.clone(),
        })
    }
}

impl std::fmt::Debug for ImageItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageItem")
            .field("label", &self.label)
            .field("path", &self.path)
            .field(
                "image_size",
                &format!("{}x{}", self.image.width(), self.image.height()),
            )
            .finish()
    }
}

/// Lazily decoding dataset over the samples of one split.
///
/// A file that fails to decode ends Burn's iteration over the dataset, so
/// splits are header-checked with [`ImageFolder::verify_images`] first.
#[derive(Debug, Clone)]
pub struct ImageFolderDataset {
    samples: Vec<ImageSample>,
}

impl ImageFolderDataset {
    pub fn new(folder: &ImageFolder) -> Self {
        Self {
            samples: folder.samples.clone(),
        }
    }
}

impl Dataset<ImageItem> for ImageFolderDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        let sample = self.samples.get(index)?;
        match ImageItem::load(sample) {
            Ok(item) => Some(item),
            Err(e) => {
                error!("{}", e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of images ready for the network
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    /// Normalized images, shape `[batch_size, 3, size, size]`
    pub images: Tensor<B, 4>,
    /// Class labels, shape `[batch_size]`
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher that transforms raw images and normalizes them
#[derive(Clone, Debug)]
pub struct ImageBatcher<B: Backend> {
    transform: ImageTransform,
    _backend: PhantomData<B>,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(transform: ImageTransform) -> Self {
        Self {
            transform,
            _backend: PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let size = self.transform.output_size() as usize;

        let mut images_data = Vec::with_capacity(batch_size * 3 * size * size);
        let mut targets_data = Vec::with_capacity(batch_size);

        // One RNG per batch; loader workers share no state
        let mut rng = ChaCha8Rng::seed_from_u64(rand::random::<u64>());

        for item in items {
            let image = self.transform.apply(item.image, &mut rng);
            images_data.extend(to_chw(&image));
            targets_data.push(item.label as i64);
        }

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, size, size]),
            device,
        );
        let images = normalize(images, device);

        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        ImageBatch { images, targets }
    }
}

/// Apply ImageNet normalization `(x - mean) / std` per channel
pub fn normalize<B: Backend>(images: Tensor<B, 4>, device: &B::Device) -> Tensor<B, 4> {
    let mean =
        Tensor::<B, 4>::from_floats(TensorData::new(IMAGENET_MEAN.to_vec(), [1, 3, 1, 1]), device);
    let std =
        Tensor::<B, 4>::from_floats(TensorData::new(IMAGENET_STD.to_vec(), [1, 3, 1, 1]), device);

    (images - mean) / std
}

/// Loader settings for one split
#[derive(Debug, Clone, Copy)]
pub struct LoaderOptions {
    pub batch_size: usize,
    /// Worker threads; 0 batches on the iterating thread
    pub num_workers: usize,
    /// Reshuffle every pass with this seed; `None` keeps dataset order
    pub shuffle_seed: Option<u64>,
}

/// Build a Burn data loader producing [`ImageBatch`]es on `device`
pub fn build_loader<B, D>(
    dataset: D,
    transform: ImageTransform,
    options: LoaderOptions,
    device: B::Device,
) -> Arc<dyn DataLoader<B, ImageBatch<B>>>
where
    B: Backend,
    D: Dataset<ImageItem> + 'static,
{
    let mut builder = DataLoaderBuilder::new(ImageBatcher::<B>::new(transform))
        .batch_size(options.batch_size)
        .set_device(device);

    // Zero workers means batching on the calling thread; Burn's
    // multi-threaded loader cannot split a dataset into zero parts.
    if options.num_workers > 0 {
        builder = builder.num_workers(options.num_workers);
    }

    if let Some(seed) = options.shuffle_seed {
        builder = builder.shuffle(seed);
    }

    builder.build(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::transform::{EvalPreprocess, TrainAugmentation};
    use burn::backend::NdArray;
    use burn::data::dataset::InMemDataset;
    use image::{Rgb, RgbImage};

    type TestBackend = NdArray<f32>;

    fn solid_item(value: u8, label: usize) -> ImageItem {
        ImageItem {
            image: DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 12, Rgb([value, value, value]))),
            label,
            path: PathBuf::from(format!("mem/{label}/{value}.png")),
        }
    }

    #[test]
    fn test_batcher_shapes_and_targets() {
        let device = Default::default();
        let batcher = ImageBatcher::<TestBackend>::new(ImageTransform::Eval(EvalPreprocess::new(12, 8)));
        let batch = batcher.batch(vec![solid_item(10, 0), solid_item(200, 3), solid_item(90, 1)], &device);

        assert_eq!(batch.images.dims(), [3, 3, 8, 8]);
        let targets: Vec<i64> = batch.targets.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(targets, vec![0, 3, 1]);
    }

    #[test]
    fn test_batcher_applies_imagenet_normalization() {
        let device = Default::default();
        let batcher = ImageBatcher::<TestBackend>::new(ImageTransform::Eval(EvalPreprocess::new(12, 4)));
        let batch = batcher.batch(vec![solid_item(255, 0)], &device);

        let values: Vec<f32> = batch.images.into_data().convert::<f32>().to_vec().unwrap();
        let plane = 16;
        for c in 0..3 {
            let expected = (1.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            assert!((values[c * plane] - expected).abs() < 1e-5);
        }
    }

    #[test]
    fn test_train_batcher_uses_crop_size() {
        let device = Default::default();
        let batcher =
            ImageBatcher::<TestBackend>::new(ImageTransform::Train(TrainAugmentation::new(6, 30.0)));
        let batch = batcher.batch(vec![solid_item(1, 0), solid_item(2, 1)], &device);
        assert_eq!(batch.images.dims(), [2, 3, 6, 6]);
    }

    fn ten_item_loader(num_workers: usize) -> Arc<dyn DataLoader<TestBackend, ImageBatch<TestBackend>>> {
        let items: Vec<ImageItem> = (0..10).map(|i| solid_item(i as u8, i % 2)).collect();
        build_loader::<TestBackend, _>(
            InMemDataset::new(items),
            ImageTransform::Eval(EvalPreprocess::new(12, 8)),
            LoaderOptions {
                batch_size: 4,
                num_workers,
                shuffle_seed: Some(1),
            },
            Default::default(),
        )
    }

    #[test]
    fn test_loader_without_workers_yields_ceil_batches() {
        let loader = ten_item_loader(0);
        assert_eq!(loader.num_items(), 10);

        let sizes: Vec<usize> = loader.iter().map(|batch| batch.targets.dims()[0]).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn test_loader_with_workers_yields_every_item() {
        let loader = ten_item_loader(2);

        let mut sizes: Vec<usize> = loader.iter().map(|batch| batch.targets.dims()[0]).collect();
        assert_eq!(sizes.iter().sum::<usize>(), 10);
        sizes.sort_unstable();
        assert!(sizes.iter().all(|&n| n <= 4));
    }

    #[test]
    fn test_dataset_loads_from_folder() {
        let dir = tempfile::tempdir().unwrap();
        let class_dir = dir.path().join("daisy");
        std::fs::create_dir_all(&class_dir).unwrap();
        RgbImage::from_pixel(9, 7, Rgb([1, 2, 3]))
            .save(class_dir.join("a.png"))
            .unwrap();

        let folder = ImageFolder::new(dir.path()).unwrap();
        let dataset = ImageFolderDataset::new(&folder);
        assert_eq!(dataset.len(), 1);
        let item = dataset.get(0).unwrap();
        assert_eq!((item.image.width(), item.image.height()), (9, 7));
        assert!(dataset.get(1).is_none());
    }
}
