//! Folder-per-class dataset discovery
//!
//! A split directory holds one sub-directory per class; every image below a
//! class directory is a sample of that class:
//!
//! ```text
//! train/
//! ├── 1/
//! │   ├── image_06734.jpg
//! │   └── image_06735.jpg
//! ├── 10/
//! │   └── ...
//! └── ...
//! ```
//!
//! Class indices follow the sorted directory names, so `"10"` sorts before
//! `"2"`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use image::ImageReader;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use walkdir::WalkDir;

use crate::utils::error::{ClassifierError, Result};
use crate::utils::format_number;

/// File extensions accepted as images (compared case-insensitively)
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "ppm", "bmp", "pgm", "tif", "tiff", "webp",
];

/// A single image sample with its label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSample {
    pub path: PathBuf,
    pub label: usize,
}

/// One split of an image-folder dataset
#[derive(Debug, Clone)]
pub struct ImageFolder {
    pub root_dir: PathBuf,
    pub samples: Vec<ImageSample>,
    /// Class directory name to label index
    pub class_to_idx: BTreeMap<String, usize>,
}

impl ImageFolder {
    /// Scan a split directory, deriving the class index from its
    /// sub-directories.
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref();
        let class_to_idx: BTreeMap<String, usize> = class_directories(root_dir)?
            .into_iter()
            .enumerate()
            .map(|(idx, name)| (name, idx))
            .collect();

        if class_to_idx.is_empty() {
            return Err(ClassifierError::Dataset(format!(
                "no class directories found in {}",
                root_dir.display()
            )));
        }

        Self::scan(root_dir, class_to_idx)
    }

    /// Scan a split directory using an existing class index, typically the
    /// training split's. A class directory missing from the index is an error.
    pub fn with_class_index<P: AsRef<Path>>(
        root_dir: P,
        class_to_idx: &BTreeMap<String, usize>,
    ) -> Result<Self> {
        let root_dir = root_dir.as_ref();
        for name in class_directories(root_dir)? {
            if !class_to_idx.contains_key(&name) {
                return Err(ClassifierError::Dataset(format!(
                    "class directory '{}' in {} does not exist in the training split",
                    name,
                    root_dir.display()
                )));
            }
        }

        Self::scan(root_dir, class_to_idx.clone())
    }

    fn scan(root_dir: &Path, class_to_idx: BTreeMap<String, usize>) -> Result<Self> {
        info!("Scanning image folder: {}", root_dir.display());

        let mut samples = Vec::new();
        for (class_name, &label) in &class_to_idx {
            let class_dir = root_dir.join(class_name);
            if !class_dir.is_dir() {
                debug!("Class '{}' has no directory in {}", class_name, root_dir.display());
                continue;
            }

            let before = samples.len();
            for entry in WalkDir::new(&class_dir)
                .min_depth(1)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if entry.file_type().is_file() && is_image_file(entry.path()) {
                    samples.push(ImageSample {
                        path: entry.into_path(),
                        label,
                    });
                }
            }

            debug!(
                "Class '{}' (label {}): {} samples",
                class_name,
                label,
                samples.len() - before
            );
        }

        // Label order, then file order within each class
        samples.sort_by(|a, b| a.label.cmp(&b.label).then_with(|| a.path.cmp(&b.path)));

        info!(
            "Found {} images in {} classes",
            format_number(samples.len()),
            class_to_idx.len()
        );

        Ok(Self {
            root_dir: root_dir.to_path_buf(),
            samples,
            class_to_idx,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.class_to_idx.len()
    }

    /// Class names ordered by label index
    pub fn classes(&self) -> Vec<String> {
        let mut classes: Vec<(usize, String)> = self
            .class_to_idx
            .iter()
            .map(|(name, &idx)| (idx, name.clone()))
            .collect();
        classes.sort();
        classes.into_iter().map(|(_, name)| name).collect()
    }

    /// Fail with a dataset error when the split holds no images
    pub fn require_samples(&self, split: &str) -> Result<()> {
        if self.is_empty() {
            return Err(ClassifierError::Dataset(format!(
                "{} split at {} contains no images",
                split,
                self.root_dir.display()
            )));
        }
        Ok(())
    }

    /// Decode every image in parallel so malformed files abort the run
    /// before training starts. A valid header alone is not enough: a file
    /// with a corrupt body would otherwise end the loader mid-epoch.
    pub fn verify_images(&self) -> Result<()> {
        let total = self.samples.len();
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} images")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let checked = AtomicUsize::new(0);
        let failures: Vec<(PathBuf, String)> = self
            .samples
            .par_iter()
            .filter_map(|sample| {
                let result = decode_check(&sample.path);
                let count = checked.fetch_add(1, Ordering::Relaxed);
                if count % 100 == 0 {
                    pb.set_position(count as u64);
                }
                result.err().map(|reason| (sample.path.clone(), reason))
            })
            .collect();
        pb.finish_and_clear();

        for (path, reason) in &failures {
            error!("Unreadable image {}: {}", path.display(), reason);
        }

        match failures.into_iter().next() {
            Some((path, reason)) => Err(ClassifierError::ImageLoad(path, reason)),
            None => Ok(()),
        }
    }

    pub fn stats(&self) -> DatasetStats {
        let mut class_counts = vec![0usize; self.num_classes()];
        for sample in &self.samples {
            class_counts[sample.label] += 1;
        }

        DatasetStats {
            total_samples: self.samples.len(),
            class_counts,
            class_names: self.classes(),
        }
    }
}

/// Sorted names of the sub-directories of `root_dir`
fn class_directories(root_dir: &Path) -> Result<Vec<String>> {
    if !root_dir.is_dir() {
        return Err(ClassifierError::PathNotFound(root_dir.to_path_buf()));
    }

    let mut names = Vec::new();
    for entry in std::fs::read_dir(root_dir)? {
        let entry = entry?;
        if entry.path().is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

fn decode_check(path: &Path) -> std::result::Result<(), String> {
    ImageReader::open(path)
        .map_err(|e| e.to_string())?
        .with_guessed_format()
        .map_err(|e| e.to_string())?
        .decode()
        .map(|_| ())
        .map_err(|e| e.to_string())
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Per-class sample counts of one split
#[derive(Debug, Clone)]
pub struct DatasetStats {
    pub total_samples: usize,
    /// Indexed by label
    pub class_counts: Vec<usize>,
    /// Indexed by label
    pub class_names: Vec<String>,
}

impl DatasetStats {
    /// Print statistics to console
    pub fn print(&self, title: &str) {
        println!("\n📊 {} ({} images, {} classes)", title, format_number(self.total_samples), self.class_names.len());

        let max = self.class_counts.iter().copied().max().unwrap_or(0).max(1);
        for (idx, (name, count)) in self.class_names.iter().zip(&self.class_counts).enumerate() {
            let bar = "█".repeat(count * 40 / max);
            println!("    {:3}. {:30} {:5} {}", idx, name, count, bar);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::fs;

    fn write_image(path: &Path) {
        RgbImage::from_pixel(8, 8, Rgb([120, 40, 200])).save(path).unwrap();
    }

    fn make_split(root: &Path, classes: &[(&str, usize)]) {
        for (class, count) in classes {
            let dir = root.join(class);
            fs::create_dir_all(&dir).unwrap();
            for i in 0..*count {
                write_image(&dir.join(format!("image_{i:03}.png")));
            }
        }
    }

    #[test]
    fn test_classes_are_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        make_split(dir.path(), &[("2", 1), ("10", 2), ("1", 3)]);

        let folder = ImageFolder::new(dir.path()).unwrap();
        assert_eq!(folder.classes(), vec!["1", "10", "2"]);
        assert_eq!(folder.class_to_idx["10"], 1);
        assert_eq!(folder.len(), 6);
        assert_eq!(folder.stats().class_counts, vec![3, 2, 1]);
    }

    #[test]
    fn test_non_image_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        make_split(dir.path(), &[("roses", 2)]);
        fs::write(dir.path().join("roses").join("notes.txt"), "x").unwrap();
        write_image(&dir.path().join("roses").join("UPPER.PNG"));

        let folder = ImageFolder::new(dir.path()).unwrap();
        assert_eq!(folder.len(), 3);
    }

    #[test]
    fn test_nested_images_are_collected() {
        let dir = tempfile::tempdir().unwrap();
        make_split(dir.path(), &[("tulip", 1)]);
        let nested = dir.path().join("tulip").join("extra");
        fs::create_dir_all(&nested).unwrap();
        write_image(&nested.join("deep.png"));

        let folder = ImageFolder::new(dir.path()).unwrap();
        assert_eq!(folder.len(), 2);
    }

    #[test]
    fn test_validation_split_reuses_training_index() {
        let dir = tempfile::tempdir().unwrap();
        let train = dir.path().join("train");
        let valid = dir.path().join("valid");
        make_split(&train, &[("a", 1), ("b", 1), ("c", 1)]);
        make_split(&valid, &[("c", 2)]);

        let train = ImageFolder::new(&train).unwrap();
        let valid = ImageFolder::with_class_index(&valid, &train.class_to_idx).unwrap();
        assert_eq!(valid.num_classes(), 3);
        assert!(valid.samples.iter().all(|s| s.label == 2));
    }

    #[test]
    fn test_unknown_validation_class_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let train = dir.path().join("train");
        let valid = dir.path().join("valid");
        make_split(&train, &[("a", 1)]);
        make_split(&valid, &[("z", 1)]);

        let train = ImageFolder::new(&train).unwrap();
        let err = ImageFolder::with_class_index(&valid, &train.class_to_idx).unwrap_err();
        assert!(matches!(err, ClassifierError::Dataset(_)));
    }

    #[test]
    fn test_missing_root_is_path_not_found() {
        let err = ImageFolder::new("/definitely/not/here").unwrap_err();
        assert!(matches!(err, ClassifierError::PathNotFound(_)));
    }

    #[test]
    fn test_verify_images_reports_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        make_split(dir.path(), &[("a", 2)]);
        fs::write(dir.path().join("a").join("broken.png"), b"not a png").unwrap();

        let folder = ImageFolder::new(dir.path()).unwrap();
        match folder.verify_images() {
            Err(ClassifierError::ImageLoad(path, _)) => assert!(path.ends_with("broken.png")),
            other => panic!("expected image load error, got {other:?}"),
        }
    }

    #[test]
    fn test_verify_images_decodes_past_a_valid_header() {
        let dir = tempfile::tempdir().unwrap();
        make_split(dir.path(), &[("a", 2)]);

        let path = dir.path().join("a").join("damaged.png");
        RgbImage::from_fn(32, 32, |x, y| Rgb([(x * 8) as u8, (y * 8) as u8, ((x + y) * 4) as u8]))
            .save(&path)
            .unwrap();
        let mut bytes = fs::read(&path).unwrap();
        let end = bytes.len() - 12;
        for byte in &mut bytes[45..end] {
            *byte ^= 0xAA;
        }
        fs::write(&path, &bytes).unwrap();
        assert_eq!(image::image_dimensions(&path).unwrap(), (32, 32));

        let folder = ImageFolder::new(dir.path()).unwrap();
        match folder.verify_images() {
            Err(ClassifierError::ImageLoad(bad, _)) => assert!(bad.ends_with("damaged.png")),
            other => panic!("expected image load error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_split_fails_requirement() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();

        let folder = ImageFolder::new(dir.path()).unwrap();
        assert!(folder.require_samples("train").is_err());
    }
}
