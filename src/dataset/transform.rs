//! Image transforms
//!
//! Training images get a random rotation, a random resized crop and a random
//! horizontal flip. Evaluation images are resized on their shorter side and
//! center cropped. Both produce square RGB images of the crop size; the
//! batcher turns them into normalized CHW tensors.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageBuffer, Rgb, RgbImage};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// ImageNet channel means (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Attempts at sampling a crop box before falling back to a center crop
const CROP_ATTEMPTS: usize = 10;

/// Random augmentation applied to training images
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainAugmentation {
    /// Rotation angle is drawn from `[-rotation_degrees, rotation_degrees]`
    pub rotation_degrees: f32,
    /// Output side length
    pub crop_size: u32,
    /// Bounds of the crop area as a fraction of the image area
    pub scale: (f32, f32),
    /// Bounds of the crop aspect ratio (width / height)
    pub ratio: (f32, f32),
    pub horizontal_flip_prob: f32,
}

impl TrainAugmentation {
    pub fn new(crop_size: u32, rotation_degrees: f32) -> Self {
        Self {
            rotation_degrees,
            crop_size,
            scale: (0.08, 1.0),
            ratio: (3.0 / 4.0, 4.0 / 3.0),
            horizontal_flip_prob: 0.5,
        }
    }

    pub fn apply<R: Rng + ?Sized>(&self, img: DynamicImage, rng: &mut R) -> DynamicImage {
        let mut result = img;

        if self.rotation_degrees > 0.0 {
            let angle = rng.gen_range(-self.rotation_degrees..=self.rotation_degrees);
            result = rotate(&result, angle);
        }

        let (x, y, w, h) =
            random_resized_crop_box(result.width(), result.height(), self.scale, self.ratio, rng);
        result = result
            .crop_imm(x, y, w, h)
            .resize_exact(self.crop_size, self.crop_size, FilterType::Triangle);

        if rng.gen::<f32>() < self.horizontal_flip_prob {
            result = result.fliph();
        }

        result
    }
}

/// Deterministic preprocessing for validation, test and inference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalPreprocess {
    /// Target length of the shorter side
    pub resize: u32,
    pub crop_size: u32,
}

impl EvalPreprocess {
    pub fn new(resize: u32, crop_size: u32) -> Self {
        Self { resize, crop_size }
    }

    pub fn apply(&self, img: &DynamicImage) -> DynamicImage {
        let resized = resize_shorter_side(img, self.resize);
        center_crop(&resized, self.crop_size)
    }
}

/// Transform attached to a batcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImageTransform {
    Train(TrainAugmentation),
    Eval(EvalPreprocess),
}

impl ImageTransform {
    pub fn apply<R: Rng + ?Sized>(&self, img: DynamicImage, rng: &mut R) -> DynamicImage {
        match self {
            ImageTransform::Train(augmentation) => augmentation.apply(img, rng),
            ImageTransform::Eval(preprocess) => preprocess.apply(&img),
        }
    }

    /// Side length of the square images this transform produces
    pub fn output_size(&self) -> u32 {
        match self {
            ImageTransform::Train(augmentation) => augmentation.crop_size,
            ImageTransform::Eval(preprocess) => preprocess.crop_size,
        }
    }
}

/// Rotate an image around its center, keeping its size.
/// Pixels that map outside the source are black.
pub fn rotate(img: &DynamicImage, angle_degrees: f32) -> DynamicImage {
    if angle_degrees.abs() < 0.1 {
        return img.clone();
    }

    let angle_rad = angle_degrees.to_radians();
    let (width, height) = img.dimensions();
    let rgb = img.to_rgb8();

    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;

    let cos_a = angle_rad.cos();
    let sin_a = angle_rad.sin();

    let mut output = ImageBuffer::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;

            // Inverse mapping: counter-clockwise rotation for positive angles
            let src_x = cx + dx * cos_a - dy * sin_a;
            let src_y = cy + dx * sin_a + dy * cos_a;

            output.put_pixel(x, y, bilinear_sample(&rgb, src_x, src_y));
        }
    }

    DynamicImage::ImageRgb8(output)
}

fn bilinear_sample(img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (width, height) = img.dimensions();

    if x < 0.0 || y < 0.0 || x > (width - 1) as f32 || y > (height - 1) as f32 {
        return Rgb([0, 0, 0]);
    }

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut result = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
        let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
        result[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }

    Rgb(result)
}

/// Sample a crop box `(x, y, width, height)` covering a random fraction of
/// the image area with a random aspect ratio. After [`CROP_ATTEMPTS`]
/// misses, falls back to the largest centered box within the ratio bounds.
pub fn random_resized_crop_box<R: Rng + ?Sized>(
    width: u32,
    height: u32,
    scale: (f32, f32),
    ratio: (f32, f32),
    rng: &mut R,
) -> (u32, u32, u32, u32) {
    let area = width as f32 * height as f32;
    let log_ratio = (ratio.0.ln(), ratio.1.ln());

    for _ in 0..CROP_ATTEMPTS {
        let target_area = area * rng.gen_range(scale.0..=scale.1);
        let aspect = rng.gen_range(log_ratio.0..=log_ratio.1).exp();

        let w = (target_area * aspect).sqrt().round() as u32;
        let h = (target_area / aspect).sqrt().round() as u32;

        if w > 0 && h > 0 && w <= width && h <= height {
            let x = rng.gen_range(0..=width - w);
            let y = rng.gen_range(0..=height - h);
            return (x, y, w, h);
        }
    }

    let in_ratio = width as f32 / height as f32;
    let (w, h) = if in_ratio < ratio.0 {
        (width, ((width as f32 / ratio.0).round() as u32).clamp(1, height))
    } else if in_ratio > ratio.1 {
        (((height as f32 * ratio.1).round() as u32).clamp(1, width), height)
    } else {
        (width, height)
    };

    ((width - w) / 2, (height - h) / 2, w, h)
}

/// Resize so the shorter side equals `size`, keeping the aspect ratio
pub fn resize_shorter_side(img: &DynamicImage, size: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    let (new_w, new_h) = if width <= height {
        (size, ((size as u64 * height as u64) / width as u64) as u32)
    } else {
        (((size as u64 * width as u64) / height as u64) as u32, size)
    };

    if (new_w, new_h) == (width, height) {
        return img.clone();
    }
    img.resize_exact(new_w, new_h, FilterType::Triangle)
}

/// Crop the central `size x size` square, padding with black when the
/// image is smaller than the crop
pub fn center_crop(img: &DynamicImage, size: u32) -> DynamicImage {
    let (width, height) = img.dimensions();

    if width < size || height < size {
        let mut canvas = RgbImage::new(size, size);
        let x = (size as i64 - width as i64) / 2;
        let y = (size as i64 - height as i64) / 2;
        image::imageops::overlay(&mut canvas, &img.to_rgb8(), x, y);
        return center_crop(&DynamicImage::ImageRgb8(canvas), size);
    }

    let left = ((width - size) as f32 / 2.0).round() as u32;
    let top = ((height - size) as f32 / 2.0).round() as u32;
    img.crop_imm(left, top, size, size)
}

/// Convert an image to CHW float data in `[0, 1]`
pub fn to_chw(img: &DynamicImage) -> Vec<f32> {
    let rgb = img.to_rgb8();
    let (width, height) = (rgb.width() as usize, rgb.height() as usize);
    let plane = width * height;
    let mut data = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let offset = y as usize * width + x as usize;
        data[offset] = pixel[0] as f32 / 255.0;
        data[plane + offset] = pixel[1] as f32 / 255.0;
        data[2 * plane + offset] = pixel[2] as f32 / 255.0;
    }

    data
}
