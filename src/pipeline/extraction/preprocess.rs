//! Image preprocessing for OCR: decode → grayscale → adaptive threshold.
//!
//! Phone photos of prescriptions have uneven lighting, shadows, and paper
//! texture. A single global threshold either drowns the dark corner or erases
//! the bright one, so each pixel is compared against a Gaussian-weighted mean
//! of its own neighborhood instead (OpenCV `ADAPTIVE_THRESH_GAUSSIAN_C` with
//! `THRESH_BINARY`).

use std::borrow::Cow;
use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageOutputFormat, Luma, RgbImage};
use tracing::debug;

use super::ExtractionError;

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

/// Maximum input image size (in bytes) before rejecting.
/// Prevents OOM on corrupt/adversarial files.
const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024; // 50 MB

/// Minimum valid image size in bytes (smallest valid PNG is ~67 bytes).
const MIN_IMAGE_BYTES: usize = 67;

/// Longest side kept before thresholding; larger photos are scaled down.
pub const MAX_INPUT_DIMENSION: u32 = 4096;

const WHITE: u8 = 255;
const BLACK: u8 = 0;

// ═══════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════

/// Adaptive threshold tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdConfig {
    /// Side of the square neighborhood, in pixels. Odd, at least 3.
    pub block_size: u32,
    /// Subtracted from the local mean; larger values keep more pixels white.
    pub constant: f32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            block_size: 11,
            constant: 2.0,
        }
    }
}

impl ThresholdConfig {
    pub fn is_valid(&self) -> bool {
        self.block_size >= 3 && self.block_size % 2 == 1
    }

    /// Gaussian sigma derived from the block size (OpenCV's rule for sigma = 0).
    pub fn sigma(&self) -> f32 {
        0.3 * ((self.block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
    }
}

// ═══════════════════════════════════════════════════════════
// Preprocessor
// ═══════════════════════════════════════════════════════════

/// Turns raw image bytes into an OCR-ready page.
///
/// Pure image-to-image transform: no I/O, no model calls.
pub trait ImagePreprocessor: Send + Sync {
    fn preprocess(&self, image_bytes: &[u8]) -> Result<PreparedImage, ExtractionError>;
}

/// Binarized page, PNG-encoded.
#[derive(Debug)]
pub struct PreparedImage {
    pub png_bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Production preprocessor: validate → decode → grayscale → adaptive threshold → PNG.
#[derive(Debug, Clone, Default)]
pub struct BinarizingPreprocessor {
    threshold: ThresholdConfig,
}

impl BinarizingPreprocessor {
    pub fn new(threshold: ThresholdConfig) -> Self {
        Self { threshold }
    }
}

impl ImagePreprocessor for BinarizingPreprocessor {
    fn preprocess(&self, image_bytes: &[u8]) -> Result<PreparedImage, ExtractionError> {
        validate_image_bytes(image_bytes)?;

        let img = image::load_from_memory(image_bytes).map_err(|e| {
            ExtractionError::ImageProcessing(format!("Failed to decode image: {e}"))
        })?;

        let rgb = img.to_rgb8();
        let working = pre_downscale(&rgb, MAX_INPUT_DIMENSION);
        let gray = rgb_to_gray(&working);
        let binary = adaptive_threshold(&gray, &self.threshold)?;
        let png_bytes = encode_png(&binary)?;

        debug!(
            size = %format!("{}x{}", binary.width(), binary.height()),
            block_size = self.threshold.block_size,
            constant = self.threshold.constant,
            png_size = png_bytes.len(),
            "Image binarized for OCR"
        );

        Ok(PreparedImage {
            width: binary.width(),
            height: binary.height(),
            png_bytes,
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Pixel operations
// ═══════════════════════════════════════════════════════════

/// Validate image bytes before decoding.
/// Rejects clearly invalid input before decoding.
pub fn validate_image_bytes(bytes: &[u8]) -> Result<(), ExtractionError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(ExtractionError::ImageProcessing(
            "Image data too small to be valid".into(),
        ));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ExtractionError::ImageProcessing(format!(
            "Image data exceeds {}MB limit",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Shrink so the longest side is at most `max_dim`, keeping the aspect ratio.
/// Images already within bounds are borrowed as-is.
pub fn pre_downscale(img: &RgbImage, max_dim: u32) -> Cow<'_, RgbImage> {
    let (w, h) = (img.width(), img.height());
    let largest = w.max(h);
    if largest <= max_dim {
        return Cow::Borrowed(img);
    }

    let scale = max_dim as f32 / largest as f32;
    let new_w = ((w as f32 * scale).round() as u32).clamp(1, max_dim);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, max_dim);
    debug!(from = %format!("{w}x{h}"), to = %format!("{new_w}x{new_h}"), "Downscaling oversized photo");

    Cow::Owned(image::imageops::resize(img, new_w, new_h, FilterType::Triangle))
}

/// Convert RGB image to grayscale using ITU-R BT.601 luminance.
pub fn rgb_to_gray(rgb: &RgbImage) -> GrayImage {
    let (w, h) = (rgb.width(), rgb.height());
    let mut gray = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let p = rgb.get_pixel(x, y);
            let luma = (0.299 * p.0[0] as f32 + 0.587 * p.0[1] as f32 + 0.114 * p.0[2] as f32)
                .round()
                .min(255.0) as u8;
            gray.put_pixel(x, y, Luma([luma]));
        }
    }
    gray
}

/// Normalized 1-D Gaussian kernel of odd length `size`.
pub fn gaussian_kernel(size: u32, sigma: f32) -> Vec<f32> {
    let center = (size as f32 - 1.0) / 2.0;
    let two_sigma_sq = 2.0 * sigma * sigma;
    let raw: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / two_sigma_sq).exp()
        })
        .collect();
    let sum: f32 = raw.iter().sum();
    raw.into_iter().map(|v| v / sum).collect()
}

/// Separable Gaussian blur with replicated borders. Returns row-major floats.
fn gaussian_blur(img: &GrayImage, kernel: &[f32]) -> Vec<f32> {
    let (w, h) = (img.width() as i64, img.height() as i64);
    let radius = (kernel.len() / 2) as i64;
    let clamp = |v: i64, max: i64| v.clamp(0, max - 1);

    let mut horizontal = vec![0.0f32; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = clamp(x + k as i64 - radius, w);
                acc += weight * img.get_pixel(sx as u32, y as u32).0[0] as f32;
            }
            horizontal[(y * w + x) as usize] = acc;
        }
    }

    let mut blurred = vec![0.0f32; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = clamp(y + k as i64 - radius, h);
                acc += weight * horizontal[(sy * w + x) as usize];
            }
            blurred[(y * w + x) as usize] = acc;
        }
    }
    blurred
}

/// Binarize against the Gaussian-weighted local mean.
///
/// A pixel turns white when it is brighter than `local_mean - constant`
/// (constant rounded up, local mean rounded to the nearest level), else black.
pub fn adaptive_threshold(
    img: &GrayImage,
    config: &ThresholdConfig,
) -> Result<GrayImage, ExtractionError> {
    if !config.is_valid() {
        return Err(ExtractionError::ImageProcessing(format!(
            "Threshold block size must be odd and >= 3, got {}",
            config.block_size
        )));
    }

    let (w, h) = (img.width(), img.height());
    let kernel = gaussian_kernel(config.block_size, config.sigma());
    let means = gaussian_blur(img, &kernel);
    let delta = config.constant.ceil() as i32;

    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let src = img.get_pixel(x, y).0[0] as i32;
            let mean = means[(y as usize) * (w as usize) + x as usize]
                .round()
                .clamp(0.0, 255.0) as i32;
            let value = if src - mean > -delta { WHITE } else { BLACK };
            out.put_pixel(x, y, Luma([value]));
        }
    }
    Ok(out)
}

/// Encode a grayscale image as PNG bytes.
pub fn encode_png(img: &GrayImage) -> Result<Vec<u8>, ExtractionError> {
    let dynamic = DynamicImage::ImageLuma8(img.clone());
    let mut cursor = Cursor::new(Vec::new());
    dynamic
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encoding failed: {e}")))?;
    Ok(cursor.into_inner())
}

// ═══════════════════════════════════════════════════════════
// Mock implementations (testing)
// ═══════════════════════════════════════════════════════════

/// Mock preprocessor: passes bytes through untouched, or fails on demand.
pub struct MockImagePreprocessor {
    fail: bool,
}

impl MockImagePreprocessor {
    pub fn new() -> Self {
        Self { fail: false }
    }

    pub fn failing() -> Self {
        Self { fail: true }
    }
}

impl Default for MockImagePreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ImagePreprocessor for MockImagePreprocessor {
    fn preprocess(&self, image_bytes: &[u8]) -> Result<PreparedImage, ExtractionError> {
        if self.fail {
            return Err(ExtractionError::ImageProcessing(
                "Mock preprocessing failure".into(),
            ));
        }
        Ok(PreparedImage {
            png_bytes: image_bytes.to_vec(),
            width: 0,
            height: 0,
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
