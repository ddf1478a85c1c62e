//! Page image transforms for constrained displays.
//!
//! [`ImageTransformPipeline::process`] runs a fixed sequence of optional
//! steps: fit-to-bounds resize, grayscale, contrast, gamma, sharpen, encode.
//! Only the resize step changes dimensions. Each step is also exposed as a
//! free function so it can be tested on its own.

use image::imageops::FilterType;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, GenericImageView, RgbaImage};
use tracing::{debug, instrument};

use super::error::ImageError;
use super::profile::{OptimizationSettings, OutputEncoding};

/// An encoded, transformed image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Stateless image transform driven by [`OptimizationSettings`].
#[derive(Debug, Clone, Copy)]
pub struct ImageTransformPipeline {
    settings: OptimizationSettings,
}

impl ImageTransformPipeline {
    #[must_use]
    pub fn new(settings: OptimizationSettings) -> Self {
        Self { settings }
    }

    #[must_use]
    pub fn settings(&self) -> &OptimizationSettings {
        &self.settings
    }

    /// Decodes `bytes`, applies every enabled step and re-encodes.
    ///
    /// Re-encoding always drops embedded metadata such as EXIF.
    ///
    /// # Errors
    ///
    /// - [`ImageError::InvalidSettings`] for zero bounds, quality or gamma
    /// - [`ImageError::Decode`] if `bytes` is not an image
    /// - [`ImageError::Encode`] if the encoder fails
    #[instrument(level = "debug", skip(self, bytes), fields(input_bytes = bytes.len()))]
    pub fn process(&self, bytes: &[u8]) -> Result<EncodedImage, ImageError> {
        self.validate()?;
        let decoded =
            image::load_from_memory(bytes).map_err(|source| ImageError::Decode { source })?;
        let transformed = self.transform(decoded);
        let (width, height) = transformed.dimensions();
        let bytes = encode(&transformed, &self.settings)?;
        debug!(width, height, output_bytes = bytes.len(), "page optimized");

        Ok(EncodedImage {
            bytes,
            content_type: self.settings.encoding.content_type(),
            width,
            height,
        })
    }

    /// Applies the pixel steps to an already decoded image.
    #[must_use]
    pub fn transform(&self, image: DynamicImage) -> DynamicImage {
        let s = &self.settings;
        let (width, height) = image.dimensions();
        let (target_w, target_h) = target_dimensions(width, height, s.max_width, s.max_height);

        let mut image = if (target_w, target_h) == (width, height) {
            image
        } else {
            image.resize_exact(target_w, target_h, FilterType::CatmullRom)
        };

        if s.grayscale {
            image = image.grayscale();
        }

        let contrast = (s.contrast - 1.0).abs() > f64::EPSILON;
        let gamma = (s.gamma - 1.0).abs() > f64::EPSILON;
        if !(contrast || gamma || s.sharpen) {
            return image;
        }

        let mut rgba = image.to_rgba8();
        if contrast {
            adjust_contrast(&mut rgba, s.contrast);
        }
        if gamma {
            apply_gamma(&mut rgba, s.gamma);
        }
        if s.sharpen {
            rgba = sharpen(&rgba);
        }

        if s.grayscale {
            DynamicImage::ImageRgba8(rgba).grayscale()
        } else {
            DynamicImage::ImageRgba8(rgba)
        }
    }

    fn validate(&self) -> Result<(), ImageError> {
        let s = &self.settings;
        if s.max_width == 0 || s.max_height == 0 {
            return Err(ImageError::InvalidSettings(
                "max width and height must be positive".to_string(),
            ));
        }
        if !(1..=100).contains(&s.quality) {
            return Err(ImageError::InvalidSettings(format!(
                "quality {} outside 1-100",
                s.quality
            )));
        }
        if !(s.gamma.is_finite() && s.gamma > 0.0) {
            return Err(ImageError::InvalidSettings(format!(
                "gamma {} must be positive",
                s.gamma
            )));
        }
        Ok(())
    }
}

/// Computes the size that fits `width`x`height` inside the bounds.
///
/// Images already within bounds keep their size. Otherwise both sides are
/// scaled by `min(max_w / w, max_h / h)` and truncated, never below 1px.
///
/// ```
/// use mangas_core::imaging::target_dimensions;
///
/// assert_eq!(target_dimensions(500, 700, 600, 800), (500, 700));
/// assert_eq!(target_dimensions(1200, 1600, 600, 800), (600, 800));
/// assert_eq!(target_dimensions(2000, 1000, 500, 800), (500, 250));
/// ```
#[must_use]
pub fn target_dimensions(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 || (width <= max_width && height <= max_height) {
        return (width, height);
    }

    let width_ratio = f64::from(max_width) / f64::from(width);
    let height_ratio = f64::from(max_height) / f64::from(height);
    let scaled = |side: u32, ratio: f64, bound: u32| -> u32 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let value = (f64::from(side) * ratio) as u32;
        value.clamp(1, bound)
    };

    // The limiting side lands on its bound exactly; only the other is truncated.
    if width_ratio <= height_ratio {
        (max_width, scaled(height, width_ratio, max_height))
    } else {
        (scaled(width, height_ratio, max_width), max_height)
    }
}

/// Remaps each color channel as `clamp(128 + (v - 128) * factor)`.
pub fn adjust_contrast(image: &mut RgbaImage, factor: f64) {
    let lut: [u8; 256] = std::array::from_fn(|i| {
        #[allow(clippy::cast_precision_loss)]
        let v = (i as f64 - 128.0).mul_add(factor, 128.0);
        clamp_channel(v)
    });
    apply_lut(image, &lut);
}

/// Builds the 256-entry gamma table `255 * (i / 255)^(1 / gamma)`.
#[must_use]
pub fn gamma_table(gamma: f64) -> [u8; 256] {
    let exponent = 1.0 / gamma;
    std::array::from_fn(|i| {
        #[allow(clippy::cast_precision_loss)]
        let normalized = i as f64 / 255.0;
        clamp_channel(255.0 * normalized.powf(exponent))
    })
}

/// Applies [`gamma_table`] to every color channel.
pub fn apply_gamma(image: &mut RgbaImage, gamma: f64) {
    apply_lut(image, &gamma_table(gamma));
}

/// Sharpens with the 3x3 kernel `[-1 -1 -1; -1 9 -1; -1 -1 -1]`.
///
/// Only interior pixels are convolved; the outermost ring and all alpha
/// values are copied unchanged.
#[must_use]
pub fn sharpen(image: &RgbaImage) -> RgbaImage {
    let (width, height) = image.dimensions();
    let mut out = image.clone();
    if width < 3 || height < 3 {
        return out;
    }

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut sums = [0i32; 3];
            for dy in 0..3 {
                for dx in 0..3 {
                    let weight = if dx == 1 && dy == 1 { 9 } else { -1 };
                    let p = image.get_pixel(x + dx - 1, y + dy - 1);
                    for (sum, &channel) in sums.iter_mut().zip(p.0.iter()) {
                        *sum += weight * i32::from(channel);
                    }
                }
            }
            let pixel = out.get_pixel_mut(x, y);
            for (channel, sum) in pixel.0.iter_mut().zip(sums) {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let clamped = sum.clamp(0, 255) as u8;
                *channel = clamped;
            }
        }
    }
    out
}

fn apply_lut(image: &mut RgbaImage, lut: &[u8; 256]) {
    for pixel in image.pixels_mut() {
        for channel in pixel.0.iter_mut().take(3) {
            *channel = lut[usize::from(*channel)];
        }
    }
}

fn clamp_channel(value: f64) -> u8 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let v = value.clamp(0.0, 255.0) as u8;
    v
}

fn encode(image: &DynamicImage, settings: &OptimizationSettings) -> Result<Vec<u8>, ImageError> {
    let mut out = Vec::new();
    let format = settings.encoding.as_str();
    let result = match settings.encoding {
        OutputEncoding::Jpeg => {
            // JPEG has no alpha channel.
            let flattened = if settings.grayscale {
                DynamicImage::ImageLuma8(image.to_luma8())
            } else {
                DynamicImage::ImageRgb8(image.to_rgb8())
            };
            flattened.write_with_encoder(JpegEncoder::new_with_quality(&mut out, settings.quality))
        }
        OutputEncoding::Png => image.write_with_encoder(PngEncoder::new(&mut out)),
    };
    result.map_err(|source| ImageError::Encode { format, source })?;
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgba};

    use super::*;

    fn checkerboard(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([200, 180, 40, 255])
            } else {
                Rgba([30, 60, 220, 128])
            }
        })
    }

    fn png_bytes(image: &RgbaImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    // ==================== Resize Tests ====================

    #[test]
    fn test_target_dimensions_within_bounds_unchanged() {
        assert_eq!(target_dimensions(600, 800, 600, 800), (600, 800));
        assert_eq!(target_dimensions(10, 10, 600, 800), (10, 10));
    }

    #[test]
    fn test_target_dimensions_fits_one_bound_exactly() {
        let (w, h) = target_dimensions(1500, 1000, 758, 1024);
        assert_eq!(w, 758);
        assert!(h <= 1024);

        let (w, h) = target_dimensions(1000, 3000, 758, 1024);
        assert_eq!(h, 1024);
        assert!(w <= 758);
    }

    #[test]
    fn test_target_dimensions_truncates() {
        // 0.5 * 333 = 166.5 -> 166
        assert_eq!(target_dimensions(400, 333, 200, 1000), (200, 166));
    }

    // ==================== Tone Tests ====================

    #[test]
    fn test_contrast_formula_and_alpha_kept() {
        let mut img = RgbaImage::from_pixel(1, 1, Rgba([100, 128, 250, 77]));
        adjust_contrast(&mut img, 2.0);
        // 128 + (100-128)*2 = 72; 128 stays; 128 + 122*2 clamps to 255
        assert_eq!(img.get_pixel(0, 0).0, [72, 128, 255, 77]);
    }

    #[test]
    fn test_gamma_table_endpoints_and_direction() {
        let table = gamma_table(0.9);
        assert_eq!(table[0], 0);
        assert_eq!(table[255], 255);
        // gamma below 1 darkens midtones
        assert!(table[128] < 128);

        let identity = gamma_table(1.0);
        assert!(identity.iter().enumerate().all(|(i, &v)| usize::from(v) == i));
    }

    // ==================== Sharpen Tests ====================

    #[test]
    fn test_sharpen_preserves_border_ring() {
        let img = checkerboard(6, 5);
        let out = sharpen(&img);
        let (w, h) = img.dimensions();
        for y in 0..h {
            for x in 0..w {
                if x == 0 || y == 0 || x == w - 1 || y == h - 1 {
                    assert_eq!(out.get_pixel(x, y), img.get_pixel(x, y), "border ({x},{y})");
                }
            }
        }
    }

    #[test]
    fn test_sharpen_changes_nonuniform_interior() {
        let img = checkerboard(5, 5);
        let out = sharpen(&img);
        assert_ne!(out.get_pixel(2, 2), img.get_pixel(2, 2));
        assert_eq!(out.get_pixel(2, 2).0[3], img.get_pixel(2, 2).0[3]);
    }

    #[test]
    fn test_sharpen_uniform_image_is_unchanged() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([90, 90, 90, 255]));
        assert_eq!(sharpen(&img), img);
    }

    // ==================== Pipeline Tests ====================

    #[test]
    fn test_process_downscales_and_encodes_jpeg() {
        let settings = OptimizationSettings {
            max_width: 40,
            max_height: 40,
            ..OptimizationSettings::passthrough(OutputEncoding::Jpeg)
        };
        let out = ImageTransformPipeline::new(settings)
            .process(&png_bytes(&checkerboard(100, 50)))
            .unwrap();

        assert_eq!((out.width, out.height), (40, 20));
        assert_eq!(out.content_type, "image/jpeg");
        let decoded = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (40, 20));
    }

    #[test]
    fn test_process_keeps_dimensions_for_tone_steps() {
        let settings = OptimizationSettings {
            grayscale: true,
            sharpen: true,
            contrast: 1.1,
            gamma: 0.9,
            ..OptimizationSettings::passthrough(OutputEncoding::Png)
        };
        let out = ImageTransformPipeline::new(settings)
            .process(&png_bytes(&checkerboard(17, 9)))
            .unwrap();
        assert_eq!((out.width, out.height), (17, 9));
        assert_eq!(out.content_type, "image/png");
    }

    #[test]
    fn test_process_rejects_garbage() {
        let pipeline =
            ImageTransformPipeline::new(OptimizationSettings::passthrough(OutputEncoding::Jpeg));
        let err = pipeline.process(b"definitely not an image").unwrap_err();
        assert!(matches!(err, ImageError::Decode { .. }));
        assert!(!err.is_usage_error());
    }

    #[test]
    fn test_process_rejects_invalid_settings() {
        let settings = OptimizationSettings {
            gamma: 0.0,
            ..OptimizationSettings::passthrough(OutputEncoding::Jpeg)
        };
        let err = ImageTransformPipeline::new(settings)
            .process(&png_bytes(&checkerboard(2, 2)))
            .unwrap_err();
        assert!(err.is_usage_error());
    }
}
