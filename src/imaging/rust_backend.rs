//! Pure Rust image processing backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, WebP) | `image::ImageReader`, format sniffed from content |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (quality) |
//! | Encode → PNG | `image::codecs::png::PngEncoder` (lossless) |
//! | Encode → WebP | `webp::Encoder` (lossy, quality) |
//! | Capture dates | `kamadak-exif` via [`exif_reader`](super::exif_reader) |
//!
//! ## Decoding limits
//!
//! Originals come from a single trusted operator, so decoder allocation
//! limits are switched off: a 100-megapixel panorama must decode, not fail.
//! Deployments that accept untrusted uploads should set a pixel ceiling with
//! [`RustBackend::with_pixel_limit`], which rejects oversized sources from
//! their header before any pixel buffer is allocated.

use super::backend::{BackendError, CaptureDates, Dimensions, ImageBackend};
use super::calculations::{fit_inside, fit_width};
use super::params::{OutputFormat, RenderParams, ThumbnailParams};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageReader};
use std::path::Path;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
#[derive(Debug, Clone, Default)]
pub struct RustBackend {
    max_pixels: Option<u64>,
}

impl RustBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject sources whose `width * height` exceeds `max_pixels`.
    /// `None` keeps decoding unbounded.
    pub fn with_pixel_limit(max_pixels: Option<u64>) -> Self {
        Self { max_pixels }
    }

    /// Load and decode an image from disk.
    fn load_image(&self, path: &Path) -> Result<DynamicImage, BackendError> {
        if let Some(limit) = self.max_pixels {
            let dims = self.identify(path)?;
            let pixels = dims.width as u64 * dims.height as u64;
            if pixels > limit {
                return Err(BackendError::PixelLimit {
                    path: path.to_path_buf(),
                    pixels,
                    limit,
                });
            }
        }

        let mut reader = ImageReader::open(path)?.with_guessed_format()?;
        reader.no_limits();
        reader.decode().map_err(|e| BackendError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// Largest width or height libwebp can encode.
const WEBP_MAX_DIMENSION: u32 = 16383;

/// Encode an image into memory in the requested format.
fn encode(img: &DynamicImage, format: OutputFormat, quality: u32) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    match format {
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel.
            let rgb = img.to_rgb8();
            JpegEncoder::new_with_quality(&mut buf, quality as u8)
                .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
                .map_err(|e| BackendError::Encode(format!("JPEG: {e}")))?;
        }
        OutputFormat::Png => {
            img.write_with_encoder(PngEncoder::new(&mut buf))
                .map_err(|e| BackendError::Encode(format!("PNG: {e}")))?;
        }
        OutputFormat::WebP => {
            if img.width() > WEBP_MAX_DIMENSION || img.height() > WEBP_MAX_DIMENSION {
                return Err(BackendError::Encode(format!(
                    "WebP: {}x{} exceeds the {WEBP_MAX_DIMENSION} pixel side limit",
                    img.width(),
                    img.height()
                )));
            }
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            let encoder = webp::Encoder::from_image(&rgba)
                .map_err(|e| BackendError::Encode(format!("WebP: {e}")))?;
            let memory = encoder
                .encode_simple(false, quality as f32)
                .map_err(|e| BackendError::Encode(format!("WebP: {e:?}")))?;
            buf.extend_from_slice(&memory);
        }
    }
    Ok(buf)
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let (width, height) = ImageReader::open(path)?
            .with_guessed_format()?
            .into_dimensions()
            .map_err(|e| BackendError::Decode {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        Ok(Dimensions { width, height })
    }

    fn read_capture_dates(&self, path: &Path) -> CaptureDates {
        super::exif_reader::read_capture_dates(path)
    }

    fn render(&self, params: &RenderParams) -> Result<Vec<u8>, BackendError> {
        let img = load_image_checked(self, &params.source)?;
        let (w, h) = fit_width((img.width(), img.height()), params.width);
        let resized = if (w, h) == (img.width(), img.height()) {
            img
        } else {
            img.resize_exact(w, h, FilterType::Lanczos3)
        };
        encode(&resized, params.format, params.quality.value())
    }

    fn thumbnail(&self, params: &ThumbnailParams) -> Result<(), BackendError> {
        let img = load_image_checked(self, &params.source)?;
        let (w, h) = fit_inside(
            (img.width(), img.height()),
            (params.max_width, params.max_height),
        );
        let resized = if (w, h) == (img.width(), img.height()) {
            img
        } else {
            img.resize_exact(w, h, FilterType::Lanczos3)
        };
        let bytes = encode(&resized, OutputFormat::WebP, params.quality.value())?;

        crate::cache::write_atomic(&params.output, &bytes)?;
        Ok(())
    }
}

fn load_image_checked(backend: &RustBackend, path: &Path) -> Result<DynamicImage, BackendError> {
    let img = backend.load_image(path)?;
    if img.width() == 0 || img.height() == 0 {
        return Err(BackendError::Decode {
            path: path.to_path_buf(),
            reason: "image has no pixels".into(),
        });
    }
    Ok(img)
}
