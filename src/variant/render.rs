//! Variant rendering.
//!
//! Rendering turns the bytes of an original into the bytes of a variant:
//! decode, resize according to the fit mode, apply color operations, encode in
//! the requested format. It is CPU-bound and synchronous; see
//! [`TransformPool`](super::TransformPool) for how it is run off the async
//! executor.
//!
//! # Fit modes
//!
//! For a source of `sw x sh` and a target box of `W x H`:
//!
//! | Mode      | Output size           | Behavior                                   |
//! |-----------|-----------------------|--------------------------------------------|
//! | `fill`    | `W x H`               | Stretch, aspect ratio ignored              |
//! | `inside`  | `<= W x H`            | Scale to fit inside the box                |
//! | `cover`   | `W x H`               | Scale to cover the box, crop the overflow  |
//! | `contain` | `W x H`               | Scale to fit, letterbox with opaque black  |
//! | `outside` | `>= W x H`            | Scale to cover the box, no crop            |
//!
//! # Output formats
//!
//! JPEG honours the requested quality. PNG is lossless and ignores it. WebP is
//! written losslessly (the only WebP encoder available to us) so quality is
//! ignored there too. Any other extension the image crate can write is encoded
//! in that format; anything else falls back to PNG.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};

use crate::error::VariantError;

use super::params::{FitMode, VariantParams, DEFAULT_MAX_DIMENSION};

/// Resampling filter used for every resize.
const FILTER: FilterType = FilterType::Lanczos3;

/// Letterbox color for `contain`.
const CONTAIN_BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);

// =============================================================================
// Renderer Trait
// =============================================================================

/// Turns original bytes into variant bytes.
///
/// Implementations are called from blocking worker threads and must be
/// shareable between them.
pub trait VariantRenderer: Send + Sync + 'static {
    /// Render `params` from the original `source`.
    fn render(&self, source: &[u8], params: &VariantParams) -> Result<Bytes, VariantError>;
}

// =============================================================================
// Image Renderer
// =============================================================================

/// [`VariantRenderer`] backed by the `image` crate.
#[derive(Debug, Clone)]
pub struct ImageRenderer {
    max_dimension: u32,
}

impl Default for ImageRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageRenderer {
    /// Create a new renderer.
    pub fn new() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }

    /// Set the largest width or height a resize may produce.
    ///
    /// Only `outside` can exceed the requested box, so this bounds it.
    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension.max(1);
        self
    }

    /// The largest width or height a resize may produce.
    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }
}

impl VariantRenderer for ImageRenderer {
    fn render(&self, source: &[u8], params: &VariantParams) -> Result<Bytes, VariantError> {
        let img = image::load_from_memory(source).map_err(|e| VariantError::DecodeError {
            message: e.to_string(),
        })?;

        let img = resize(img, params.width, params.height, params.fit, self.max_dimension)?;
        let img = adjust(img, params);
        encode(&img, &params.extension, params.quality)
    }
}

/// Resize `img` into the `width x height` box according to `fit`.
///
/// Normalized parameters always carry both dimensions or neither; without a
/// box the image keeps its natural size. An `outside` size with either side
/// above `max_dimension` is rejected before any pixel buffer is allocated.
fn resize(
    img: DynamicImage,
    width: Option<u32>,
    height: Option<u32>,
    fit: FitMode,
    max_dimension: u32,
) -> Result<DynamicImage, VariantError> {
    let (Some(w), Some(h)) = (width, height) else {
        return Ok(img);
    };

    let resized = match fit {
        FitMode::Fill => img.resize_exact(w, h, FILTER),
        FitMode::Inside => img.resize(w, h, FILTER),
        FitMode::Cover => img.resize_to_fill(w, h, FILTER),
        FitMode::Contain => {
            let inner = img.resize(w, h, FILTER);
            let mut canvas = RgbaImage::from_pixel(w, h, CONTAIN_BACKGROUND);
            let x = (w - inner.width()) / 2;
            let y = (h - inner.height()) / 2;
            imageops::overlay(&mut canvas, &inner.to_rgba8(), i64::from(x), i64::from(y));
            DynamicImage::ImageRgba8(canvas)
        }
        FitMode::Outside => {
            let (tw, th) = outside_dimensions(img.dimensions(), (w, h));
            if tw > max_dimension || th > max_dimension {
                return Err(VariantError::invalid(
                    "f",
                    format!(
                        "outside fit of {}x{} into {}x{} gives {}x{}, above the maximum of {}",
                        img.width(),
                        img.height(),
                        w,
                        h,
                        tw,
                        th,
                        max_dimension
                    ),
                ));
            }
            img.resize_exact(tw, th, FILTER)
        }
    };
    Ok(resized)
}

/// Smallest aspect-preserving size that covers `target`.
///
/// Saturates at `u32::MAX` for extreme aspect ratios.
pub fn outside_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (sw, sh) = (f64::from(source.0.max(1)), f64::from(source.1.max(1)));
    let (tw, th) = (f64::from(target.0), f64::from(target.1));
    let scale = (tw / sw).max(th / sh);
    let scaled = |v: f64| ((v * scale).round().min(f64::from(u32::MAX)) as u32).max(1);
    (scaled(sw), scaled(sh))
}

/// Apply grayscale, invert and blur, in that order.
fn adjust(img: DynamicImage, params: &VariantParams) -> DynamicImage {
    let mut img = if params.grayscale > 0.0 {
        img.grayscale()
    } else {
        img
    };
    if params.invert {
        img.invert();
    }
    match params.blur {
        Some(sigma) => img.blur(sigma as f32),
        None => img,
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// The format a variant with `extension` is encoded in.
pub fn output_format(extension: &str) -> ImageFormat {
    ImageFormat::from_extension(extension)
        .filter(ImageFormat::writing_enabled)
        .unwrap_or(ImageFormat::Png)
}

/// MIME type of a rendered variant with `extension`.
///
/// This is the type of the bytes actually written, not a literal
/// `image/{ext}`: `jpg` reports `image/jpeg`, and an extension that falls back
/// to PNG reports `image/png`.
pub fn variant_content_type(extension: &str) -> &'static str {
    output_format(extension).to_mime_type()
}

/// MIME type of an original served as-is.
///
/// Unknown extensions are reported as `image/{ext}`.
pub fn original_content_type(extension: &str) -> String {
    match ImageFormat::from_extension(extension) {
        Some(format) => format.to_mime_type().to_string(),
        None => format!("image/{}", extension.to_ascii_lowercase()),
    }
}

/// Encode `img` for `extension` at `quality`.
pub fn encode(img: &DynamicImage, extension: &str, quality: u8) -> Result<Bytes, VariantError> {
    let mut output = Vec::new();

    let result = match output_format(extension) {
        ImageFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut output, quality);
            match img {
                DynamicImage::ImageLuma8(_) => img.write_with_encoder(encoder),
                _ => DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder),
            }
        }
        ImageFormat::Png => img.write_with_encoder(PngEncoder::new(&mut output)),
        ImageFormat::WebP => DynamicImage::ImageRgba8(img.to_rgba8())
            .write_with_encoder(WebPEncoder::new_lossless(&mut output)),
        other => DynamicImage::ImageRgba8(img.to_rgba8()).write_to(&mut Cursor::new(&mut output), other),
    };

    result.map_err(|e| VariantError::EncodeError {
        message: e.to_string(),
    })?;
    Ok(Bytes::from(output))
}

// =============================================================================
// Tests
// =============================================================================
