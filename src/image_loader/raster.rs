use crate::errors::{AdjustError, Result};
use crate::image_loader::encode::{encode_rgba, EncodedImage, OutputEncoding};
use crate::image_loader::loader::{PixelAccess, SourceImage};
use crate::pipeline::PixelBuffer;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Max width when no target is specified.
pub const DEFAULT_MAX_WIDTH: u32 = 1920;

/// Largest raster surface edge we are willing to allocate.
pub const MAX_SURFACE_DIMENSION: u32 = 16384;

/// Optional caller-requested output size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSize {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl TargetSize {
    pub const NATURAL: TargetSize = TargetSize { width: None, height: None };

    pub fn width(width: u32) -> Self {
        Self { width: Some(width), height: None }
    }

    pub fn height(height: u32) -> Self {
        Self { width: None, height: Some(height) }
    }

    pub fn exact(width: u32, height: u32) -> Self {
        Self { width: Some(width), height: Some(height) }
    }

    /// Resolve against a natural size. One given edge derives the other by
    /// aspect ratio; with none given the width is capped at `max_width`.
    /// A zero edge counts as not given.
    pub fn resolve(&self, natural_width: u32, natural_height: u32, max_width: u32) -> (u32, u32) {
        let nw = natural_width as f64;
        let nh = natural_height as f64;
        let derive = |v: f64| (v.round() as u32).max(1);
        let given = |edge: Option<u32>| edge.filter(|&v| v > 0);
        match (given(self.width), given(self.height)) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => (w, derive(nh * w as f64 / nw)),
            (None, Some(h)) => (derive(nw * h as f64 / nh), h),
            (None, None) => {
                let w = natural_width.min(max_width.max(1));
                (w, derive(nh * w as f64 / nw))
            }
        }
    }
}

/// Resampling filter used when drawing the source at the target size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResizeFilter {
    Nearest,
    #[default]
    Triangle,
    CatmullRom,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// An off-screen raster holding a drawn source image.
///
/// Drawing a [`PixelAccess::Restricted`] source marks the surface the same
/// way, after which reading or encoding its pixels is refused.
#[derive(Debug, Clone)]
pub struct RasterSurface {
    image: RgbaImage,
    access: PixelAccess,
}

impl RasterSurface {
    /// Draw `source` into a new surface of `width` x `height`.
    pub fn draw(source: &SourceImage, width: u32, height: u32, filter: ResizeFilter) -> Result<Self> {
        let pixels = source.pixels()?;
        if width == 0 || height == 0 {
            return Err(AdjustError::SurfaceUnavailable {
                message: format!("cannot allocate a {}x{} surface", width, height),
            });
        }
        if width > MAX_SURFACE_DIMENSION || height > MAX_SURFACE_DIMENSION {
            return Err(AdjustError::SurfaceUnavailable {
                message: format!(
                    "{}x{} exceeds the {}px surface limit",
                    width, height, MAX_SURFACE_DIMENSION
                ),
            });
        }

        let image = if pixels.dimensions() == (width, height) {
            pixels.clone()
        } else {
            imageops::resize(pixels, width, height, filter.into())
        };

        Ok(Self { image, access: source.access() })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn is_readable(&self) -> bool {
        self.access == PixelAccess::Readable
    }

    /// The displayable pixels.
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Copy the surface contents out as a [`PixelBuffer`].
    pub fn extract(&self) -> Result<PixelBuffer> {
        self.ensure_readable()?;
        Ok(PixelBuffer::from_rgba_image(self.image.clone()))
    }

    /// Write a buffer back; it must match the surface size.
    pub fn put(&mut self, buffer: PixelBuffer) -> Result<()> {
        if buffer.dimensions() != self.dimensions() {
            let (w, h) = self.dimensions();
            return Err(AdjustError::InvalidBuffer {
                expected: crate::pipeline::byte_len(w, h),
                actual: buffer.as_bytes().len(),
            });
        }
        self.image = buffer.into_rgba_image();
        Ok(())
    }

    pub fn encode(&self, encoding: &OutputEncoding) -> Result<EncodedImage> {
        self.ensure_readable()?;
        encode_rgba(&self.image, encoding)
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    pub(crate) fn ensure_readable(&self) -> Result<()> {
        if self.is_readable() {
            Ok(())
        } else {
            Err(AdjustError::ExtractionDenied {
                message: "surface contains restricted pixels".to_string(),
            })
        }
    }
}
