use crate::errors::{AdjustError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbaImage};
use serde::{Deserialize, Serialize};

pub const DEFAULT_QUALITY: f32 = 0.92;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
    /// Lossless only; quality is ignored
    WebP,
}

impl OutputFormat {
    pub fn mime(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
        }
    }

    pub fn from_mime(mime: &str) -> Result<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Ok(OutputFormat::Jpeg),
            "image/png" => Ok(OutputFormat::Png),
            "image/webp" => Ok(OutputFormat::WebP),
            _ => Err(AdjustError::UnsupportedFormat { mime: mime.to_string() }),
        }
    }
}

/// Output mime type plus a 0..1 quality for lossy formats.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutputEncoding {
    pub format: OutputFormat,
    pub quality: f32,
}

impl Default for OutputEncoding {
    fn default() -> Self {
        Self { format: OutputFormat::Jpeg, quality: DEFAULT_QUALITY }
    }
}

impl OutputEncoding {
    pub fn new(format: OutputFormat, quality: f32) -> Self {
        Self { format, quality }
    }

    pub fn from_mime(mime: &str, quality: f32) -> Result<Self> {
        Ok(Self::new(OutputFormat::from_mime(mime)?, quality))
    }

    /// JPEG quality on the encoder's 1..=100 scale.
    fn jpeg_quality(&self) -> u8 {
        let q = if self.quality.is_finite() { self.quality } else { DEFAULT_QUALITY };
        (q.clamp(0.0, 1.0) * 100.0).round().max(1.0) as u8
    }
}

/// An encoded image blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime: &'static str,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

pub fn encode_rgba(image: &RgbaImage, encoding: &OutputEncoding) -> Result<EncodedImage> {
    let (width, height) = image.dimensions();
    let mime = encoding.format.mime();
    let mut bytes = Vec::new();

    let result = match encoding.format {
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgba8(image.clone()).into_rgb8();
            JpegEncoder::new_with_quality(&mut bytes, encoding.jpeg_quality()).write_image(
                rgb.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            )
        }
        OutputFormat::Png => PngEncoder::new(&mut bytes).write_image(
            image.as_raw(),
            width,
            height,
            ExtendedColorType::Rgba8,
        ),
        OutputFormat::WebP => WebPEncoder::new_lossless(&mut bytes).write_image(
            image.as_raw(),
            width,
            height,
            ExtendedColorType::Rgba8,
        ),
    };

    result.map_err(|e| AdjustError::EncodeError { mime: mime.to_string(), message: e.to_string() })?;

    Ok(EncodedImage { mime, width, height, bytes })
}
