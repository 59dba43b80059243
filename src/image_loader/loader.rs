use crate::errors::{AdjustError, Result};
use image::{DynamicImage, RgbaImage};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Largest file we attempt to decode.
const MAX_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Largest decoded image, in megapixels.
const MAX_MEGAPIXELS: u64 = 100;

static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Whether the decoded pixels may be read back after drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelAccess {
    Readable,
    /// Displayable, but reading pixels back is refused (protected or foreign content)
    Restricted,
}

#[derive(Debug)]
struct SourceInner {
    id: u64,
    pixels: Option<RgbaImage>,
    access: PixelAccess,
}

/// A decoded source image handle.
///
/// Cloning is cheap and clones share identity; the GPU renderer uses that
/// identity to decide whether its texture is stale.
#[derive(Debug, Clone)]
pub struct SourceImage {
    inner: Arc<SourceInner>,
}

impl SourceImage {
    fn from_parts(pixels: Option<RgbaImage>, access: PixelAccess) -> Self {
        Self {
            inner: Arc::new(SourceInner {
                id: NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed),
                pixels,
                access,
            }),
        }
    }

    /// An image whose decode has not finished; natural size is 0x0.
    pub fn pending() -> Self {
        Self::from_parts(None, PixelAccess::Readable)
    }

    pub fn from_rgba(pixels: RgbaImage) -> Self {
        Self::from_parts(Some(pixels), PixelAccess::Readable)
    }

    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self::from_rgba(image.into_rgba8())
    }

    pub fn with_access(pixels: RgbaImage, access: PixelAccess) -> Self {
        Self::from_parts(Some(pixels), access)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| AdjustError::DecodingError { message: e.to_string() })?;
        check_dimensions(&image, None)?;
        Ok(Self::from_dynamic(image))
    }

    pub fn open(path: &Path) -> Result<Self> {
        load_image(path).map(Self::from_dynamic)
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Reference identity, not pixel equality.
    pub fn same_image(&self, other: &SourceImage) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn natural_width(&self) -> u32 {
        self.inner.pixels.as_ref().map_or(0, |p| p.width())
    }

    pub fn natural_height(&self) -> u32 {
        self.inner.pixels.as_ref().map_or(0, |p| p.height())
    }

    pub fn is_ready(&self) -> bool {
        self.natural_width() > 0 && self.natural_height() > 0
    }

    pub fn access(&self) -> PixelAccess {
        self.inner.access
    }

    /// Height that keeps the aspect ratio at `width`, or `None` while not ready.
    pub fn height_for_width(&self, width: u32) -> Option<u32> {
        if !self.is_ready() {
            return None;
        }
        let h = (self.natural_height() as f64 * width as f64 / self.natural_width() as f64).round();
        Some((h as u32).max(1))
    }

    pub(crate) fn pixels(&self) -> Result<&RgbaImage> {
        match &self.inner.pixels {
            Some(p) if p.width() > 0 && p.height() > 0 => Ok(p),
            _ => Err(AdjustError::NotReady),
        }
    }
}

pub fn load_image(path: &Path) -> Result<DynamicImage> {
    if !path.exists() {
        return Err(AdjustError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    // Check file size to prevent loading extremely large images that could cause crashes
    if let Ok(metadata) = std::fs::metadata(path) {
        let file_size = metadata.len();
        if file_size > MAX_FILE_SIZE {
            return Err(AdjustError::ImageLoadError {
                path: path.to_path_buf(),
                message: format!(
                    "File too large: {}MB (max {}MB)",
                    file_size / (1024 * 1024),
                    MAX_FILE_SIZE / (1024 * 1024)
                ),
            });
        }
    }

    let image = image::open(path).map_err(|e| AdjustError::ImageLoadError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    check_dimensions(&image, Some(path))?;
    log::debug!("Loaded {} ({}x{})", path.display(), image.width(), image.height());
    Ok(image)
}

fn check_dimensions(image: &DynamicImage, path: Option<&Path>) -> Result<()> {
    let megapixels = (image.width() as u64 * image.height() as u64) / 1_000_000;
    if megapixels <= MAX_MEGAPIXELS {
        return Ok(());
    }
    let message = format!("Image too large: {}MP (max {}MP)", megapixels, MAX_MEGAPIXELS);
    Err(match path {
        Some(path) => AdjustError::ImageLoadError { path: path.to_path_buf(), message },
        None => AdjustError::DecodingError { message },
    })
}
