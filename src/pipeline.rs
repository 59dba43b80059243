//! The per-pixel color transform shared by the foreground and background paths.
//!
//! `shaders/adjust.wgsl` implements the same nine steps on the GPU. Any change
//! here has to be mirrored there; `gpu::tests` checks the two stay in parity.

use image::RgbaImage;
use rayon::prelude::*;

use crate::errors::{AdjustError, Result};
use crate::params::AdjustmentParameters;

/// BT.601 luma weights.
pub const LUMA_R: f32 = 0.299;
pub const LUMA_G: f32 = 0.587;
pub const LUMA_B: f32 = 0.114;

/// Damping applied to the highlight and shadow lift amounts.
pub const TONE_DAMPING: f32 = 0.4;

/// Scale of the temperature and tint channel shifts.
pub const COLOR_SHIFT: f32 = 0.2;

/// Interleaved RGBA8, row-major, no row padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = byte_len(width, height);
        if data.len() != expected {
            return Err(AdjustError::InvalidBuffer { expected, actual: data.len() });
        }
        Ok(Self { width, height, data })
    }

    /// A buffer filled with one RGBA value.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data = rgba.repeat(width as usize * height as usize);
        Self { width, height, data }
    }

    pub fn from_rgba_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self { width, height, data: image.into_raw() }
    }

    pub fn into_rgba_image(self) -> RgbaImage {
        // Length was validated on construction
        RgbaImage::from_raw(self.width, self.height, self.data)
            .unwrap_or_else(|| RgbaImage::new(0, 0))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }
}

pub(crate) fn byte_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}

#[inline]
fn luminance(r: f32, g: f32, b: f32) -> f32 {
    LUMA_R * r + LUMA_G * g + LUMA_B * b
}

#[inline]
fn to_byte(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Parameter-derived constants, computed once per buffer.
#[derive(Debug, Clone, Copy)]
struct Kernel {
    exposure_mult: f32,
    contrast: f32,
    highlight_amount: f32,
    shadow_amount: f32,
    temp_shift: f32,
    tint_shift: f32,
    saturation: f32,
    vibrance: f32,
}

impl Kernel {
    fn new(p: &AdjustmentParameters) -> Self {
        Self {
            exposure_mult: 2.0_f32.powf(p.exposure),
            contrast: p.contrast,
            highlight_amount: p.highlights * TONE_DAMPING,
            shadow_amount: p.shadows * TONE_DAMPING,
            temp_shift: p.temp * COLOR_SHIFT,
            tint_shift: p.tint * COLOR_SHIFT,
            saturation: p.saturation,
            vibrance: p.vibrance,
        }
    }

    // f32 to match the shader; against f64 math a rare pixel lands 1 LSB off at rounding
    #[inline]
    fn apply(&self, pixel: &mut [u8]) {
        // Exposure on the byte scale
        let r = pixel[0] as f32 * self.exposure_mult;
        let g = pixel[1] as f32 * self.exposure_mult;
        let b = pixel[2] as f32 * self.exposure_mult;

        // Contrast around mid-gray
        let mut r = (r / 255.0 - 0.5) * self.contrast + 0.5;
        let mut g = (g / 255.0 - 0.5) * self.contrast + 0.5;
        let mut b = (b / 255.0 - 0.5) * self.contrast + 0.5;

        let l = luminance(r, g, b);

        let t_high = ((l - 0.5) * 2.0).max(0.0);
        let high_lift = 1.0 + self.highlight_amount * (1.0 - t_high);
        r *= high_lift;
        g *= high_lift;
        b *= high_lift;

        // Uses the same pre-lift luminance as the highlight region
        let t_low = ((0.5 - l) * 2.0).max(0.0);
        let shadow_lift = 1.0 + self.shadow_amount * (1.0 - t_low);
        r *= shadow_lift;
        g *= shadow_lift;
        b *= shadow_lift;

        r += self.temp_shift;
        b -= self.temp_shift;
        g -= self.tint_shift;

        let l2 = luminance(r, g, b);
        r = l2 + (r - l2) * self.saturation;
        g = l2 + (g - l2) * self.saturation;
        b = l2 + (b - l2) * self.saturation;

        let sat = (r - l2).abs().max((g - l2).abs()).max((b - l2).abs());
        let vib = 1.0 + (self.vibrance - 1.0) * (1.0 - sat);
        r = l2 + (r - l2) * vib;
        g = l2 + (g - l2) * vib;
        b = l2 + (b - l2) * vib;

        pixel[0] = to_byte(r);
        pixel[1] = to_byte(g);
        pixel[2] = to_byte(b);
    }
}

/// Apply every adjustment to `buffer` in place. Alpha is left untouched.
pub fn apply_adjustments(buffer: &mut PixelBuffer, params: &AdjustmentParameters) {
    apply_to_rgba(buffer.as_bytes_mut(), params);
}

/// Same as [`apply_adjustments`] on a raw RGBA8 slice; a trailing partial pixel is ignored.
pub fn apply_to_rgba(data: &mut [u8], params: &AdjustmentParameters) {
    let kernel = Kernel::new(params);
    for pixel in data.chunks_exact_mut(4) {
        kernel.apply(pixel);
    }
}

/// Data-parallel variant of [`apply_adjustments`]. Output is byte-identical.
pub fn apply_adjustments_par(buffer: &mut PixelBuffer, params: &AdjustmentParameters) {
    let kernel = Kernel::new(params);

    // Chunks stay aligned to 4-byte pixel boundaries
    let pixels_per_thread = (buffer.pixel_count() / num_cpus::get()).max(1);
    let bytes_per_chunk = pixels_per_thread * 4;

    buffer
        .as_bytes_mut()
        .par_chunks_mut(bytes_per_chunk)
        .for_each(|chunk| {
            for pixel in chunk.chunks_exact_mut(4) {
                kernel.apply(pixel);
            }
        });
}
