use super::pipelines::SURFACE_FORMAT;
use super::types::GpuContext;
use crate::errors::{AdjustError, Result};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(u64);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// Backing pixel size for a logical size at a device pixel ratio.
pub fn backing_size(width: u32, height: u32, dpr: f32) -> (u32, u32) {
    let dpr = if dpr.is_finite() && dpr > 0.0 { dpr } else { 1.0 };
    (
        (width as f32 * dpr).round() as u32,
        (height as f32 * dpr).round() as u32,
    )
}

/// An offscreen render target with a logical size and a device pixel ratio.
#[derive(Debug)]
pub struct DrawingSurface {
    id: SurfaceId,
    logical: (u32, u32),
    dpr: f32,
    backing: (u32, u32),
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DrawingSurface {
    pub fn new(ctx: &GpuContext, width: u32, height: u32, dpr: f32) -> Result<Self> {
        let backing = backing_size(width, height, dpr);
        let (texture, view) = Self::allocate(ctx, backing)?;
        Ok(Self {
            id: SurfaceId(NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed)),
            logical: (width, height),
            dpr,
            backing,
            texture,
            view,
        })
    }

    fn allocate(ctx: &GpuContext, (width, height): (u32, u32)) -> Result<(wgpu::Texture, wgpu::TextureView)> {
        let limit = ctx.max_texture_dimension();
        if width == 0 || height == 0 || width > limit || height > limit {
            return Err(AdjustError::SurfaceUnavailable {
                message: format!("{}x{} backing size outside 1..={}", width, height, limit),
            });
        }

        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("drawing_surface"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SURFACE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok((texture, view))
    }

    /// Returns `false` without touching the texture when the backing size is
    /// unchanged; the logical size and ratio are still updated.
    pub fn resize(&mut self, ctx: &GpuContext, width: u32, height: u32, dpr: f32) -> Result<bool> {
        let backing = backing_size(width, height, dpr);
        if backing == self.backing {
            self.logical = (width, height);
            self.dpr = dpr;
            return Ok(false);
        }
        let (texture, view) = Self::allocate(ctx, backing)?;
        self.texture.destroy();
        self.texture = texture;
        self.view = view;
        self.logical = (width, height);
        self.dpr = dpr;
        self.backing = backing;
        Ok(true)
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn logical_size(&self) -> (u32, u32) {
        self.logical
    }

    pub fn device_pixel_ratio(&self) -> f32 {
        self.dpr
    }

    pub fn backing_size(&self) -> (u32, u32) {
        self.backing
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub(crate) fn destroy(&self) {
        self.texture.destroy();
    }
}
