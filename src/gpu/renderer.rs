use std::fmt;
use std::sync::Arc;

use tokio::sync::oneshot;
use wgpu::util::DeviceExt;

use super::pipelines::AdjustPipeline;
use super::surface::{DrawingSurface, SurfaceId};
use super::types::{AdjustUniforms, GpuContext, QUAD_VERTICES};
use crate::errors::{AdjustError, Result};
use crate::image_loader::SourceImage;
use crate::params::AdjustmentParameters;
use crate::pipeline::PixelBuffer;
use crate::profiler::{counters, Profiler};

/// Uploaded copy of the current source image.
struct SourceTexture {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

/// Live preview renderer bound to exactly one [`DrawingSurface`].
///
/// The source texture is re-uploaded only when a different image is set;
/// adjustments are written to the uniform buffer on every draw.
pub struct GpuRenderer {
    ctx: Arc<GpuContext>,
    profiler: Arc<Profiler>,
    surface: DrawingSurface,
    program: AdjustPipeline,
    vertex_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    source: Option<SourceImage>,
    texture: Option<SourceTexture>,
    params: Option<AdjustmentParameters>,
}

impl GpuRenderer {
    pub fn new(ctx: Arc<GpuContext>, profiler: Arc<Profiler>, width: u32, height: u32, dpr: f32) -> Result<Self> {
        let program = AdjustPipeline::new(&ctx)?;
        let surface = DrawingSurface::new(&ctx, width, height, dpr)?;

        let vertex_buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("adjust_quad"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let uniform_buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("adjust_uniforms"),
            contents: bytemuck::cast_slice(&[AdjustUniforms::from(&AdjustmentParameters::NEUTRAL)]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        log::debug!("Created renderer for {} ({}x{} @ {})", surface.id(), width, height, dpr);

        Ok(Self {
            ctx,
            profiler,
            surface,
            program,
            vertex_buffer,
            uniform_buffer,
            source: None,
            texture: None,
            params: None,
        })
    }

    /// Set the image to draw. Uploads only when `image` is a different image
    /// from the current one; a not-yet-decoded image clears the texture.
    /// A failed upload leaves no current image, so setting it again retries.
    pub fn set_image(&mut self, image: Option<&SourceImage>) -> Result<()> {
        let unchanged = match (&self.source, image) {
            (Some(current), Some(image)) => current.same_image(image),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return Ok(());
        }

        self.release_texture();
        // Forget the old image before uploading so a failed upload is retried
        self.source = None;
        if let Some(image) = image.filter(|i| i.is_ready()) {
            self.texture = Some(self.upload(image)?);
        }
        self.source = image.cloned();
        Ok(())
    }

    fn upload(&self, image: &SourceImage) -> Result<SourceTexture> {
        let pixels = image.pixels()?;
        let (width, height) = pixels.dimensions();
        let limit = self.ctx.max_texture_dimension();
        if width > limit || height > limit {
            return Err(AdjustError::GpuError {
                message: format!("{}x{} image exceeds the {}px texture limit", width, height, limit),
            });
        }

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = self.ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("adjust_source"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.ctx.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels.as_raw(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("adjust_bind_group"),
            layout: &self.program.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.program.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
            ],
        });

        self.profiler.increment_counter(counters::TEXTURE_UPLOADS);
        log::trace!("Uploaded {}x{} source texture for {}", width, height, self.surface.id());
        Ok(SourceTexture { texture, bind_group })
    }

    pub fn set_params(&mut self, params: &AdjustmentParameters) {
        self.params = Some(*params);
    }

    /// Resize the surface; `false` when the backing size did not change.
    pub fn set_size(&mut self, width: u32, height: u32, dpr: f32) -> Result<bool> {
        self.surface.resize(&self.ctx, width, height, dpr)
    }

    /// Draw into the owned surface. Returns `false` when there is no image
    /// or no parameters yet.
    pub fn render(&mut self) -> Result<bool> {
        let mut encoder = self.ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("adjust_render"),
        });
        let drawn = self.encode_draw(&mut encoder, self.surface.view(), self.surface.backing_size());
        if drawn {
            self.ctx.queue.submit(Some(encoder.finish()));
            self.profiler.increment_counter(counters::GPU_RENDERS);
        }
        Ok(drawn)
    }

    /// Record the draw into a caller-owned encoder and target, e.g. a host UI's frame.
    pub fn encode_draw(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        viewport: (u32, u32),
    ) -> bool {
        let (Some(texture), Some(params)) = (&self.texture, &self.params) else {
            return false;
        };

        self.ctx.queue.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::cast_slice(&[AdjustUniforms::from(params)]),
        );

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("adjust_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_viewport(0.0, 0.0, viewport.0 as f32, viewport.1 as f32, 0.0, 1.0);
        pass.set_pipeline(&self.program.pipeline);
        pass.set_bind_group(0, &texture.bind_group, &[]);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
        true
    }

    /// Copy the surface back to the CPU at its backing size.
    pub fn read_pixels(&self) -> Result<PixelBuffer> {
        let (width, height) = self.surface.backing_size();
        let unpadded = 4 * width;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let bytes_per_row = unpadded.div_ceil(align) * align;

        let output = self.ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("adjust_readback"),
            size: (bytes_per_row * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("adjust_readback"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: self.surface.texture(),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &output,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.ctx.queue.submit(Some(encoder.finish()));

        let slice = output.slice(..);
        let (tx, rx) = oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        let _ = self.ctx.device.poll(wgpu::Maintain::Wait);

        let mapped = pollster::block_on(rx)
            .map_err(|_| AdjustError::GpuError { message: "readback callback dropped".to_string() })?;
        mapped.map_err(|e| AdjustError::GpuError { message: e.to_string() })?;

        // Strip row padding; the mapped view must drop before unmap
        let data = {
            let view = slice.get_mapped_range();
            let mut data = Vec::with_capacity((unpadded * height) as usize);
            for row in view.chunks(bytes_per_row as usize) {
                data.extend_from_slice(&row[..unpadded as usize]);
            }
            data
        };
        output.unmap();
        output.destroy();

        PixelBuffer::new(width, height, data)
    }

    pub fn surface(&self) -> &DrawingSurface {
        &self.surface
    }

    pub fn surface_id(&self) -> SurfaceId {
        self.surface.id()
    }

    pub fn has_texture(&self) -> bool {
        self.texture.is_some()
    }

    pub fn params(&self) -> Option<&AdjustmentParameters> {
        self.params.as_ref()
    }

    /// Release every GPU resource this renderer owns.
    pub fn destroy(self) {
        log::debug!("Destroying renderer for {}", self.surface.id());
        // Drop does the work
    }

    fn release_texture(&mut self) {
        if let Some(old) = self.texture.take() {
            old.texture.destroy();
        }
    }
}

impl Drop for GpuRenderer {
    fn drop(&mut self) {
        self.release_texture();
        self.vertex_buffer.destroy();
        self.uniform_buffer.destroy();
        self.surface.destroy();
        self.source = None;
        self.params = None;
    }
}

impl fmt::Debug for GpuRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuRenderer")
            .field("surface", &self.surface.id())
            .field("backing_size", &self.surface.backing_size())
            .field("has_texture", &self.has_texture())
            .finish_non_exhaustive()
    }
}
