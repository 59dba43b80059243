use super::types::GpuContext;
use crate::errors::AdjustError;
use anyhow::{anyhow, Result};
use std::sync::Arc;

impl GpuContext {
    pub async fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow!("No suitable GPU adapter found"))?;

        let adapter_info = adapter.get_info();

        // A plain textured quad needs nothing past the downlevel baseline
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("adjust_engine_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        log::info!("GPU initialized: {} ({})", adapter_info.name, adapter_info.backend.to_str());

        Ok(Self {
            device,
            queue,
            adapter_info,
        })
    }

    /// Blocking constructor used by the engine.
    pub fn create() -> crate::errors::Result<Arc<Self>> {
        pollster::block_on(Self::new())
            .map(Arc::new)
            .map_err(|e| AdjustError::GpuUnavailable { message: format!("{:#}", e) })
    }

    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }
}
