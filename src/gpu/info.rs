use super::types::{GpuContext, GpuPerformanceInfo};

impl GpuContext {
    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    /// Get GPU information
    pub fn get_performance_info(&self) -> GpuPerformanceInfo {
        GpuPerformanceInfo {
            adapter_name: self.adapter_info.name.clone(),
            backend: self.adapter_info.backend.to_str().to_string(),
            device_type: match self.adapter_info.device_type {
                wgpu::DeviceType::DiscreteGpu => "Discrete GPU".to_string(),
                wgpu::DeviceType::IntegratedGpu => "Integrated GPU".to_string(),
                wgpu::DeviceType::VirtualGpu => "Virtual GPU".to_string(),
                wgpu::DeviceType::Cpu => "CPU".to_string(),
                _ => "Unknown".to_string(),
            },
            max_texture_dimension: self.max_texture_dimension(),
        }
    }
}
