// SPDX-License-Identifier: GPL-3.0-only

//! wgpu device setup and buffer readback for the compositor

use crate::errors::{PipelineError, PipelineResult};
use std::sync::Arc;
use tracing::{debug, info};

pub use wgpu;

/// Adapter the context was created on
#[derive(Debug, Clone)]
pub struct GpuDeviceInfo {
    pub adapter_name: String,
    pub backend: wgpu::Backend,
    /// Software rasterizer (llvmpipe, SwiftShader)
    pub software: bool,
}

/// Device and queue shared by the compositor passes
#[derive(Debug, Clone)]
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub info: GpuDeviceInfo,
}

impl GpuContext {
    /// Open a Vulkan device for compute work
    ///
    /// Software adapters are refused unless `allow_software` is set: on a
    /// phone they are slower than the CPU compositor.
    pub async fn create(label: &str, allow_software: bool) -> PipelineResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::VULKAN,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| PipelineError::Gpu(format!("no suitable adapter: {}", e)))?;

        let adapter_info = adapter.get_info();
        let software = adapter_info.device_type == wgpu::DeviceType::Cpu;
        if software && !allow_software {
            return Err(PipelineError::Gpu(format!(
                "only a software adapter is available ({})",
                adapter_info.name
            )));
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some(label),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await
            .map_err(|e| PipelineError::Gpu(format!("device request failed: {}", e)))?;

        info!(
            label,
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            device_type = ?adapter_info.device_type,
            "GPU device created"
        );

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            info: GpuDeviceInfo {
                adapter_name: adapter_info.name,
                backend: adapter_info.backend,
                software,
            },
        })
    }

    /// Copy a MAP_READ buffer back to host memory, waiting for the GPU
    pub async fn read_back(&self, buffer: &wgpu::Buffer) -> PipelineResult<Vec<u8>> {
        let slice = buffer.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        // Blocks until the submitted passes and the map have completed
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| PipelineError::Gpu(format!("device poll failed: {:?}", e)))?;

        receiver
            .await
            .map_err(|_| PipelineError::Gpu("buffer map callback dropped".to_string()))?
            .map_err(|e| PipelineError::Gpu(format!("buffer map failed: {:?}", e)))?;

        let bytes = slice.get_mapped_range().to_vec();
        buffer.unmap();
        debug!(bytes = bytes.len(), "Read back GPU buffer");
        Ok(bytes)
    }

    /// Wait for all submitted work, used before freeing resources
    pub fn wait_idle(&self) {
        if let Err(e) = self.device.poll(wgpu::PollType::wait_indefinitely()) {
            debug!(error = ?e, "Device poll failed while waiting for idle");
        }
    }
}
