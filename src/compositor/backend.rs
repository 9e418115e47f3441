// SPDX-License-Identifier: GPL-3.0-only

//! Render backends
//!
//! A backend owns every GPU (or CPU) resource the compositor uses. The
//! compositor only talks to it through [`RenderBackend`].

use super::frame::CameraFrame;
use crate::config::BackendPreference;
use crate::errors::PipelineResult;
use crate::shaders::UniformSink;

/// Resource owner and executor for the compositing passes
pub trait RenderBackend: UniformSink + Send {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Acquire the device and compile shader programs
    ///
    /// Compile failures return [`PipelineError::Shader`](crate::errors::PipelineError::Shader)
    /// carrying the compiler log.
    fn initialize(&mut self) -> PipelineResult<()>;

    /// Viewport size changed
    fn resize(&mut self, width: u32, height: u32);

    /// Run parallax, tone and beauty over `frame` with the last uploaded
    /// uniforms; returns packed RGBA8
    fn draw(&mut self, frame: &CameraFrame) -> PipelineResult<Vec<u8>>;

    /// Free every resource now. The backend may be initialized again later.
    fn release(&mut self);
}

/// Build the backend for a preference
///
/// `Auto` uses the GPU when a device can be created and the CPU reference
/// otherwise.
pub fn create_backend(preference: BackendPreference) -> Box<dyn RenderBackend> {
    match preference {
        BackendPreference::Cpu => Box::new(super::cpu_backend::CpuBackend::new()),
        #[cfg(feature = "gpu")]
        BackendPreference::Gpu => Box::new(crate::shaders::GpuCompositor::new(true)),
        #[cfg(feature = "gpu")]
        BackendPreference::Auto => {
            // A software adapter would be slower than the CPU path
            let mut gpu = crate::shaders::GpuCompositor::new(false);
            match gpu.acquire_device() {
                Ok(()) => Box::new(gpu),
                Err(e) => {
                    tracing::info!(error = %e, "No usable GPU, using CPU compositor");
                    Box::new(super::cpu_backend::CpuBackend::new())
                }
            }
        }
        #[cfg(not(feature = "gpu"))]
        BackendPreference::Gpu | BackendPreference::Auto => {
            if preference == BackendPreference::Gpu {
                tracing::warn!("Built without GPU support, using CPU compositor");
            }
            Box::new(super::cpu_backend::CpuBackend::new())
        }
    }
}
