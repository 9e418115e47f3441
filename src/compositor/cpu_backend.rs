// SPDX-License-Identifier: GPL-3.0-only

//! CPU reference backend (fallback when no GPU is available)
//!
//! Runs the same two passes as `compositor.wgsl` over RGBA8 frames.

use super::backend::RenderBackend;
use super::beauty;
use super::frame::CameraFrame;
use super::tone::{self, Rgb};
use crate::errors::{PipelineError, PipelineResult};
use crate::shaders::{FrameUniforms, UniformSink};
use tracing::debug;

#[derive(Debug, Default)]
pub struct CpuBackend {
    initialized: bool,
    uniforms: Option<FrameUniforms>,
    /// Intermediate toned image, reused across frames
    toned: Vec<Rgb>,
    alpha: Vec<f32>,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn tone_pass(&mut self, frame: &CameraFrame, u: &FrameUniforms) {
        let width = frame.width;
        let height = frame.height;
        let pixels = width as usize * height as usize;
        self.toned.resize(pixels, [0.0; 3]);
        self.alpha.resize(pixels, 0.0);

        let (w, h) = (width as f32, height as f32);
        for y in 0..height {
            for x in 0..width {
                let uv = [(x as f32 + 0.5) / w, (y as f32 + 0.5) / h];
                // Parallax: shift the sampling position, clamp inside the texture
                let su = (uv[0] + u.parallax[0]).clamp(0.0, 1.0);
                let sv = (uv[1] + u.parallax[1]).clamp(0.0, 1.0);
                let sx = ((su * w).floor() as i64).clamp(0, width as i64 - 1) as usize;
                let sy = ((sv * h).floor() as i64).clamp(0, height as i64 - 1) as usize;

                let src = (sy * width as usize + sx) * 4;
                let texel = &frame.data[src..src + 4];
                let color = [
                    f32::from(texel[0]) / 255.0,
                    f32::from(texel[1]) / 255.0,
                    f32::from(texel[2]) / 255.0,
                ];

                let i = y as usize * width as usize + x as usize;
                self.toned[i] = tone::apply_tone(color, u, uv);
                self.alpha[i] = f32::from(texel[3]) / 255.0;
            }
        }
    }

    fn beauty_pass(&self, width: u32, height: u32, u: &FrameUniforms) -> Vec<u8> {
        let active = beauty::is_active(u);
        let mut output = Vec::with_capacity(self.toned.len() * 4);
        for y in 0..height {
            for x in 0..width {
                let i = y as usize * width as usize + x as usize;
                let c = if active {
                    beauty::apply_beauty(&self.toned, width, height, x, y, u)
                } else {
                    self.toned[i]
                };
                output.extend_from_slice(&[
                    to_unorm8(c[0]),
                    to_unorm8(c[1]),
                    to_unorm8(c[2]),
                    to_unorm8(self.alpha[i]),
                ]);
            }
        }
        output
    }
}

#[inline]
fn to_unorm8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

impl UniformSink for CpuBackend {
    fn upload_uniforms(&mut self, uniforms: &FrameUniforms) {
        self.uniforms = Some(*uniforms);
    }
}

impl RenderBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn initialize(&mut self) -> PipelineResult<()> {
        debug!("CPU compositor ready");
        self.initialized = true;
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        debug!(width, height, "CPU compositor viewport resized");
    }

    fn draw(&mut self, frame: &CameraFrame) -> PipelineResult<Vec<u8>> {
        if !self.initialized {
            return Err(PipelineError::InvalidState(
                "CPU compositor used before initialize".to_string(),
            ));
        }
        frame.check_layout()?;

        let uniforms = match self.uniforms {
            Some(u) if !u.is_passthrough() => u,
            _ => return Ok(frame.data.to_vec()),
        };

        self.tone_pass(frame, &uniforms);
        Ok(self.beauty_pass(frame.width, frame.height, &uniforms))
    }

    fn release(&mut self) {
        self.initialized = false;
        self.uniforms = None;
        self.toned = Vec::new();
        self.alpha = Vec::new();
    }
}
