// SPDX-License-Identifier: GPL-3.0-only

//! Per-frame uniform block shared by every compositor backend
//!
//! The layout matches `FrameUniforms` in `compositor.wgsl` field for field
//! (std140-compatible: every row is 16 bytes).

use crate::config::CompositorConfig;
use crate::params::{ChannelId, ParameterVector};
use crate::sensors::Tilt;

/// Skip parallax, tone and beauty; copy the camera frame through
pub const FLAG_PASSTHROUGH: u32 = 1;

/// Compositor uniforms
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniforms {
    pub width: u32,
    pub height: u32,
    pub flags: u32,
    pub _pad0: u32,

    /// UV offset from tilt * parallax strength
    pub parallax: [f32; 2],
    pub edge_sensitivity: f32,
    pub blur_radius: f32,

    pub brightness: f32,
    pub contrast: f32,
    pub highlights: f32,
    pub shadows: f32,

    pub saturation: f32,
    pub vibrance: f32,
    pub hue: f32,
    pub color_intensity: f32,

    pub temperature: f32,
    pub tint: f32,
    pub vignette: f32,
    pub _pad1: f32,

    pub beauty_weight: f32,
    pub smoothing: f32,
    pub whitening: f32,
    pub redness: f32,

    /// Per-channel grade; the fourth lane is unused
    pub lift: [f32; 4],
    pub gamma: [f32; 4],
    pub gain: [f32; 4],
}

impl FrameUniforms {
    /// Pack one frame's parameters
    pub fn from_parameters(
        params: &ParameterVector,
        tilt: Tilt,
        config: &CompositorConfig,
        width: u32,
        height: u32,
    ) -> Self {
        let p = |c: ChannelId| params.get(c);
        Self {
            width,
            height,
            flags: 0,
            _pad0: 0,
            parallax: [
                tilt.x * config.parallax_strength,
                tilt.y * config.parallax_strength,
            ],
            edge_sensitivity: config.edge_sensitivity,
            blur_radius: config.blur_radius,
            brightness: p(ChannelId::Brightness),
            contrast: p(ChannelId::Contrast),
            highlights: p(ChannelId::Highlights),
            shadows: p(ChannelId::Shadows),
            saturation: p(ChannelId::Saturation),
            vibrance: p(ChannelId::Vibrance),
            hue: p(ChannelId::Hue),
            color_intensity: p(ChannelId::ColorIntensity),
            temperature: p(ChannelId::Temperature),
            tint: p(ChannelId::Tint),
            vignette: p(ChannelId::Vignette),
            _pad1: 0.0,
            beauty_weight: p(ChannelId::Beauty),
            smoothing: p(ChannelId::Smoothing),
            whitening: p(ChannelId::Whitening),
            redness: p(ChannelId::Redness),
            lift: [
                p(ChannelId::LiftR),
                p(ChannelId::LiftG),
                p(ChannelId::LiftB),
                0.0,
            ],
            gamma: [
                p(ChannelId::GammaR),
                p(ChannelId::GammaG),
                p(ChannelId::GammaB),
                0.0,
            ],
            gain: [
                p(ChannelId::GainR),
                p(ChannelId::GainG),
                p(ChannelId::GainB),
                0.0,
            ],
        }
    }

    /// Uniforms that copy the frame through untouched
    pub fn passthrough(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            flags: FLAG_PASSTHROUGH,
            ..bytemuck::Zeroable::zeroed()
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.flags & FLAG_PASSTHROUGH != 0
    }
}

/// Destination for uniform uploads
pub trait UniformSink {
    fn upload_uniforms(&mut self, uniforms: &FrameUniforms);
}

/// Tracks the last uploaded block so unchanged frames skip the upload
#[derive(Debug, Default)]
pub struct UniformBatcher {
    last: Option<FrameUniforms>,
    uploads: u64,
}

impl UniformBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upload `uniforms` if they differ from the last upload
    ///
    /// Compares raw bytes, so a NaN-free block that is bit-identical to the
    /// previous one is never re-sent. Returns whether an upload happened.
    pub fn submit<S: UniformSink + ?Sized>(&mut self, uniforms: &FrameUniforms, sink: &mut S) -> bool {
        let unchanged = self
            .last
            .as_ref()
            .is_some_and(|last| bytemuck::bytes_of(last) == bytemuck::bytes_of(uniforms));
        if unchanged {
            return false;
        }
        sink.upload_uniforms(uniforms);
        self.last = Some(*uniforms);
        self.uploads += 1;
        true
    }

    /// Force the next `submit` to upload (e.g. after the backend was rebuilt)
    pub fn invalidate(&mut self) {
        self.last = None;
    }

    pub fn upload_count(&self) -> u64 {
        self.uploads
    }
}
