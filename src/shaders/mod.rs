// SPDX-License-Identifier: GPL-3.0-only
//! Compositor shader and uniform marshaling
//!
//! `compositor.wgsl` is the single source of the GPU compositing math; the
//! CPU backend in `crate::compositor` mirrors it. Every backend receives its
//! per-frame parameters as one [`FrameUniforms`] block.

pub mod uniforms;

#[cfg(feature = "gpu")]
mod gpu_compositor;

#[cfg(feature = "gpu")]
pub use gpu_compositor::GpuCompositor;
pub use uniforms::{FLAG_PASSTHROUGH, FrameUniforms, UniformBatcher, UniformSink};

/// WGSL source of the compositor, for hosts that compile it themselves
pub const COMPOSITOR_WGSL: &str = include_str!("compositor.wgsl");

/// Compute entry points in [`COMPOSITOR_WGSL`], in dispatch order
pub const ENTRY_POINTS: [&str; 2] = ["tone_main", "beauty_main"];
