// SPDX-License-Identifier: GPL-3.0-only

//! Yanbao Camera render core
//!
//! The real-time part of the camera: gyroscope-driven parallax, a 29-channel
//! color and beauty parameter vector, capture-parameter translation for the
//! camera hardware, and the per-frame compositor that ties them together.
//!
//! # Architecture
//!
//! - [`sensors`]: integrates gyroscope samples into a bounded tilt
//! - [`params`]: the parameter vector, presets, persistence and the
//!   copy-on-write store the render thread reads from
//! - [`capture`]: translation to hardware request fields and the
//!   capture-control worker that owns the session
//! - [`compositor`]: the per-frame state machine and render backends
//! - [`shaders`]: the WGSL compositor and its uniform block
//! - [`scene`]: the contract plane and face detectors implement
//! - [`performance`]: frame-time measurement and warmup
//!
//! The host owns every thread except the capture-control worker. Sensor and
//! UI callbacks write, the render thread reads, and nothing on the render
//! thread waits on a writer.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use yanbao_camera::compositor::{CapturingPresenter, FrameCompositor, LatestFrameSlot};
//! use yanbao_camera::{OrientationIntegrator, ParameterStore, PipelineConfig};
//!
//! let config = PipelineConfig::load_or_default();
//! let orientation = Arc::new(OrientationIntegrator::new(config.orientation));
//! let params = ParameterStore::default();
//! let backend = yanbao_camera::compositor::create_backend(config.compositor.backend);
//! let mut compositor = FrameCompositor::new(config.compositor, orientation, &params, backend);
//! compositor.on_surface_created(1920, 1080).unwrap();
//!
//! let camera = LatestFrameSlot::new();
//! let mut presenter = CapturingPresenter::default();
//! compositor.render_frame(&camera, &mut presenter);
//! ```

pub mod capture;
pub mod compositor;
pub mod config;
pub mod constants;
pub mod errors;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod logging;
pub mod params;
pub mod performance;
pub mod scene;
pub mod sensors;
pub mod shaders;

// Re-export commonly used types
pub use capture::{CaptureController, CaptureEvent, CaptureTranslator};
pub use compositor::{FrameCompositor, FrameOutcome, ReleaseHandle};
pub use config::PipelineConfig;
pub use errors::{CaptureError, PipelineError, PipelineResult, ShaderError};
pub use params::{ChannelId, ParameterStore, ParameterVector};
pub use performance::{PerformanceGovernor, PerformanceStats};
pub use scene::{SceneAdapter, SceneAnchor};
pub use sensors::{OrientationIntegrator, Tilt};
