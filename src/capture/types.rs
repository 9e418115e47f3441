// SPDX-License-Identifier: GPL-3.0-only

//! Hardware-facing capture types
//!
//! These mirror the fields a camera hardware abstraction layer accepts. The
//! platform side implements [`CaptureRequestBuilder`] and [`CaptureSession`].

use crate::constants::hardware;
use crate::errors::CaptureResult;
use serde::{Deserialize, Serialize};

pub use crate::params::CaptureMode;

/// Auto-control mode for exposure or white balance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    Auto,
    Off,
}

/// Per-channel color correction gains
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RgbGains {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
}

/// Translated, hardware-ready capture parameters
///
/// Optional fields are `None` while the corresponding auto mode is on.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequestSpec {
    pub ae_mode: ControlMode,
    pub awb_mode: ControlMode,
    pub sensitivity_iso: Option<i32>,
    pub exposure_time_ns: Option<i64>,
    pub color_gains: Option<RgbGains>,
    /// Compensation in device steps (EV / step)
    pub exposure_compensation_index: i32,
    pub focus_distance_diopters: Option<f32>,
}

impl CaptureRequestSpec {
    /// Full auto capture with no compensation
    pub fn auto() -> Self {
        Self {
            ae_mode: ControlMode::Auto,
            awb_mode: ControlMode::Auto,
            sensitivity_iso: None,
            exposure_time_ns: None,
            color_gains: None,
            exposure_compensation_index: 0,
            focus_distance_diopters: None,
        }
    }

    /// Flatten into the individual controls to write on a request
    pub fn controls(&self) -> Vec<CaptureControl> {
        let mut controls = vec![
            CaptureControl::AeMode(self.ae_mode),
            CaptureControl::AwbMode(self.awb_mode),
        ];
        if let Some(iso) = self.sensitivity_iso {
            controls.push(CaptureControl::Sensitivity(iso));
        }
        if let Some(ns) = self.exposure_time_ns {
            controls.push(CaptureControl::ExposureTime(ns));
        }
        if let Some(gains) = self.color_gains {
            controls.push(CaptureControl::ColorGains(gains));
        }
        controls.push(CaptureControl::ExposureCompensation(
            self.exposure_compensation_index,
        ));
        if let Some(diopters) = self.focus_distance_diopters {
            controls.push(CaptureControl::FocusDistance(diopters));
        }
        controls
    }
}

/// One control written to a capture request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureControl {
    AeMode(ControlMode),
    AwbMode(ControlMode),
    Sensitivity(i32),
    ExposureTime(i64),
    ColorGains(RgbGains),
    ExposureCompensation(i32),
    FocusDistance(f32),
}

/// Device limits used to clamp translated values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureCapabilities {
    /// Inclusive sensitivity range
    pub iso_range: (i32, i32),
    /// Inclusive exposure time range (nanoseconds)
    pub exposure_time_range_ns: (i64, i64),
    /// Inclusive compensation index range
    pub compensation_range: (i32, i32),
    /// EV per compensation index
    pub compensation_step: f32,
    /// Closest focus distance in diopters; 0 means fixed focus
    pub min_focus_distance: f32,
}

impl Default for CaptureCapabilities {
    fn default() -> Self {
        Self {
            iso_range: (hardware::ISO_MIN as i32, hardware::ISO_MAX as i32),
            exposure_time_range_ns: (
                hardware::EXPOSURE_MIN_NS as i64,
                hardware::EXPOSURE_MAX_NS as i64,
            ),
            compensation_range: (-6, 6),
            compensation_step: 1.0 / 3.0,
            min_focus_distance: hardware::FOCUS_MAX_DIOPTERS as f32,
        }
    }
}

/// Sink for request controls, implemented by the platform request builder
pub trait CaptureRequestBuilder: Send {
    fn set(&mut self, control: CaptureControl);
}

/// Recorded request, useful for inspection and for test sessions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureRequest {
    pub controls: Vec<CaptureControl>,
}

impl CaptureRequest {
    pub fn from_spec(spec: &CaptureRequestSpec) -> Self {
        let mut request = Self::default();
        for control in spec.controls() {
            request.set(control);
        }
        request
    }
}

impl CaptureRequestBuilder for CaptureRequest {
    fn set(&mut self, control: CaptureControl) {
        // Later writes of the same control replace earlier ones
        self.controls
            .retain(|c| std::mem::discriminant(c) != std::mem::discriminant(&control));
        self.controls.push(control);
    }
}

/// Stream configuration requested when (re)building a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub mode: CaptureMode,
    pub width: u32,
    pub height: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: CaptureMode::Auto,
            width: 1920,
            height: 1080,
        }
    }
}

/// Platform capture session
///
/// Every method is called from the capture-control worker thread only.
pub trait CaptureSession: Send {
    /// Whether the session has been configured and can accept requests
    fn is_configured(&self) -> bool;

    fn configure(&mut self, config: &SessionConfig) -> CaptureResult<()>;

    fn stop_repeating(&mut self) -> CaptureResult<()>;

    fn close(&mut self);

    /// Install the repeating preview request
    fn set_repeating_request(&mut self, request: CaptureRequest) -> CaptureResult<()>;
}
