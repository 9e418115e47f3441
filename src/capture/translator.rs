// SPDX-License-Identifier: GPL-3.0-only

//! Parameter vector to capture request translation
//!
//! `translate` is pure. `apply` writes a translated spec onto a request
//! builder and, when no session is configured yet, keeps the spec pending so
//! the next parameter change retries it.

use super::types::{
    CaptureCapabilities, CaptureControl, CaptureRequestBuilder, CaptureRequestSpec, ControlMode,
    RgbGains,
};
use crate::constants::hardware;
use crate::params::{CaptureMode, ChannelId, ParameterVector};
use tracing::{debug, warn};

/// Kelvin to RGB gains, piecewise linear between 2000 K and 10000 K
///
/// 2000 K gives (0.8, 1.0, 1.5); 10000 K gives (1.5, 1.0, 0.8). Values
/// outside the range clamp to the endpoints.
pub fn kelvin_to_gains(kelvin: f64) -> RgbGains {
    let progress = ((kelvin - hardware::KELVIN_MIN) / (hardware::KELVIN_MAX - hardware::KELVIN_MIN))
        .clamp(0.0, 1.0) as f32;
    RgbGains {
        red: 0.8 + 0.7 * progress,
        green: 1.0,
        blue: 1.5 - 0.7 * progress,
    }
}

/// Result of [`CaptureTranslator::apply`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Controls were written to the builder
    Applied,
    /// No configured session; the spec is kept for the next attempt
    Deferred,
}

/// Converts parameter vectors into capture requests for one device
#[derive(Debug, Clone)]
pub struct CaptureTranslator {
    capabilities: CaptureCapabilities,
    pending: Option<CaptureRequestSpec>,
}

impl CaptureTranslator {
    pub fn new(capabilities: CaptureCapabilities) -> Self {
        Self {
            capabilities,
            pending: None,
        }
    }

    pub fn capabilities(&self) -> &CaptureCapabilities {
        &self.capabilities
    }

    /// Translate a parameter vector into hardware request fields
    ///
    /// Auto exposure and auto white balance are turned off whenever manual
    /// parameters are in effect: manual mode, or any pinned hardware value.
    pub fn translate(&self, vector: &ParameterVector) -> CaptureRequestSpec {
        let caps = &self.capabilities;
        let manual = vector.mode() == CaptureMode::Manual || !vector.hardware().is_empty();

        let ev = vector.to_hardware_value(ChannelId::ExposureCompensation);
        let step = f64::from(caps.compensation_step);
        let compensation = if step > 0.0 {
            ((ev / step).round() as i32).clamp(caps.compensation_range.0, caps.compensation_range.1)
        } else {
            0
        };

        if !manual {
            return CaptureRequestSpec {
                exposure_compensation_index: compensation,
                ..CaptureRequestSpec::auto()
            };
        }

        let iso = (vector.to_hardware_value(ChannelId::Iso).round() as i32)
            .clamp(caps.iso_range.0, caps.iso_range.1);
        let exposure_ns = (vector.to_hardware_value(ChannelId::ShutterSpeed).round() as i64)
            .clamp(caps.exposure_time_range_ns.0, caps.exposure_time_range_ns.1);
        let gains = kelvin_to_gains(vector.to_hardware_value(ChannelId::WhiteBalance));
        let focus = (caps.min_focus_distance > 0.0).then(|| {
            (vector.to_hardware_value(ChannelId::FocusDistance) as f32)
                .clamp(0.0, caps.min_focus_distance)
        });

        CaptureRequestSpec {
            ae_mode: ControlMode::Off,
            awb_mode: ControlMode::Off,
            sensitivity_iso: Some(iso),
            exposure_time_ns: Some(exposure_ns),
            color_gains: Some(gains),
            exposure_compensation_index: compensation,
            focus_distance_diopters: focus,
        }
    }

    /// Write a spec onto the session's request builder
    ///
    /// With no builder (session not configured) this logs a warning, keeps
    /// the spec pending and returns [`ApplyOutcome::Deferred`]. It never fails.
    pub fn apply(
        &mut self,
        spec: &CaptureRequestSpec,
        builder: Option<&mut dyn CaptureRequestBuilder>,
    ) -> ApplyOutcome {
        let Some(builder) = builder else {
            warn!("Capture session not configured, deferring capture parameters");
            self.pending = Some(spec.clone());
            return ApplyOutcome::Deferred;
        };

        for control in spec.controls() {
            builder.set(control);
        }
        if let (ControlMode::Off, Some(iso), Some(ns)) =
            (spec.ae_mode, spec.sensitivity_iso, spec.exposure_time_ns)
        {
            debug!(iso, exposure_ns = ns, "Applied manual exposure");
        }
        self.pending = None;
        ApplyOutcome::Applied
    }

    /// Translate and apply in one step
    pub fn apply_vector(
        &mut self,
        vector: &ParameterVector,
        builder: Option<&mut dyn CaptureRequestBuilder>,
    ) -> ApplyOutcome {
        let spec = self.translate(vector);
        self.apply(&spec, builder)
    }

    /// Spec deferred by the last `apply` without a session
    pub fn pending(&self) -> Option<&CaptureRequestSpec> {
        self.pending.as_ref()
    }

    pub fn take_pending(&mut self) -> Option<CaptureRequestSpec> {
        self.pending.take()
    }
}

/// Whether a control list disables both auto loops
pub fn is_fully_manual(controls: &[CaptureControl]) -> bool {
    controls.contains(&CaptureControl::AeMode(ControlMode::Off))
        && controls.contains(&CaptureControl::AwbMode(ControlMode::Off))
}
