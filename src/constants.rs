// SPDX-License-Identifier: GPL-3.0-only

//! Render-core constants

use std::time::Duration;

/// Number of channels in the parameter vector
pub const CHANNEL_COUNT: usize = 29;

/// Orientation integration defaults
pub mod orientation {
    /// Exponential smoothing factor applied to the raw tilt integral
    pub const DEFAULT_ALPHA: f32 = 0.1;

    /// Maximum tilt per axis (radians)
    pub const DEFAULT_MAX_TILT: f32 = 0.5;

    /// Angular velocities below this magnitude (rad/s) are treated as zero
    pub const DEFAULT_DEAD_ZONE: f32 = 0.02;

    /// Fraction of the raw tilt removed per at-rest sample
    pub const DEFAULT_RECENTER_RATE: f32 = 0.5;

    /// Longest timestep integrated from a single sample (seconds)
    pub const DEFAULT_MAX_DT: f32 = 0.1;
}

/// Frame timing
pub mod timing {
    use super::Duration;

    /// Display refresh rate the compositor is budgeted for
    pub const TARGET_FPS: u32 = 60;

    /// Per-frame time budget in milliseconds (1000 / 60)
    pub const FRAME_BUDGET_MS: f64 = 1000.0 / TARGET_FPS as f64;

    /// Emit statistics after this many frames
    pub const STATS_INTERVAL_FRAMES: u32 = 30;

    /// Emit statistics at least this often
    pub const STATS_INTERVAL: Duration = Duration::from_secs(1);

    /// Consecutive over-budget windows before degradation is advised
    pub const DEGRADE_AFTER_WINDOWS: u32 = 3;
}

/// Compositor tuning
pub mod compositor {
    /// Texture-coordinate shift per radian of tilt
    pub const DEFAULT_PARALLAX_STRENGTH: f32 = 0.05;

    /// `k` in the bilateral weight `exp(-dl^2 * k)`
    pub const DEFAULT_EDGE_SENSITIVITY: f32 = 40.0;

    /// Distance in pixels between blur taps
    pub const DEFAULT_BLUR_RADIUS: f32 = 2.0;

    /// Vertical field of view used for overlay projection (radians)
    pub const DEFAULT_FOV_Y: f32 = std::f32::consts::FRAC_PI_3;

    pub const DEFAULT_NEAR_PLANE: f32 = 0.05;
    pub const DEFAULT_FAR_PLANE: f32 = 100.0;

    /// Compute shader workgroup edge length
    pub const WORKGROUP_SIZE: u32 = 16;
}

/// Capture hardware ranges used by the channel mappings
pub mod hardware {
    pub const ISO_MIN: f64 = 100.0;
    pub const ISO_MAX: f64 = 3200.0;

    /// 1/8000 s
    pub const EXPOSURE_MIN_NS: f64 = 125_000.0;
    /// 1/4 s
    pub const EXPOSURE_MAX_NS: f64 = 250_000_000.0;

    pub const KELVIN_MIN: f64 = 2000.0;
    pub const KELVIN_MAX: f64 = 10000.0;

    /// Exposure compensation span either side of zero (EV)
    pub const EV_SPAN: f64 = 2.0;

    /// Closest focus distance (diopters)
    pub const FOCUS_MAX_DIOPTERS: f64 = 10.0;

    pub const NANOS_PER_SECOND: f64 = 1_000_000_000.0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_budget() {
        assert!((timing::FRAME_BUDGET_MS - 16.6667).abs() < 0.001);
    }

    #[test]
    fn test_hardware_ranges_ordered() {
        assert!(hardware::ISO_MIN < hardware::ISO_MAX);
        assert!(hardware::EXPOSURE_MIN_NS < hardware::EXPOSURE_MAX_NS);
        assert!(hardware::KELVIN_MIN < hardware::KELVIN_MAX);
    }
}
