// SPDX-License-Identifier: GPL-3.0-only

//! Render-core configuration
//!
//! The configuration is an immutable value. Each component receives its own
//! section by value at construction time; reloading means building new
//! components from a freshly loaded config rather than mutating shared state.

use crate::capture::CaptureCapabilities;
use crate::constants::{compositor, orientation, timing};
use crate::errors::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Which compositor backend to create
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendPreference {
    /// GPU when available, CPU reference otherwise
    #[default]
    Auto,
    /// GPU only; initialization fails without a usable adapter
    Gpu,
    /// CPU reference path
    Cpu,
}

/// Orientation integrator tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrientationConfig {
    /// Exponential smoothing factor (0, 1]
    pub alpha: f32,
    /// Per-axis tilt bound (radians)
    pub max_tilt: f32,
    /// Angular velocity magnitude treated as zero (rad/s)
    pub dead_zone: f32,
    /// Fraction of the raw tilt removed per at-rest sample [0, 1]
    pub recenter_rate: f32,
    /// Longest timestep accepted from a single sample (seconds)
    pub max_dt: f32,
}

impl Default for OrientationConfig {
    fn default() -> Self {
        Self {
            alpha: orientation::DEFAULT_ALPHA,
            max_tilt: orientation::DEFAULT_MAX_TILT,
            dead_zone: orientation::DEFAULT_DEAD_ZONE,
            recenter_rate: orientation::DEFAULT_RECENTER_RATE,
            max_dt: orientation::DEFAULT_MAX_DT,
        }
    }
}

impl OrientationConfig {
    /// Copy with every field usable by the integrator
    ///
    /// Non-finite values fall back to the default. `max_tilt` and
    /// `dead_zone` use their magnitude; `alpha` and `recenter_rate` are
    /// clamped into [0, 1] (`alpha` must stay above zero).
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        let finite_or = |value: f32, fallback: f32| {
            if value.is_finite() { value } else { fallback }
        };
        let alpha = finite_or(self.alpha, defaults.alpha);
        let max_dt = finite_or(self.max_dt, defaults.max_dt);
        Self {
            alpha: if alpha > 0.0 { alpha.min(1.0) } else { defaults.alpha },
            max_tilt: finite_or(self.max_tilt, defaults.max_tilt).abs(),
            dead_zone: finite_or(self.dead_zone, defaults.dead_zone).abs(),
            recenter_rate: finite_or(self.recenter_rate, defaults.recenter_rate).clamp(0.0, 1.0),
            max_dt: if max_dt > 0.0 { max_dt } else { defaults.max_dt },
        }
    }
}

/// Frame compositor tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    pub backend: BackendPreference,
    /// UV shift per radian of tilt
    pub parallax_strength: f32,
    /// Edge sensitivity `k` of the skin-smoothing blur
    pub edge_sensitivity: f32,
    /// Tap spacing of the skin-smoothing blur (pixels)
    pub blur_radius: f32,
    /// Vertical field of view for overlay projection (radians)
    pub fov_y: f32,
    pub near_plane: f32,
    pub far_plane: f32,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            backend: BackendPreference::default(),
            parallax_strength: compositor::DEFAULT_PARALLAX_STRENGTH,
            edge_sensitivity: compositor::DEFAULT_EDGE_SENSITIVITY,
            blur_radius: compositor::DEFAULT_BLUR_RADIUS,
            fov_y: compositor::DEFAULT_FOV_Y,
            near_plane: compositor::DEFAULT_NEAR_PLANE,
            far_plane: compositor::DEFAULT_FAR_PLANE,
        }
    }
}

/// Performance governor tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub target_fps: u32,
    /// Emit statistics after this many frames
    pub stats_interval_frames: u32,
    /// Emit statistics at least this often (milliseconds)
    pub stats_interval_ms: u64,
    /// Consecutive over-budget windows before degradation is advised
    pub degrade_after_windows: u32,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            target_fps: timing::TARGET_FPS,
            stats_interval_frames: timing::STATS_INTERVAL_FRAMES,
            stats_interval_ms: timing::STATS_INTERVAL.as_millis() as u64,
            degrade_after_windows: timing::DEGRADE_AFTER_WINDOWS,
        }
    }
}

impl PerformanceConfig {
    /// Frame budget in milliseconds
    pub fn frame_budget_ms(&self) -> f64 {
        1000.0 / f64::from(self.target_fps.max(1))
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }
}

/// Complete render-core configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub orientation: OrientationConfig,
    pub compositor: CompositorConfig,
    pub performance: PerformanceConfig,
    pub capture: CaptureCapabilities,
}

impl PipelineConfig {
    /// Default location of the configuration file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("yanbao").join("pipeline.json"))
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> PipelineResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> PipelineResult<Self> {
        debug!(path = %path.display(), "Loading pipeline configuration");
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Load the configuration from the default path, falling back to defaults
    /// when the file is absent or invalid
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => {
                info!(path = %path.display(), "Loaded pipeline configuration");
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Invalid pipeline configuration, using defaults");
                Self::default()
            }
        }
    }

    /// Check value ranges that would break the numeric invariants
    pub fn validate(&self) -> PipelineResult<()> {
        let o = &self.orientation;
        if !(o.alpha > 0.0 && o.alpha <= 1.0) {
            return Err(PipelineError::Config(format!(
                "orientation.alpha must be in (0, 1], got {}",
                o.alpha
            )));
        }
        if !(o.max_tilt > 0.0 && o.max_tilt.is_finite()) {
            return Err(PipelineError::Config(format!(
                "orientation.max_tilt must be positive, got {}",
                o.max_tilt
            )));
        }
        if !(0.0..=1.0).contains(&o.recenter_rate) {
            return Err(PipelineError::Config(format!(
                "orientation.recenter_rate must be in [0, 1], got {}",
                o.recenter_rate
            )));
        }
        if o.dead_zone < 0.0 || o.max_dt <= 0.0 {
            return Err(PipelineError::Config(
                "orientation.dead_zone and max_dt must be non-negative".to_string(),
            ));
        }
        let c = &self.compositor;
        if c.edge_sensitivity < 0.0 || c.blur_radius < 0.0 || c.near_plane >= c.far_plane {
            return Err(PipelineError::Config(
                "compositor tuning out of range".to_string(),
            ));
        }
        if self.performance.target_fps == 0 || self.performance.stats_interval_frames == 0 {
            return Err(PipelineError::Config(
                "performance.target_fps and stats_interval_frames must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
