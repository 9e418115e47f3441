// SPDX-License-Identifier: GPL-3.0-only

//! The 29 parameter channels and their physical mappings
//!
//! Every channel is stored normalized: unit channels in [0, 1] (default 0.5),
//! signed channels in [-1, 1] (default 0.0, which is also the neutral value
//! of the tone stage they drive). `to_physical` is a pure, monotonic map to
//! the unit the hardware or the UI label uses.

use crate::constants::{CHANNEL_COUNT, hardware};
use serde::{Deserialize, Serialize};

/// Normalized input domain of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelDomain {
    /// [0, 1]
    Unit,
    /// [-1, 1]
    Signed,
}

impl ChannelDomain {
    pub fn min(self) -> f32 {
        match self {
            ChannelDomain::Unit => 0.0,
            ChannelDomain::Signed => -1.0,
        }
    }

    pub fn max(self) -> f32 {
        1.0
    }

    /// Mid-scale value a fresh session starts from
    pub fn default_value(self) -> f32 {
        match self {
            ChannelDomain::Unit => 0.5,
            ChannelDomain::Signed => 0.0,
        }
    }

    pub fn clamp(self, value: f32) -> f32 {
        value.clamp(self.min(), self.max())
    }
}

/// Physical unit a channel maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicalUnit {
    /// Sensor sensitivity (ISO 100-3200)
    Iso,
    /// Exposure time in nanoseconds
    Nanoseconds,
    /// Exposure value offset
    Ev,
    /// Lens focus distance
    Diopters,
    /// Color temperature
    Kelvin,
    /// Hue rotation
    Degrees,
    /// Effect strength
    Percent,
}

impl PhysicalUnit {
    pub fn symbol(self) -> &'static str {
        match self {
            PhysicalUnit::Iso => "ISO",
            PhysicalUnit::Nanoseconds => "ns",
            PhysicalUnit::Ev => "EV",
            PhysicalUnit::Diopters => "D",
            PhysicalUnit::Kelvin => "K",
            PhysicalUnit::Degrees => "°",
            PhysicalUnit::Percent => "%",
        }
    }
}

/// Channel identifier; the discriminant is the channel's index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(usize)]
pub enum ChannelId {
    Iso = 0,
    ShutterSpeed = 1,
    ExposureCompensation = 2,
    FocusDistance = 3,
    Brightness = 4,
    Contrast = 5,
    Highlights = 6,
    Shadows = 7,
    Saturation = 8,
    Vibrance = 9,
    Hue = 10,
    WhiteBalance = 11,
    Temperature = 12,
    Tint = 13,
    ColorIntensity = 14,
    Vignette = 15,
    Beauty = 16,
    Smoothing = 17,
    Whitening = 18,
    Redness = 19,
    LiftR = 20,
    LiftG = 21,
    LiftB = 22,
    GammaR = 23,
    GammaG = 24,
    GammaB = 25,
    GainR = 26,
    GainG = 27,
    GainB = 28,
}

impl ChannelId {
    /// All channels in index order
    pub const ALL: [ChannelId; CHANNEL_COUNT] = [
        ChannelId::Iso,
        ChannelId::ShutterSpeed,
        ChannelId::ExposureCompensation,
        ChannelId::FocusDistance,
        ChannelId::Brightness,
        ChannelId::Contrast,
        ChannelId::Highlights,
        ChannelId::Shadows,
        ChannelId::Saturation,
        ChannelId::Vibrance,
        ChannelId::Hue,
        ChannelId::WhiteBalance,
        ChannelId::Temperature,
        ChannelId::Tint,
        ChannelId::ColorIntensity,
        ChannelId::Vignette,
        ChannelId::Beauty,
        ChannelId::Smoothing,
        ChannelId::Whitening,
        ChannelId::Redness,
        ChannelId::LiftR,
        ChannelId::LiftG,
        ChannelId::LiftB,
        ChannelId::GammaR,
        ChannelId::GammaG,
        ChannelId::GammaB,
        ChannelId::GainR,
        ChannelId::GainG,
        ChannelId::GainB,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Look up a channel by its persisted name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.name() == name)
    }

    /// Persisted key
    pub fn name(self) -> &'static str {
        match self {
            ChannelId::Iso => "iso_level",
            ChannelId::ShutterSpeed => "shutter_speed",
            ChannelId::ExposureCompensation => "exposure_compensation",
            ChannelId::FocusDistance => "focus_distance",
            ChannelId::Brightness => "brightness",
            ChannelId::Contrast => "contrast",
            ChannelId::Highlights => "highlights",
            ChannelId::Shadows => "shadows",
            ChannelId::Saturation => "saturation",
            ChannelId::Vibrance => "vibrance",
            ChannelId::Hue => "hue",
            ChannelId::WhiteBalance => "white_balance",
            ChannelId::Temperature => "temperature",
            ChannelId::Tint => "tint",
            ChannelId::ColorIntensity => "color_intensity",
            ChannelId::Vignette => "vignette",
            ChannelId::Beauty => "beauty",
            ChannelId::Smoothing => "smoothing",
            ChannelId::Whitening => "whitening",
            ChannelId::Redness => "redness",
            ChannelId::LiftR => "lift_r",
            ChannelId::LiftG => "lift_g",
            ChannelId::LiftB => "lift_b",
            ChannelId::GammaR => "gamma_r",
            ChannelId::GammaG => "gamma_g",
            ChannelId::GammaB => "gamma_b",
            ChannelId::GainR => "gain_r",
            ChannelId::GainG => "gain_g",
            ChannelId::GainB => "gain_b",
        }
    }

    /// Display label for UI
    pub fn label(self) -> &'static str {
        match self {
            ChannelId::Iso => "ISO",
            ChannelId::ShutterSpeed => "Shutter",
            ChannelId::ExposureCompensation => "Exposure",
            ChannelId::FocusDistance => "Focus",
            ChannelId::Brightness => "Brightness",
            ChannelId::Contrast => "Contrast",
            ChannelId::Highlights => "Highlights",
            ChannelId::Shadows => "Shadows",
            ChannelId::Saturation => "Saturation",
            ChannelId::Vibrance => "Vibrance",
            ChannelId::Hue => "Hue",
            ChannelId::WhiteBalance => "White Balance",
            ChannelId::Temperature => "Warmth",
            ChannelId::Tint => "Tint",
            ChannelId::ColorIntensity => "Intensity",
            ChannelId::Vignette => "Vignette",
            ChannelId::Beauty => "Beauty",
            ChannelId::Smoothing => "Smooth Skin",
            ChannelId::Whitening => "Whiten",
            ChannelId::Redness => "Rosy",
            ChannelId::LiftR => "Lift R",
            ChannelId::LiftG => "Lift G",
            ChannelId::LiftB => "Lift B",
            ChannelId::GammaR => "Gamma R",
            ChannelId::GammaG => "Gamma G",
            ChannelId::GammaB => "Gamma B",
            ChannelId::GainR => "Gain R",
            ChannelId::GainG => "Gain G",
            ChannelId::GainB => "Gain B",
        }
    }

    pub fn domain(self) -> ChannelDomain {
        match self {
            ChannelId::Iso
            | ChannelId::ShutterSpeed
            | ChannelId::ExposureCompensation
            | ChannelId::FocusDistance
            | ChannelId::WhiteBalance
            | ChannelId::Beauty
            | ChannelId::Smoothing
            | ChannelId::Whitening
            | ChannelId::Redness => ChannelDomain::Unit,
            _ => ChannelDomain::Signed,
        }
    }

    pub fn unit(self) -> PhysicalUnit {
        match self {
            ChannelId::Iso => PhysicalUnit::Iso,
            ChannelId::ShutterSpeed => PhysicalUnit::Nanoseconds,
            ChannelId::ExposureCompensation => PhysicalUnit::Ev,
            ChannelId::FocusDistance => PhysicalUnit::Diopters,
            ChannelId::WhiteBalance => PhysicalUnit::Kelvin,
            ChannelId::Hue => PhysicalUnit::Degrees,
            _ => PhysicalUnit::Percent,
        }
    }

    /// Whether the channel drives the capture hardware rather than the shader
    pub fn is_hardware(self) -> bool {
        matches!(
            self,
            ChannelId::Iso
                | ChannelId::ShutterSpeed
                | ChannelId::ExposureCompensation
                | ChannelId::FocusDistance
                | ChannelId::WhiteBalance
        )
    }

    /// Map a normalized value to the channel's physical unit
    ///
    /// The input is clamped to the channel domain first, so the map is total
    /// and monotonic. All arithmetic is done in `f64` from the exact `f32`
    /// input, so repeated calls are bit-identical.
    pub fn to_physical(self, value: f32) -> f64 {
        let v = f64::from(self.domain().clamp(value));
        match self {
            ChannelId::Iso => lerp(hardware::ISO_MIN, hardware::ISO_MAX, v),
            ChannelId::ShutterSpeed => {
                let ln_min = hardware::EXPOSURE_MIN_NS.ln();
                let ln_max = hardware::EXPOSURE_MAX_NS.ln();
                lerp(ln_min, ln_max, v).exp()
            }
            ChannelId::ExposureCompensation => (v - 0.5) * 2.0 * hardware::EV_SPAN,
            ChannelId::FocusDistance => v * hardware::FOCUS_MAX_DIOPTERS,
            ChannelId::WhiteBalance => lerp(hardware::KELVIN_MIN, hardware::KELVIN_MAX, v),
            ChannelId::Hue => v * 180.0,
            _ => v * 100.0,
        }
    }

    /// Inverse of `to_physical`, clamped to the channel domain
    pub fn from_physical(self, physical: f64) -> f32 {
        let v = match self {
            ChannelId::Iso => inverse_lerp(hardware::ISO_MIN, hardware::ISO_MAX, physical),
            ChannelId::ShutterSpeed => {
                if physical <= 0.0 {
                    0.0
                } else {
                    let ln_min = hardware::EXPOSURE_MIN_NS.ln();
                    let ln_max = hardware::EXPOSURE_MAX_NS.ln();
                    inverse_lerp(ln_min, ln_max, physical.ln())
                }
            }
            ChannelId::ExposureCompensation => physical / (2.0 * hardware::EV_SPAN) + 0.5,
            ChannelId::FocusDistance => physical / hardware::FOCUS_MAX_DIOPTERS,
            ChannelId::WhiteBalance => {
                inverse_lerp(hardware::KELVIN_MIN, hardware::KELVIN_MAX, physical)
            }
            ChannelId::Hue => physical / 180.0,
            _ => physical / 100.0,
        };
        self.domain().clamp(v as f32)
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[inline]
fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

#[inline]
fn inverse_lerp(a: f64, b: f64, x: f64) -> f64 {
    (x - a) / (b - a)
}
