// SPDX-License-Identifier: GPL-3.0-only

//! The parameter vector: 29 normalized channels plus hardware overrides

use super::channels::ChannelId;
use super::presets::CapturePreset;
use crate::constants::{CHANNEL_COUNT, hardware};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Whether capture runs on auto-exposure or the manual channels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    #[default]
    Auto,
    Manual,
}

/// Shutter speed written as a fraction of a second ("1/125") or whole
/// seconds ("2")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShutterSpeed {
    pub numerator: u32,
    pub denominator: u32,
}

impl ShutterSpeed {
    pub fn new(numerator: u32, denominator: u32) -> Option<Self> {
        (numerator > 0 && denominator > 0).then_some(Self {
            numerator,
            denominator,
        })
    }

    /// Exposure time in nanoseconds
    pub fn exposure_ns(self) -> i64 {
        let ns = f64::from(self.numerator) * hardware::NANOS_PER_SECOND / f64::from(self.denominator);
        ns.round() as i64
    }
}

impl fmt::Display for ShutterSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denominator == 1 {
            write!(f, "{}", self.numerator)
        } else {
            write!(f, "{}/{}", self.numerator, self.denominator)
        }
    }
}

impl FromStr for ShutterSpeed {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (numerator, denominator) = match s.split_once('/') {
            Some((n, d)) => (n.trim(), d.trim()),
            None => (s, "1"),
        };
        let numerator: u32 = numerator
            .parse()
            .map_err(|_| format!("invalid shutter speed '{}'", s))?;
        let denominator: u32 = denominator
            .parse()
            .map_err(|_| format!("invalid shutter speed '{}'", s))?;
        Self::new(numerator, denominator).ok_or_else(|| format!("invalid shutter speed '{}'", s))
    }
}

/// Exact hardware values that take precedence over the channel mappings
///
/// Presets carry these as integers/strings; a later slider edit of the
/// matching channel clears the override.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HardwareOverrides {
    pub iso: Option<u32>,
    pub shutter_speed: Option<ShutterSpeed>,
    /// Kelvin
    pub white_balance: Option<u32>,
}

impl HardwareOverrides {
    pub fn is_empty(&self) -> bool {
        self.iso.is_none() && self.shutter_speed.is_none() && self.white_balance.is_none()
    }
}

/// Fixed-length vector of normalized channel values
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterVector {
    values: [f32; CHANNEL_COUNT],
    hardware: HardwareOverrides,
    mode: CaptureMode,
}

impl Default for ParameterVector {
    fn default() -> Self {
        let mut values = [0.0; CHANNEL_COUNT];
        for channel in ChannelId::ALL {
            values[channel.index()] = channel.domain().default_value();
        }
        Self {
            values,
            hardware: HardwareOverrides::default(),
            mode: CaptureMode::Auto,
        }
    }
}

impl ParameterVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, channel: ChannelId) -> f32 {
        self.values[channel.index()]
    }

    /// Value by raw index; `None` past the last channel
    pub fn get_index(&self, index: usize) -> Option<f32> {
        self.values.get(index).copied()
    }

    /// Replace one channel, clamping to its domain
    ///
    /// Non-finite input is ignored. Returns the stored value.
    pub fn set(&mut self, channel: ChannelId, value: f32) -> f32 {
        if !value.is_finite() {
            debug!(channel = %channel, value, "Ignoring non-finite parameter value");
            return self.get(channel);
        }
        let stored = channel.domain().clamp(value);
        self.values[channel.index()] = stored;

        // A manual edit moves the channel away from any preset hardware value
        match channel {
            ChannelId::Iso => self.hardware.iso = None,
            ChannelId::ShutterSpeed => self.hardware.shutter_speed = None,
            ChannelId::WhiteBalance => self.hardware.white_balance = None,
            _ => {}
        }
        stored
    }

    /// Store a value without touching the hardware override
    pub(crate) fn restore_value(&mut self, channel: ChannelId, value: f32) {
        self.values[channel.index()] = channel.domain().clamp(value);
    }

    /// Set by raw index; `None` past the last channel
    pub fn set_index(&mut self, index: usize, value: f32) -> Option<f32> {
        ChannelId::from_index(index).map(|channel| self.set(channel, value))
    }

    /// Set by persisted name; `None` for unknown names
    pub fn set_by_name(&mut self, name: &str, value: f32) -> Option<f32> {
        ChannelId::from_name(name).map(|channel| self.set(channel, value))
    }

    /// Physical value of a channel, honoring hardware overrides
    pub fn to_hardware_value(&self, channel: ChannelId) -> f64 {
        match channel {
            ChannelId::Iso => {
                if let Some(iso) = self.hardware.iso {
                    return f64::from(iso);
                }
            }
            ChannelId::ShutterSpeed => {
                if let Some(shutter) = self.hardware.shutter_speed {
                    return shutter.exposure_ns() as f64;
                }
            }
            ChannelId::WhiteBalance => {
                if let Some(kelvin) = self.hardware.white_balance {
                    return f64::from(kelvin);
                }
            }
            _ => {}
        }
        channel.to_physical(self.get(channel))
    }

    pub fn hardware(&self) -> &HardwareOverrides {
        &self.hardware
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: CaptureMode) {
        self.mode = mode;
    }

    /// Pin ISO to an exact hardware value
    pub fn set_iso(&mut self, iso: u32) {
        self.values[ChannelId::Iso.index()] = ChannelId::Iso.from_physical(f64::from(iso));
        self.hardware.iso = Some(iso);
    }

    /// Pin the shutter to an exact speed
    pub fn set_shutter_speed(&mut self, shutter: ShutterSpeed) {
        self.values[ChannelId::ShutterSpeed.index()] =
            ChannelId::ShutterSpeed.from_physical(shutter.exposure_ns() as f64);
        self.hardware.shutter_speed = Some(shutter);
    }

    /// Pin white balance to an exact color temperature
    pub fn set_white_balance(&mut self, kelvin: u32) {
        self.values[ChannelId::WhiteBalance.index()] =
            ChannelId::WhiteBalance.from_physical(f64::from(kelvin));
        self.hardware.white_balance = Some(kelvin);
    }

    /// Copy a preset's overrides into this vector
    ///
    /// Only channels named by the preset change. Unknown channel names are
    /// skipped. Hardware fields in the preset switch capture to manual.
    pub fn apply_preset(&mut self, preset: &CapturePreset) {
        for (name, &value) in &preset.shader_param_overrides {
            if self.set_by_name(name, value).is_none() {
                debug!(preset = %preset.id, channel = %name, "Ignoring unknown channel in preset");
            }
        }

        let mut manual = false;
        if let Some(iso) = preset.iso {
            self.set_iso(iso);
            manual = true;
        }
        if let Some(shutter) = preset.shutter() {
            self.set_shutter_speed(shutter);
            manual = true;
        }
        if let Some(kelvin) = preset.white_balance {
            self.set_white_balance(kelvin);
            manual = true;
        }
        if manual {
            self.mode = CaptureMode::Manual;
        }
    }

    /// Iterate channels with their values in index order
    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, f32)> + '_ {
        ChannelId::ALL.iter().map(move |&c| (c, self.values[c.index()]))
    }

    pub fn as_slice(&self) -> &[f32; CHANNEL_COUNT] {
        &self.values
    }
}
