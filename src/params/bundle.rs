// SPDX-License-Identifier: GPL-3.0-only

//! Flat key-value persistence of a [`ParameterVector`]
//!
//! The bundle is a single JSON object. Each channel is stored under its
//! persisted name as a float. Hardware overrides, when present, are stored
//! as `iso` (integer), `shutterSpeed` ("N/D" string) and `whiteBalance`
//! (integer Kelvin). Channel floats are written as the exact `f64` widening
//! of the stored `f32`, so a round trip reproduces every value bit for bit.

use super::channels::ChannelId;
use super::vector::{CaptureMode, ParameterVector, ShutterSpeed};
use crate::errors::{PipelineError, PipelineResult};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

const KEY_ISO: &str = "iso";
const KEY_SHUTTER: &str = "shutterSpeed";
const KEY_WHITE_BALANCE: &str = "whiteBalance";
const KEY_MODE: &str = "captureMode";

impl ParameterVector {
    /// Flatten to channel name -> value
    pub fn to_key_values(&self) -> BTreeMap<String, f32> {
        self.iter()
            .map(|(channel, value)| (channel.name().to_string(), value))
            .collect()
    }

    /// Build from channel name -> value; unknown names are ignored and
    /// missing channels keep their defaults
    pub fn from_key_values(values: &BTreeMap<String, f32>) -> Self {
        let mut vector = Self::default();
        for (name, &value) in values {
            if vector.set_by_name(name, value).is_none() {
                debug!(key = %name, "Ignoring unknown parameter key");
            }
        }
        vector
    }

    /// Serialize to the persisted JSON object
    pub fn to_bundle(&self) -> Value {
        let mut map = Map::new();
        for (channel, value) in self.iter() {
            map.insert(channel.name().to_string(), Value::from(f64::from(value)));
        }

        let hardware = self.hardware();
        if let Some(iso) = hardware.iso {
            map.insert(KEY_ISO.to_string(), Value::from(iso));
        }
        if let Some(shutter) = hardware.shutter_speed {
            map.insert(KEY_SHUTTER.to_string(), Value::from(shutter.to_string()));
        }
        if let Some(kelvin) = hardware.white_balance {
            map.insert(KEY_WHITE_BALANCE.to_string(), Value::from(kelvin));
        }
        if self.mode() == CaptureMode::Manual {
            map.insert(KEY_MODE.to_string(), Value::from("manual"));
        }
        Value::Object(map)
    }

    /// Serialize to a JSON string
    pub fn to_bundle_string(&self) -> PipelineResult<String> {
        Ok(serde_json::to_string(&self.to_bundle())?)
    }

    /// Rebuild a vector from a persisted JSON object
    ///
    /// Unknown keys are ignored. A channel value that is not a finite number
    /// is rejected so a corrupt bundle never silently zeroes a channel.
    pub fn from_bundle(bundle: &Value) -> PipelineResult<Self> {
        let map = bundle.as_object().ok_or_else(|| {
            PipelineError::Serialization("parameter bundle must be a JSON object".to_string())
        })?;

        let mut vector = Self::default();
        for (key, value) in map {
            let Some(channel) = ChannelId::from_name(key) else {
                continue;
            };
            let number = value
                .as_f64()
                .filter(|v| v.is_finite())
                .ok_or_else(|| {
                    PipelineError::Serialization(format!("channel '{}' is not a finite number", key))
                })?;
            vector.set(channel, number as f32);
        }

        // Overrides last: they also reposition their channel
        if let Some(value) = map.get(KEY_ISO) {
            let iso = value
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| PipelineError::Serialization(format!("invalid iso {}", value)))?;
            let normalized = vector.get(ChannelId::Iso);
            vector.set_iso(iso);
            restore_channel(&mut vector, ChannelId::Iso, normalized, map);
        }
        if let Some(value) = map.get(KEY_SHUTTER) {
            let shutter: ShutterSpeed = value
                .as_str()
                .ok_or_else(|| PipelineError::Serialization(format!("invalid shutterSpeed {}", value)))?
                .parse()
                .map_err(PipelineError::Serialization)?;
            let normalized = vector.get(ChannelId::ShutterSpeed);
            vector.set_shutter_speed(shutter);
            restore_channel(&mut vector, ChannelId::ShutterSpeed, normalized, map);
        }
        if let Some(value) = map.get(KEY_WHITE_BALANCE) {
            let kelvin = value
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| {
                    PipelineError::Serialization(format!("invalid whiteBalance {}", value))
                })?;
            let normalized = vector.get(ChannelId::WhiteBalance);
            vector.set_white_balance(kelvin);
            restore_channel(&mut vector, ChannelId::WhiteBalance, normalized, map);
        }
        if map.get(KEY_MODE).and_then(Value::as_str) == Some("manual") {
            vector.set_mode(CaptureMode::Manual);
        }
        Ok(vector)
    }

    /// Parse a JSON string bundle
    pub fn from_bundle_str(json: &str) -> PipelineResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_bundle(&value)
    }
}

/// Put back a persisted channel value after an override recomputed it
fn restore_channel(
    vector: &mut ParameterVector,
    channel: ChannelId,
    normalized: f32,
    map: &Map<String, Value>,
) {
    if map.contains_key(channel.name()) {
        vector.restore_value(channel, normalized);
    }
}
