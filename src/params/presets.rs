// SPDX-License-Identifier: GPL-3.0-only

//! Capture presets
//!
//! A preset names a subset of channels to override plus optional exact
//! hardware values. Presets are plain data; applying one is
//! [`ParameterVector::apply_preset`](super::ParameterVector::apply_preset).

use super::vector::ShutterSpeed;
use crate::errors::PipelineResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// A named parameter preset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CapturePreset {
    pub id: String,
    pub display_name: String,
    /// Channel name to normalized value
    pub shader_param_overrides: BTreeMap<String, f32>,
    pub iso: Option<u32>,
    /// "1/125" or whole seconds
    pub shutter_speed: Option<String>,
    /// Kelvin
    pub white_balance: Option<u32>,
}

impl CapturePreset {
    /// Parsed shutter speed; malformed strings are logged and treated as absent
    pub fn shutter(&self) -> Option<ShutterSpeed> {
        let raw = self.shutter_speed.as_deref()?;
        match raw.parse() {
            Ok(shutter) => Some(shutter),
            Err(e) => {
                warn!(preset = %self.id, error = %e, "Ignoring preset shutter speed");
                None
            }
        }
    }

    /// Whether the preset pins any hardware value
    pub fn has_hardware(&self) -> bool {
        self.iso.is_some() || self.shutter_speed.is_some() || self.white_balance.is_some()
    }
}

/// Ordered collection of presets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresetCatalog {
    presets: Vec<CapturePreset>,
}

impl PresetCatalog {
    pub fn new(presets: Vec<CapturePreset>) -> Self {
        Self { presets }
    }

    /// Parse a JSON array of presets
    pub fn from_json(json: &str) -> PipelineResult<Self> {
        let presets: Vec<CapturePreset> = serde_json::from_str(json)?;
        Ok(Self { presets })
    }

    pub fn get(&self, id: &str) -> Option<&CapturePreset> {
        self.presets.iter().find(|p| p.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapturePreset> {
        self.presets.iter()
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

const BUILTIN_PRESETS: &str = include_str!("builtin_presets.json");

/// Presets shipped with the render core
pub fn builtin_catalog() -> PresetCatalog {
    match PresetCatalog::from_json(BUILTIN_PRESETS) {
        Ok(catalog) => catalog,
        Err(e) => {
            warn!(error = %e, "Built-in preset catalog is malformed");
            PresetCatalog::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ChannelId;

    #[test]
    fn test_builtin_catalog_parses() {
        let catalog = builtin_catalog();
        assert!(!catalog.is_empty());
        for preset in catalog.iter() {
            for name in preset.shader_param_overrides.keys() {
                assert!(
                    ChannelId::from_name(name).is_some(),
                    "preset {} names unknown channel {}",
                    preset.id,
                    name
                );
            }
            if preset.shutter_speed.is_some() {
                assert!(preset.shutter().is_some(), "bad shutter in {}", preset.id);
            }
        }
    }

    #[test]
    fn test_camel_case_fields() {
        let json = r#"[{
            "id": "dusk",
            "displayName": "Dusk",
            "shaderParamOverrides": { "temperature": 0.4 },
            "shutterSpeed": "1/60",
            "whiteBalance": 4500
        }]"#;
        let catalog = PresetCatalog::from_json(json).unwrap();
        let dusk = catalog.get("dusk").unwrap();
        assert_eq!(dusk.display_name, "Dusk");
        assert_eq!(dusk.white_balance, Some(4500));
        assert_eq!(dusk.shutter().map(|s| s.denominator), Some(60));
        assert!(dusk.has_hardware());
    }
}
