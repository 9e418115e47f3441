// SPDX-License-Identifier: GPL-3.0-only

//! The 29-channel parameter store
//!
//! - `channels`: channel identities, domains and hardware unit mappings
//! - `vector`: the parameter vector and hardware overrides
//! - `bundle`: flat JSON persistence
//! - `presets`: capture presets and the built-in catalog
//! - `store`: shared, copy-on-read access across threads

pub mod bundle;
pub mod channels;
pub mod presets;
pub mod store;
pub mod vector;

pub use channels::{ChannelDomain, ChannelId, PhysicalUnit};
pub use presets::{CapturePreset, PresetCatalog, builtin_catalog};
pub use store::{ParameterStore, SnapshotReader};
pub use vector::{CaptureMode, HardwareOverrides, ParameterVector, ShutterSpeed};
