// SPDX-License-Identifier: GPL-3.0-only

//! Capture parameter translation and session control
//!
//! The translator turns a [`ParameterVector`](crate::params::ParameterVector)
//! into hardware request fields. The controller owns the platform session on
//! a single worker thread and serializes every request and rebuild.

pub mod controller;
pub mod translator;
pub mod types;

pub use controller::{CancellationToken, CaptureController, CaptureEvent, PendingCapture};
pub use translator::{ApplyOutcome, CaptureTranslator, is_fully_manual, kelvin_to_gains};
pub use types::{
    CaptureCapabilities, CaptureControl, CaptureMode, CaptureRequest, CaptureRequestBuilder,
    CaptureRequestSpec, CaptureSession, ControlMode, RgbGains, SessionConfig,
};
