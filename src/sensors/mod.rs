// SPDX-License-Identifier: GPL-3.0-only

//! Device motion sensors
//!
//! The orientation integrator turns gyroscope samples into the smoothed tilt
//! that drives the parallax effect.

pub mod orientation;

pub use orientation::{GyroSample, OrientationIntegrator, Tilt};
