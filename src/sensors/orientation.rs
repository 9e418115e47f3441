// SPDX-License-Identifier: GPL-3.0-only

//! Gyroscope tilt integration
//!
//! Samples arrive on the sensor callback thread at 50-200 Hz. Each accepted
//! sample is dead-zoned, integrated into a raw tilt clamped to
//! `±max_tilt`, and exponentially smoothed. The smoothed pair is published
//! through a single atomic word so the render thread always reads a
//! consistent (x, y) without locking.

use crate::config::OrientationConfig;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Smoothed device tilt in radians
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Tilt {
    pub x: f32,
    pub y: f32,
}

impl Tilt {
    pub const ZERO: Tilt = Tilt { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    fn clamped(self, max_tilt: f32) -> Self {
        Self {
            x: self.x.clamp(-max_tilt, max_tilt),
            y: self.y.clamp(-max_tilt, max_tilt),
        }
    }

    fn pack(self) -> u64 {
        (u64::from(self.x.to_bits()) << 32) | u64::from(self.y.to_bits())
    }

    fn unpack(bits: u64) -> Self {
        Self {
            x: f32::from_bits((bits >> 32) as u32),
            y: f32::from_bits(bits as u32),
        }
    }
}

/// Raw gyroscope reading as delivered by the platform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GyroSample {
    /// Sensor timestamp (nanoseconds, monotonic)
    pub timestamp_ns: i64,
    /// Angular velocity around each axis (rad/s)
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Default)]
struct IntegratorState {
    raw: Tilt,
    smooth: Tilt,
    last_timestamp_ns: Option<i64>,
}

/// Integrates angular velocity into a bounded, smoothed tilt
///
/// Single writer (the sensor thread), any number of readers.
#[derive(Debug)]
pub struct OrientationIntegrator {
    config: OrientationConfig,
    available: AtomicBool,
    state: Mutex<IntegratorState>,
    published: AtomicU64,
}

impl OrientationIntegrator {
    /// Create an integrator for a device with a gyroscope
    ///
    /// Unusable config values are replaced, see [`OrientationConfig::sanitized`].
    pub fn new(config: OrientationConfig) -> Self {
        let sanitized = config.sanitized();
        if sanitized != config {
            warn!(?config, ?sanitized, "Orientation config adjusted");
        }
        Self {
            config: sanitized,
            available: AtomicBool::new(true),
            state: Mutex::new(IntegratorState::default()),
            published: AtomicU64::new(Tilt::ZERO.pack()),
        }
    }

    /// Create an integrator for a device without a gyroscope
    ///
    /// All samples are ignored and `current_tilt()` is always (0, 0).
    pub fn unavailable(config: OrientationConfig) -> Self {
        info!("Gyroscope unavailable, parallax disabled");
        let integrator = Self::new(config);
        integrator.available.store(false, Ordering::Release);
        integrator
    }

    pub fn config(&self) -> &OrientationConfig {
        &self.config
    }

    /// Whether the gyroscope is present
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Mark the sensor as lost (e.g. the platform revoked access)
    pub fn mark_unavailable(&self) {
        if self.available.swap(false, Ordering::AcqRel) {
            warn!("Gyroscope became unavailable, resetting tilt");
            self.reset();
        }
    }

    /// Integrate one angular-velocity sample over `dt` seconds
    pub fn on_angular_velocity_sample(&self, gx: f32, gy: f32, dt: f32) {
        if !self.is_available() {
            return;
        }
        if !(gx.is_finite() && gy.is_finite() && dt.is_finite()) || dt <= 0.0 {
            debug!(gx, gy, dt, "Dropping malformed gyroscope sample");
            return;
        }

        let mut state = self.lock_state();
        self.integrate(&mut state, gx, gy, dt.min(self.config.max_dt));
    }

    /// Integrate a timestamped sample, deriving `dt` from the previous one
    ///
    /// The first sample after construction or `reset()` only primes the clock.
    pub fn on_sample(&self, sample: GyroSample) {
        if !self.is_available() {
            return;
        }

        let mut state = self.lock_state();
        let previous = state.last_timestamp_ns.replace(sample.timestamp_ns);
        let Some(previous) = previous else {
            return;
        };
        if sample.timestamp_ns <= previous {
            debug!(
                timestamp_ns = sample.timestamp_ns,
                previous, "Dropping out-of-order gyroscope sample"
            );
            state.last_timestamp_ns = Some(previous);
            return;
        }
        if !(sample.x.is_finite() && sample.y.is_finite()) {
            debug!("Dropping non-finite gyroscope sample");
            return;
        }

        let dt = (sample.timestamp_ns.saturating_sub(previous) as f64 / 1e9) as f32;
        self.integrate(&mut state, sample.x, sample.y, dt.min(self.config.max_dt));
    }

    /// Latest smoothed tilt; never blocks
    pub fn current_tilt(&self) -> Tilt {
        if !self.is_available() {
            return Tilt::ZERO;
        }
        Tilt::unpack(self.published.load(Ordering::Acquire))
    }

    /// Zero all integration state
    pub fn reset(&self) {
        let mut state = self.lock_state();
        *state = IntegratorState::default();
        self.published.store(Tilt::ZERO.pack(), Ordering::Release);
    }

    /// Seed both the raw integral and the smoothed output
    ///
    /// Used when restoring a session or after calibration.
    pub fn set_tilt(&self, tilt: Tilt) {
        if !(tilt.x.is_finite() && tilt.y.is_finite()) {
            return;
        }
        let tilt = tilt.clamped(self.config.max_tilt);
        let mut state = self.lock_state();
        state.raw = tilt;
        state.smooth = tilt;
        self.published.store(tilt.pack(), Ordering::Release);
    }

    fn integrate(&self, state: &mut IntegratorState, gx: f32, gy: f32, dt: f32) {
        let cfg = &self.config;
        let magnitude = (gx * gx + gy * gy).sqrt();

        if magnitude < cfg.dead_zone {
            // At rest: let the parallax settle back to center
            let keep = 1.0 - cfg.recenter_rate;
            state.raw = Tilt::new(state.raw.x * keep, state.raw.y * keep);
        } else {
            state.raw = Tilt::new(state.raw.x + gx * dt, state.raw.y + gy * dt)
                .clamped(cfg.max_tilt);
        }

        state.smooth = Tilt::new(
            state.smooth.x + cfg.alpha * (state.raw.x - state.smooth.x),
            state.smooth.y + cfg.alpha * (state.raw.y - state.smooth.y),
        )
        .clamped(cfg.max_tilt);

        self.published.store(state.smooth.pack(), Ordering::Release);
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, IntegratorState> {
        // A panic elsewhere cannot leave the state half-written: every field
        // is a plain value replaced in one assignment.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn integrator() -> OrientationIntegrator {
        OrientationIntegrator::new(OrientationConfig::default())
    }

    #[test]
    fn test_clamps_at_boundary() {
        let integrator = integrator();
        let max = integrator.config().max_tilt;
        for _ in 0..500 {
            integrator.on_angular_velocity_sample(10.0, -10.0, 0.02);
            let tilt = integrator.current_tilt();
            assert!(tilt.x.abs() <= max && tilt.y.abs() <= max);
        }
        let tilt = integrator.current_tilt();
        assert!((tilt.x - max).abs() < 1e-4);
        assert!((tilt.y + max).abs() < 1e-4);
    }

    #[test]
    fn test_zero_stream_converges_to_zero() {
        let integrator = integrator();
        integrator.set_tilt(Tilt::new(0.3, 0.3));

        let mut previous = integrator.current_tilt().x;
        for _ in 0..50 {
            integrator.on_angular_velocity_sample(0.0, 0.0, 0.02);
            let x = integrator.current_tilt().x;
            // Monotonic decay, never crossing zero
            assert!(x <= previous && x >= 0.0);
            previous = x;
        }
        let tilt = integrator.current_tilt();
        assert!(tilt.x.abs() < 0.01, "tilt.x = {}", tilt.x);
        assert!(tilt.y.abs() < 0.01, "tilt.y = {}", tilt.y);
    }

    #[test]
    fn test_bad_config_is_sanitized() {
        let integrator = OrientationIntegrator::new(OrientationConfig {
            max_tilt: -0.2,
            alpha: f32::NAN,
            ..OrientationConfig::default()
        });
        assert_eq!(integrator.config().max_tilt, 0.2);
        assert_eq!(integrator.config().alpha, OrientationConfig::default().alpha);
        for _ in 0..100 {
            integrator.on_angular_velocity_sample(5.0, -5.0, 0.02);
        }
        let tilt = integrator.current_tilt();
        assert!(tilt.x.abs() <= 0.2 && tilt.y.abs() <= 0.2);

        let integrator = OrientationIntegrator::new(OrientationConfig {
            max_tilt: f32::NAN,
            ..OrientationConfig::default()
        });
        integrator.on_angular_velocity_sample(1.0, 1.0, 0.02);
        assert_eq!(integrator.config().max_tilt, OrientationConfig::default().max_tilt);
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let integrator = integrator();
        let max = integrator.config().max_tilt;
        integrator.on_sample(GyroSample {
            timestamp_ns: i64::MIN,
            x: 1.0,
            y: 1.0,
            z: 0.0,
        });
        integrator.on_sample(GyroSample {
            timestamp_ns: i64::MAX,
            x: 1.0,
            y: 1.0,
            z: 0.0,
        });
        let tilt = integrator.current_tilt();
        assert!(tilt.x > 0.0 && tilt.x <= max);
    }

    #[test]
    fn test_dead_zone_suppresses_drift() {
        let integrator = integrator();
        for _ in 0..1000 {
            integrator.on_angular_velocity_sample(0.005, -0.005, 0.02);
        }
        assert_eq!(integrator.current_tilt(), Tilt::ZERO);
    }

    #[test]
    fn test_reset_zeroes_state() {
        let integrator = integrator();
        for _ in 0..20 {
            integrator.on_angular_velocity_sample(1.0, 1.0, 0.02);
        }
        assert_ne!(integrator.current_tilt(), Tilt::ZERO);
        integrator.reset();
        assert_eq!(integrator.current_tilt(), Tilt::new(0.0, 0.0));
        integrator.on_angular_velocity_sample(0.0, 0.0, 0.02);
        assert_eq!(integrator.current_tilt(), Tilt::ZERO);
    }

    #[test]
    fn test_unavailable_reports_zero() {
        let integrator = OrientationIntegrator::unavailable(OrientationConfig::default());
        assert!(!integrator.is_available());
        integrator.on_angular_velocity_sample(5.0, 5.0, 0.02);
        integrator.set_tilt(Tilt::new(0.2, 0.2));
        assert_eq!(integrator.current_tilt(), Tilt::ZERO);
    }

    #[test]
    fn test_malformed_samples_dropped() {
        let integrator = integrator();
        integrator.on_angular_velocity_sample(f32::NAN, 1.0, 0.02);
        integrator.on_angular_velocity_sample(1.0, 1.0, -0.02);
        integrator.on_angular_velocity_sample(1.0, f32::INFINITY, 0.02);
        assert_eq!(integrator.current_tilt(), Tilt::ZERO);
    }

    #[test]
    fn test_timestamped_samples_derive_dt() {
        let integrator = integrator();
        let sample = |t: i64| GyroSample {
            timestamp_ns: t,
            x: 1.0,
            y: 0.0,
            z: 0.0,
        };
        integrator.on_sample(sample(0));
        assert_eq!(integrator.current_tilt(), Tilt::ZERO);

        // 20 ms later: raw = 0.02, smooth = alpha * 0.02
        integrator.on_sample(sample(20_000_000));
        let expected = 0.1 * 0.02;
        assert!((integrator.current_tilt().x - expected).abs() < 1e-6);

        // Out-of-order sample is ignored
        integrator.on_sample(sample(10_000_000));
        assert!((integrator.current_tilt().x - expected).abs() < 1e-6);
    }

    #[test]
    fn test_long_gap_is_capped() {
        let integrator = integrator();
        // A 5 s stall would otherwise integrate straight to the clamp
        integrator.on_angular_velocity_sample(0.5, 0.0, 5.0);
        let cap = integrator.config().max_dt;
        let expected = integrator.config().alpha * 0.5 * cap;
        assert!((integrator.current_tilt().x - expected).abs() < 1e-6);
    }

    #[test]
    fn test_concurrent_readers_see_bounded_pairs() {
        let integrator = Arc::new(integrator());
        let writer = {
            let integrator = Arc::clone(&integrator);
            thread::spawn(move || {
                for i in 0..5000 {
                    let sign = if (i / 100) % 2 == 0 { 1.0 } else { -1.0 };
                    integrator.on_angular_velocity_sample(sign * 3.0, sign * -2.0, 0.01);
                }
            })
        };
        let max = integrator.config().max_tilt;
        for _ in 0..5000 {
            let tilt = integrator.current_tilt();
            assert!(tilt.x.abs() <= max && tilt.y.abs() <= max);
        }
        writer.join().unwrap();
    }
}
