// SPDX-License-Identifier: GPL-3.0-only

//! Frame-time governor
//!
//! Measures render calls and reports per-window statistics. It only
//! observes: removing it changes timing visibility, never pixels.

use crate::compositor::FrameCompositor;
use crate::config::{CompositorConfig, PerformanceConfig};
use crate::errors::PipelineResult;
use crate::params::ParameterVector;
use crate::sensors::Tilt;
use crate::shaders::{FrameUniforms, UniformSink};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Statistics for one measurement window
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PerformanceStats {
    pub avg_frame_time_ms: f64,
    /// Frame rate the measured frame cost would sustain
    pub fps: f64,
    pub over_budget: bool,
    pub is_performance_good: bool,
    /// Frames in the window
    pub frames: u32,
}

#[derive(Debug)]
pub struct PerformanceGovernor {
    config: PerformanceConfig,
    budget_ms: f64,
    window_frames: u32,
    window_total: Duration,
    window_started: Instant,
    last_window: Option<PerformanceStats>,
    over_budget_windows: u32,
    total_frames: u64,
}

impl PerformanceGovernor {
    pub fn new(config: PerformanceConfig) -> Self {
        Self {
            budget_ms: config.frame_budget_ms(),
            config,
            window_frames: 0,
            window_total: Duration::ZERO,
            window_started: Instant::now(),
            last_window: None,
            over_budget_windows: 0,
            total_frames: 0,
        }
    }

    pub fn frame_budget_ms(&self) -> f64 {
        self.budget_ms
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Run `frame` and record how long it took
    pub fn measure<T>(&mut self, frame: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = frame();
        self.record(start.elapsed());
        result
    }

    /// Record one frame's cost; returns the window statistics when a window closes
    pub fn record(&mut self, elapsed: Duration) -> Option<PerformanceStats> {
        self.window_frames += 1;
        self.window_total += elapsed;
        self.total_frames += 1;

        let frames_due = self.window_frames >= self.config.stats_interval_frames.max(1);
        let time_due = self.window_started.elapsed() >= self.config.stats_interval();
        if !(frames_due || time_due) {
            return None;
        }

        let stats = self.window_stats();
        if stats.over_budget {
            self.over_budget_windows += 1;
            warn!(
                avg_frame_time_ms = stats.avg_frame_time_ms,
                fps = stats.fps,
                budget_ms = self.budget_ms,
                frames = stats.frames,
                consecutive = self.over_budget_windows,
                "Frame budget exceeded"
            );
        } else {
            self.over_budget_windows = 0;
            debug!(
                avg_frame_time_ms = stats.avg_frame_time_ms,
                fps = stats.fps,
                frames = stats.frames,
                "Frame timing"
            );
        }

        self.last_window = Some(stats);
        self.window_frames = 0;
        self.window_total = Duration::ZERO;
        self.window_started = Instant::now();
        Some(stats)
    }

    fn window_stats(&self) -> PerformanceStats {
        if self.window_frames == 0 {
            return PerformanceStats {
                is_performance_good: true,
                ..PerformanceStats::default()
            };
        }
        let avg = self.window_total.as_secs_f64() * 1000.0 / f64::from(self.window_frames);
        let over_budget = avg > self.budget_ms;
        PerformanceStats {
            avg_frame_time_ms: avg,
            fps: if avg > 0.0 { 1000.0 / avg } else { 0.0 },
            over_budget,
            is_performance_good: !over_budget,
            frames: self.window_frames,
        }
    }

    /// Statistics of the open window, or of the last closed one when the
    /// open window is empty
    pub fn get_performance_stats(&self) -> PerformanceStats {
        match self.last_window {
            Some(last) if self.window_frames == 0 => last,
            _ => self.window_stats(),
        }
    }

    /// Whether enough consecutive windows ran over budget that the host
    /// should lower quality. Advisory only.
    pub fn should_degrade(&self) -> bool {
        self.over_budget_windows >= self.config.degrade_after_windows.max(1)
    }

    /// Warm up the backend `compositor` renders with, before its first frame
    ///
    /// Call after `on_surface_created`. Warmup frames are not counted.
    pub fn warmup(
        &mut self,
        compositor: &mut FrameCompositor,
        params: &ParameterVector,
        iterations: u32,
    ) -> PipelineResult<Duration> {
        let elapsed = compositor.warmup(params, iterations)?;
        debug!(
            iterations,
            warmup_ms = elapsed.as_secs_f64() * 1000.0,
            budget_ms = self.budget_ms,
            "Compositor warmup complete"
        );
        Ok(elapsed)
    }
}

/// Upload `iterations` uniform blocks built from `params` into `sink`
///
/// The last upload is exactly `params` at rest, so the first real frame
/// sees the same state it would have without a warmup.
pub fn warmup_uploads<S: UniformSink + ?Sized>(
    sink: &mut S,
    params: &ParameterVector,
    config: &CompositorConfig,
    width: u32,
    height: u32,
    iterations: u32,
) {
    for i in 0..iterations {
        // Vary the tilt so drivers cannot elide repeated identical uploads
        let t = if i + 1 == iterations {
            0.0
        } else {
            (i as f32 + 1.0) * 1e-3
        };
        let uniforms = FrameUniforms::from_parameters(params, Tilt::new(t, -t), config, width, height);
        sink.upload_uniforms(&uniforms);
    }
}

impl Default for PerformanceGovernor {
    fn default() -> Self {
        Self::new(PerformanceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingSink {
        uploads: u32,
        last: Option<FrameUniforms>,
    }

    impl UniformSink for CountingSink {
        fn upload_uniforms(&mut self, uniforms: &FrameUniforms) {
            self.uploads += 1;
            self.last = Some(*uniforms);
        }
    }

    fn governor(frames: u32) -> PerformanceGovernor {
        PerformanceGovernor::new(PerformanceConfig {
            stats_interval_frames: frames,
            stats_interval_ms: 60_000,
            ..PerformanceConfig::default()
        })
    }

    #[test]
    fn test_slow_frames_are_over_budget() {
        let mut g = governor(5);
        let mut closed = None;
        for _ in 0..5 {
            closed = g.record(Duration::from_millis(20));
        }
        let stats = closed.unwrap();
        assert_eq!(stats.frames, 5);
        assert!((stats.avg_frame_time_ms - 20.0).abs() < 1e-9);
        assert!((stats.fps - 50.0).abs() < 1e-9);
        assert!(stats.over_budget);
        assert!(!g.get_performance_stats().is_performance_good);
    }

    #[test]
    fn test_fast_frames_are_good() {
        let mut g = governor(10);
        for _ in 0..4 {
            assert!(g.record(Duration::from_millis(5)).is_none());
        }
        let stats = g.get_performance_stats();
        assert_eq!(stats.frames, 4);
        assert!(stats.is_performance_good);
        assert!(!g.should_degrade());
    }

    #[test]
    fn test_degrade_after_consecutive_windows() {
        let mut g = governor(2);
        let degrade_after = PerformanceConfig::default().degrade_after_windows;
        for _ in 0..degrade_after * 2 {
            g.record(Duration::from_millis(30));
        }
        assert!(g.should_degrade());

        // One good window resets the count
        g.record(Duration::from_millis(1));
        g.record(Duration::from_millis(1));
        assert!(!g.should_degrade());
    }

    #[test]
    fn test_measure_returns_result() {
        let mut g = governor(100);
        assert_eq!(g.measure(|| 7), 7);
        assert_eq!(g.total_frames(), 1);
    }

    #[test]
    fn test_warmup_uploads_end_at_rest() {
        let mut sink = CountingSink::default();
        let params = ParameterVector::new();
        warmup_uploads(&mut sink, &params, &CompositorConfig::default(), 64, 48, 8);
        assert_eq!(sink.uploads, 8);
        let last = sink.last.unwrap();
        assert_eq!(last.parallax, [0.0, 0.0]);
        assert_eq!((last.width, last.height), (64, 48));
    }
}
