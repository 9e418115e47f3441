// SPDX-License-Identifier: GPL-3.0-only

//! Camera frames in and composited frames out

use crate::errors::{PipelineError, PipelineResult};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// A camera preview frame (RGBA8, tightly packed)
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    /// Frame data (Arc for cheap cloning between slot and render thread)
    pub data: Arc<[u8]>,
    /// Monotonic frame counter from the camera source
    pub sequence: u64,
    /// Timestamp when frame was captured (for latency diagnostics)
    pub captured_at: Instant,
}

impl CameraFrame {
    pub fn new(
        width: u32,
        height: u32,
        data: impl Into<Arc<[u8]>>,
        sequence: u64,
    ) -> PipelineResult<Self> {
        let frame = Self {
            width,
            height,
            data: data.into(),
            sequence,
            captured_at: Instant::now(),
        };
        frame.check_layout()?;
        Ok(frame)
    }

    /// Check `data` against the declared size
    ///
    /// The fields are public, so backends re-check before touching pixels.
    pub fn check_layout(&self) -> PipelineResult<()> {
        let expected = self.width as usize * self.height as usize * 4;
        if self.width == 0 || self.height == 0 || self.data.len() != expected {
            return Err(PipelineError::Frame(format!(
                "frame data is {} bytes, expected {} for {}x{}",
                self.data.len(),
                expected,
                self.width,
                self.height
            )));
        }
        Ok(())
    }

    /// Uniform color frame, mostly for tests and warmup
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data: Vec<u8> = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            data: Arc::from(data),
            sequence: 0,
            captured_at: Instant::now(),
        }
    }
}

/// A composited frame ready to present
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    /// Sequence of the camera frame this was rendered from
    pub sequence: u64,
}

impl RenderedFrame {
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }
}

/// Pull side of the camera stream
pub trait FrameSource {
    /// Latest available frame, without blocking
    fn latest_frame(&self) -> Option<CameraFrame>;
}

/// Render target
pub trait FramePresenter {
    fn present(&mut self, frame: &RenderedFrame);
}

/// Single-slot mailbox between the camera callback and the render thread
///
/// The camera overwrites the slot; the renderer reads whatever is newest.
/// Frames the renderer never saw are dropped.
#[derive(Debug, Default)]
pub struct LatestFrameSlot {
    slot: Mutex<Option<CameraFrame>>,
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: CameraFrame) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(frame);
    }

    pub fn clear(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }
}

impl FrameSource for LatestFrameSlot {
    fn latest_frame(&self) -> Option<CameraFrame> {
        // Contended: the camera is writing right now, skip rather than wait
        let slot = self.slot.try_lock().ok()?;
        slot.clone()
    }
}

/// Presenter that keeps the last frame, for hosts that read back pixels
#[derive(Debug, Default)]
pub struct CapturingPresenter {
    pub last: Option<RenderedFrame>,
    pub presented: u64,
}

impl FramePresenter for CapturingPresenter {
    fn present(&mut self, frame: &RenderedFrame) {
        self.last = Some(frame.clone());
        self.presented += 1;
    }
}
