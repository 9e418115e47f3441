// SPDX-License-Identifier: GPL-3.0-only

//! Frame compositor
//!
//! Runs once per vsync on the render thread. Each frame it pulls the newest
//! camera frame, the current tilt and the latest parameter snapshot, runs
//! the backend's parallax, tone and beauty passes, draws scene overlays and
//! presents the result.
//!
//! ```text
//! Uninitialized ──surface created──▶ SurfaceReady ──frame──▶ Rendering
//!                                          │                  │    ▲
//!                                          └──surface changed─┴─▶ SurfaceChanged
//!                       release() from any state ──▶ Released
//! ```
//!
//! Nothing that happens inside a frame escapes `render_frame`: draw errors
//! and backend panics are logged and the previous good frame is presented
//! again.

pub mod backend;
pub mod beauty;
pub mod cpu_backend;
pub mod frame;
pub mod overlay;
pub mod tone;

pub use backend::{RenderBackend, create_backend};
pub use cpu_backend::CpuBackend;
pub use frame::{
    CameraFrame, CapturingPresenter, FramePresenter, FrameSource, LatestFrameSlot, RenderedFrame,
};
pub use overlay::Projection;

use crate::config::CompositorConfig;
use crate::errors::{PipelineError, PipelineResult};
use crate::params::{ParameterStore, ParameterVector, SnapshotReader};
use crate::performance;
use crate::scene::SceneAdapter;
use crate::sensors::OrientationIntegrator;
use crate::shaders::{FrameUniforms, UniformBatcher};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Lifecycle of the compositor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositorState {
    Uninitialized,
    SurfaceReady,
    Rendering,
    SurfaceChanged,
    Released,
}

/// Why a frame was not presented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No surface yet
    NotReady,
    /// The camera had no frame available
    NoFrame,
    /// Drawing failed and there is no earlier frame to fall back to
    DrawFailed,
    Released,
}

/// Result of one `render_frame` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A freshly composited frame was presented
    Presented,
    /// Drawing failed; the last good frame was presented again
    PresentedPrevious,
    Skipped(SkipReason),
}

type SharedBackend = Arc<Mutex<Option<Box<dyn RenderBackend>>>>;

fn lock_backend(backend: &SharedBackend) -> MutexGuard<'_, Option<Box<dyn RenderBackend>>> {
    backend.lock().unwrap_or_else(|e| e.into_inner())
}

fn release_backend(backend: &SharedBackend, released: &AtomicBool) {
    released.store(true, Ordering::SeqCst);
    // Waits for an in-flight draw, then frees resources before returning
    let mut guard = lock_backend(backend);
    if let Some(mut backend) = guard.take() {
        backend.release();
        info!(backend = backend.name(), "Compositor resources released");
    }
}

/// Releases the compositor's backend from any thread
///
/// Blocks only until a draw in progress finishes; GPU resources are freed
/// before `release` returns.
#[derive(Clone)]
pub struct ReleaseHandle {
    backend: SharedBackend,
    released: Arc<AtomicBool>,
}

impl ReleaseHandle {
    pub fn release(&self) {
        release_backend(&self.backend, &self.released);
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ReleaseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseHandle")
            .field("released", &self.is_released())
            .finish()
    }
}

/// Per-frame compositor driving a [`RenderBackend`]
pub struct FrameCompositor {
    config: CompositorConfig,
    state: CompositorState,
    backend: SharedBackend,
    released: Arc<AtomicBool>,
    orientation: Arc<OrientationIntegrator>,
    params: SnapshotReader,
    scene: Option<Arc<dyn SceneAdapter>>,
    batcher: UniformBatcher,
    projection: Projection,
    viewport: (u32, u32),
    /// Backend initialization failure; frames are passed through untouched
    init_error: Option<PipelineError>,
    effects_enabled: bool,
    last_good: Option<RenderedFrame>,
    frames_presented: u64,
}

impl FrameCompositor {
    pub fn new(
        config: CompositorConfig,
        orientation: Arc<OrientationIntegrator>,
        params: &ParameterStore,
        backend: Box<dyn RenderBackend>,
    ) -> Self {
        Self {
            projection: Projection::new(config.fov_y, config.near_plane, config.far_plane, 1, 1),
            config,
            state: CompositorState::Uninitialized,
            backend: Arc::new(Mutex::new(Some(backend))),
            released: Arc::new(AtomicBool::new(false)),
            orientation,
            params: params.reader(),
            scene: None,
            batcher: UniformBatcher::new(),
            viewport: (0, 0),
            init_error: None,
            effects_enabled: true,
            last_good: None,
            frames_presented: 0,
        }
    }

    /// Draw overlays for anchors from `adapter`
    pub fn with_scene_adapter(mut self, adapter: Arc<dyn SceneAdapter>) -> Self {
        self.scene = Some(adapter);
        self
    }

    pub fn state(&self) -> CompositorState {
        if self.released.load(Ordering::SeqCst) {
            CompositorState::Released
        } else {
            self.state
        }
    }

    /// Why the backend could not be initialized, if it could not
    pub fn init_error(&self) -> Option<&PipelineError> {
        self.init_error.as_ref()
    }

    /// Whether frames are passed through without effects
    pub fn is_degraded(&self) -> bool {
        self.init_error.is_some()
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Turn every effect off (or back on) without touching parameters
    pub fn set_effects_enabled(&mut self, enabled: bool) {
        self.effects_enabled = enabled;
    }

    pub fn release_handle(&self) -> ReleaseHandle {
        ReleaseHandle {
            backend: Arc::clone(&self.backend),
            released: Arc::clone(&self.released),
        }
    }

    /// The GPU context exists: compile programs and allocate resources
    ///
    /// Backend failures do not fail this call. They are kept in
    /// [`init_error`](Self::init_error) and the compositor falls back to
    /// passthrough.
    pub fn on_surface_created(&mut self, width: u32, height: u32) -> PipelineResult<()> {
        match self.state() {
            CompositorState::Uninitialized => {}
            CompositorState::Released => {
                return Err(PipelineError::InvalidState(
                    "surface created after release".to_string(),
                ));
            }
            state => {
                return Err(PipelineError::InvalidState(format!(
                    "surface already created (state {:?})",
                    state
                )));
            }
        }

        {
            let mut guard = lock_backend(&self.backend);
            let Some(backend) = guard.as_mut() else {
                return Err(PipelineError::InvalidState("backend already released".to_string()));
            };
            match backend.initialize() {
                Ok(()) => {
                    backend.resize(width, height);
                    info!(backend = backend.name(), width, height, "Compositor surface ready");
                }
                Err(e) => {
                    error!(backend = backend.name(), error = %e, "Compositor initialization failed, rendering passthrough");
                    self.init_error = Some(e);
                }
            }
        }

        self.set_viewport(width, height);
        self.batcher.invalidate();
        self.state = CompositorState::SurfaceReady;
        Ok(())
    }

    /// Viewport resized: recompute the projection
    pub fn on_surface_changed(&mut self, width: u32, height: u32) -> PipelineResult<()> {
        match self.state() {
            CompositorState::Uninitialized => {
                return Err(PipelineError::InvalidState(
                    "surface changed before it was created".to_string(),
                ));
            }
            CompositorState::Released => {
                return Err(PipelineError::InvalidState(
                    "surface changed after release".to_string(),
                ));
            }
            _ => {}
        }

        if !self.is_degraded() {
            if let Some(backend) = lock_backend(&self.backend).as_mut() {
                backend.resize(width, height);
            }
        }
        self.set_viewport(width, height);
        self.state = CompositorState::SurfaceChanged;
        debug!(width, height, "Compositor surface changed");
        Ok(())
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
        self.projection = Projection::new(
            self.config.fov_y,
            self.config.near_plane,
            self.config.far_plane,
            width,
            height,
        );
    }

    /// Composite and present one frame
    ///
    /// Never blocks on the sensor, parameter or scene producers and never
    /// returns an error.
    pub fn render_frame(
        &mut self,
        source: &dyn FrameSource,
        presenter: &mut dyn FramePresenter,
    ) -> FrameOutcome {
        match self.state() {
            CompositorState::Uninitialized => return FrameOutcome::Skipped(SkipReason::NotReady),
            CompositorState::Released => {
                self.state = CompositorState::Released;
                return FrameOutcome::Skipped(SkipReason::Released);
            }
            _ => {}
        }

        let Some(frame) = source.latest_frame() else {
            return FrameOutcome::Skipped(SkipReason::NoFrame);
        };
        self.state = CompositorState::Rendering;

        match self.draw(&frame) {
            Ok(mut rendered) => {
                self.draw_overlays(&mut rendered);
                presenter.present(&rendered);
                self.frames_presented += 1;
                if self.frames_presented == 1 {
                    debug!(
                        width = rendered.width,
                        height = rendered.height,
                        "First frame presented"
                    );
                }
                self.last_good = Some(rendered);
                FrameOutcome::Presented
            }
            Err(PipelineError::InvalidState(msg)) if self.released.load(Ordering::SeqCst) => {
                debug!(reason = %msg, "Frame dropped during release");
                self.state = CompositorState::Released;
                FrameOutcome::Skipped(SkipReason::Released)
            }
            Err(e) => {
                warn!(sequence = frame.sequence, error = %e, "Frame failed, presenting previous frame");
                match &self.last_good {
                    Some(previous) => {
                        presenter.present(previous);
                        FrameOutcome::PresentedPrevious
                    }
                    None => FrameOutcome::Skipped(SkipReason::DrawFailed),
                }
            }
        }
    }

    fn draw(&mut self, frame: &CameraFrame) -> PipelineResult<RenderedFrame> {
        let rendered = |data: Vec<u8>| RenderedFrame {
            width: frame.width,
            height: frame.height,
            data,
            sequence: frame.sequence,
        };

        if self.is_degraded() {
            return Ok(rendered(frame.data.to_vec()));
        }

        // Copies only: no producer lock is held past this point
        let tilt = self.orientation.current_tilt();
        let (params, _revision) = self.params.latest();
        let uniforms = if self.effects_enabled {
            FrameUniforms::from_parameters(&params, tilt, &self.config, frame.width, frame.height)
        } else {
            FrameUniforms::passthrough(frame.width, frame.height)
        };

        let mut guard = lock_backend(&self.backend);
        let Some(backend) = guard.as_mut() else {
            return Err(PipelineError::InvalidState("backend released".to_string()));
        };

        let batcher = &mut self.batcher;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            batcher.submit(&uniforms, &mut **backend);
            backend.draw(frame)
        }));

        match result {
            Ok(Ok(data)) => Ok(rendered(data)),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                // The backend may have lost its uniforms mid-upload
                self.batcher.invalidate();
                Err(PipelineError::Gpu(format!(
                    "{} backend panicked while drawing",
                    backend.name()
                )))
            }
        }
    }

    fn draw_overlays(&self, rendered: &mut RenderedFrame) {
        let Some(scene) = &self.scene else {
            return;
        };
        let projection = &self.projection;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            scene
                .latest_anchors()
                .map(|anchors| overlay::draw_anchors(rendered, &anchors, projection))
        }));
        match result {
            Ok(Ok(_drawn)) => {}
            Ok(Err(e)) => debug!(error = %e, "Scene anchors unavailable, skipping overlays"),
            Err(_) => warn!("Scene adapter panicked, skipping overlays"),
        }
    }

    /// Run the upload path and one draw on the real backend
    ///
    /// Uses this compositor's config and viewport. A degraded compositor has
    /// nothing to warm up and returns immediately.
    pub fn warmup(&mut self, params: &ParameterVector, iterations: u32) -> PipelineResult<Duration> {
        match self.state() {
            CompositorState::Uninitialized => {
                return Err(PipelineError::InvalidState(
                    "warmup before the surface was created".to_string(),
                ));
            }
            CompositorState::Released => {
                return Err(PipelineError::InvalidState("warmup after release".to_string()));
            }
            _ => {}
        }
        if self.is_degraded() {
            return Ok(Duration::ZERO);
        }

        let (width, height) = self.viewport;
        let start = Instant::now();
        let mut guard = lock_backend(&self.backend);
        let Some(backend) = guard.as_mut() else {
            return Err(PipelineError::InvalidState("backend released".to_string()));
        };

        let config = &self.config;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            performance::warmup_uploads(&mut **backend, params, config, width, height, iterations);
            // First dispatch is where drivers finish linking
            backend.draw(&CameraFrame::solid(width, height, [128, 128, 128, 255]))
        }));
        // The backend holds the warmup block now, not the batcher's
        self.batcher.invalidate();

        match result {
            Ok(Ok(_)) => Ok(start.elapsed()),
            Ok(Err(e)) => {
                debug!(error = %e, "Warmup draw failed");
                Ok(start.elapsed())
            }
            Err(_) => Err(PipelineError::Gpu(format!(
                "{} backend panicked during warmup",
                backend.name()
            ))),
        }
    }

    /// Free backend resources now; later frames are skipped
    pub fn release(&mut self) {
        release_backend(&self.backend, &self.released);
        self.state = CompositorState::Released;
        self.last_good = None;
    }
}

impl Drop for FrameCompositor {
    fn drop(&mut self) {
        if !self.released.load(Ordering::SeqCst) {
            release_backend(&self.backend, &self.released);
        }
    }
}

impl std::fmt::Debug for FrameCompositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCompositor")
            .field("state", &self.state())
            .field("viewport", &self.viewport)
            .field("degraded", &self.is_degraded())
            .field("frames_presented", &self.frames_presented)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrientationConfig;
    use crate::params::{ChannelId, ParameterVector};
    use crate::shaders::UniformSink;

    fn neutral_store() -> ParameterStore {
        let mut params = ParameterVector::new();
        params.set(ChannelId::Beauty, 0.0);
        ParameterStore::new(params)
    }

    fn compositor(backend: Box<dyn RenderBackend>) -> FrameCompositor {
        FrameCompositor::new(
            CompositorConfig::default(),
            Arc::new(OrientationIntegrator::new(OrientationConfig::default())),
            &neutral_store(),
            backend,
        )
    }

    /// Fails every draw after the first `ok_frames`
    struct FlakyBackend {
        ok_frames: u32,
        panic_instead: bool,
    }

    impl UniformSink for FlakyBackend {
        fn upload_uniforms(&mut self, _uniforms: &FrameUniforms) {}
    }

    impl RenderBackend for FlakyBackend {
        fn name(&self) -> &'static str {
            "flaky"
        }
        fn initialize(&mut self) -> PipelineResult<()> {
            Ok(())
        }
        fn resize(&mut self, _width: u32, _height: u32) {}
        fn draw(&mut self, frame: &CameraFrame) -> PipelineResult<Vec<u8>> {
            if self.ok_frames == 0 {
                if self.panic_instead {
                    panic!("driver lost");
                }
                return Err(PipelineError::Gpu("device lost".to_string()));
            }
            self.ok_frames -= 1;
            Ok(frame.data.to_vec())
        }
        fn release(&mut self) {}
    }

    /// Logs every upload and draw it receives
    #[derive(Clone, Default)]
    struct RecordingBackend {
        uploads: Arc<Mutex<Vec<FrameUniforms>>>,
        draws: Arc<Mutex<u32>>,
    }

    impl UniformSink for RecordingBackend {
        fn upload_uniforms(&mut self, uniforms: &FrameUniforms) {
            self.uploads.lock().unwrap().push(*uniforms);
        }
    }

    impl RenderBackend for RecordingBackend {
        fn name(&self) -> &'static str {
            "recording"
        }
        fn initialize(&mut self) -> PipelineResult<()> {
            Ok(())
        }
        fn resize(&mut self, _width: u32, _height: u32) {}
        fn draw(&mut self, frame: &CameraFrame) -> PipelineResult<Vec<u8>> {
            *self.draws.lock().unwrap() += 1;
            Ok(frame.data.to_vec())
        }
        fn release(&mut self) {}
    }

    #[test]
    fn test_warmup_runs_on_owned_backend() {
        let backend = RecordingBackend::default();
        let mut c = compositor(Box::new(backend.clone()));
        let params = ParameterVector::new();
        assert!(matches!(
            c.warmup(&params, 4),
            Err(PipelineError::InvalidState(_))
        ));

        c.on_surface_created(6, 4).unwrap();
        c.warmup(&params, 4).unwrap();
        {
            let uploads = backend.uploads.lock().unwrap();
            assert_eq!(uploads.len(), 4);
            let last = uploads[3];
            assert_eq!((last.width, last.height), (6, 4));
            assert_eq!(last.parallax, [0.0, 0.0]);
        }
        assert_eq!(*backend.draws.lock().unwrap(), 1);

        // The first real frame uploads its own block again
        let slot = LatestFrameSlot::new();
        slot.publish(CameraFrame::solid(6, 4, [1, 2, 3, 255]));
        let mut presenter = CapturingPresenter::default();
        assert_eq!(c.render_frame(&slot, &mut presenter), FrameOutcome::Presented);
        assert_eq!(backend.uploads.lock().unwrap().len(), 5);

        c.release();
        assert!(c.warmup(&params, 4).is_err());
    }

    #[test]
    fn test_skips_until_surface_created() {
        let mut c = compositor(Box::new(CpuBackend::new()));
        let slot = LatestFrameSlot::new();
        slot.publish(CameraFrame::solid(2, 2, [10, 20, 30, 255]));
        let mut presenter = CapturingPresenter::default();

        assert_eq!(
            c.render_frame(&slot, &mut presenter),
            FrameOutcome::Skipped(SkipReason::NotReady)
        );
        assert!(c.on_surface_changed(4, 4).is_err());

        c.on_surface_created(2, 2).unwrap();
        assert_eq!(c.state(), CompositorState::SurfaceReady);
        assert_eq!(c.render_frame(&slot, &mut presenter), FrameOutcome::Presented);
        assert_eq!(c.state(), CompositorState::Rendering);
    }

    #[test]
    fn test_no_frame_is_skipped() {
        let mut c = compositor(Box::new(CpuBackend::new()));
        c.on_surface_created(2, 2).unwrap();
        let mut presenter = CapturingPresenter::default();
        assert_eq!(
            c.render_frame(&LatestFrameSlot::new(), &mut presenter),
            FrameOutcome::Skipped(SkipReason::NoFrame)
        );
        assert_eq!(presenter.presented, 0);
    }

    #[test]
    fn test_failed_draw_presents_previous_frame() {
        let mut c = compositor(Box::new(FlakyBackend {
            ok_frames: 1,
            panic_instead: false,
        }));
        c.on_surface_created(1, 1).unwrap();
        let slot = LatestFrameSlot::new();
        let mut presenter = CapturingPresenter::default();

        slot.publish(CameraFrame::solid(1, 1, [1, 2, 3, 4]));
        assert_eq!(c.render_frame(&slot, &mut presenter), FrameOutcome::Presented);
        slot.publish(CameraFrame::solid(1, 1, [9, 9, 9, 9]));
        assert_eq!(
            c.render_frame(&slot, &mut presenter),
            FrameOutcome::PresentedPrevious
        );
        assert_eq!(presenter.last.as_ref().map(|f| f.pixel(0, 0)), Some([1, 2, 3, 4]));
    }

    #[test]
    fn test_backend_panic_does_not_escape() {
        let mut c = compositor(Box::new(FlakyBackend {
            ok_frames: 0,
            panic_instead: true,
        }));
        c.on_surface_created(1, 1).unwrap();
        let slot = LatestFrameSlot::new();
        slot.publish(CameraFrame::solid(1, 1, [1, 2, 3, 4]));
        let mut presenter = CapturingPresenter::default();

        assert_eq!(
            c.render_frame(&slot, &mut presenter),
            FrameOutcome::Skipped(SkipReason::DrawFailed)
        );
        // The loop keeps going
        assert_eq!(
            c.render_frame(&slot, &mut presenter),
            FrameOutcome::Skipped(SkipReason::DrawFailed)
        );
    }

    #[test]
    fn test_release_is_terminal() {
        let mut c = compositor(Box::new(CpuBackend::new()));
        c.on_surface_created(2, 2).unwrap();
        c.release();
        assert_eq!(c.state(), CompositorState::Released);
        assert!(c.on_surface_changed(2, 2).is_err());
        assert!(c.on_surface_created(2, 2).is_err());

        let slot = LatestFrameSlot::new();
        slot.publish(CameraFrame::solid(2, 2, [0; 4]));
        let mut presenter = CapturingPresenter::default();
        assert_eq!(
            c.render_frame(&slot, &mut presenter),
            FrameOutcome::Skipped(SkipReason::Released)
        );
    }

    #[test]
    fn test_effects_disabled_passes_frame_through() {
        let store = neutral_store();
        store.update(|p| {
            p.set(ChannelId::Contrast, 0.8);
        });
        let mut c = FrameCompositor::new(
            CompositorConfig::default(),
            Arc::new(OrientationIntegrator::new(OrientationConfig::default())),
            &store,
            Box::new(CpuBackend::new()),
        );
        c.on_surface_created(1, 1).unwrap();
        c.set_effects_enabled(false);

        let slot = LatestFrameSlot::new();
        slot.publish(CameraFrame::solid(1, 1, [40, 80, 120, 255]));
        let mut presenter = CapturingPresenter::default();
        c.render_frame(&slot, &mut presenter);
        assert_eq!(
            presenter.last.map(|f| f.pixel(0, 0)),
            Some([40, 80, 120, 255])
        );
    }
}
