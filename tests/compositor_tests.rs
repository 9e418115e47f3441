// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the frame compositor

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use yanbao_camera::compositor::tone::{self, Rgb};
use yanbao_camera::compositor::{
    CameraFrame, CapturingPresenter, CompositorState, CpuBackend, FrameCompositor, FrameOutcome,
    LatestFrameSlot, RenderBackend, SkipReason, beauty,
};
use yanbao_camera::config::{CompositorConfig, OrientationConfig};
use yanbao_camera::errors::{PipelineError, PipelineResult, ShaderError};
use yanbao_camera::params::{ChannelId, ParameterStore, ParameterVector};
use yanbao_camera::scene::{
    AnchorKind, Pose, SceneAdapter, SceneAnchor, SnapshotSceneAdapter, TrackingState,
};
use yanbao_camera::sensors::{OrientationIntegrator, Tilt};
use yanbao_camera::shaders::{FrameUniforms, UniformSink};

const PLANE_COLOR: [u8; 4] = [64, 220, 255, 255];

fn neutral_store() -> ParameterStore {
    let mut params = ParameterVector::new();
    params.set(ChannelId::Beauty, 0.0);
    ParameterStore::new(params)
}

fn gradient(width: u32, height: u32) -> CameraFrame {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&[
                (x * 255 / width.max(2).saturating_sub(1)) as u8,
                (y * 255 / height.max(2).saturating_sub(1)) as u8,
                128,
                255,
            ]);
        }
    }
    CameraFrame::new(width, height, data, 1).unwrap()
}

fn compositor_with(
    store: &ParameterStore,
    orientation: Arc<OrientationIntegrator>,
    backend: Box<dyn RenderBackend>,
) -> FrameCompositor {
    FrameCompositor::new(CompositorConfig::default(), orientation, store, backend)
}

fn still_integrator() -> Arc<OrientationIntegrator> {
    Arc::new(OrientationIntegrator::new(OrientationConfig::default()))
}

fn render_once(compositor: &mut FrameCompositor, frame: CameraFrame) -> (FrameOutcome, CapturingPresenter) {
    let slot = LatestFrameSlot::new();
    slot.publish(frame);
    let mut presenter = CapturingPresenter::default();
    let outcome = compositor.render_frame(&slot, &mut presenter);
    (outcome, presenter)
}

/// Backend whose shader never compiles
struct BrokenShaderBackend;

impl UniformSink for BrokenShaderBackend {
    fn upload_uniforms(&mut self, _uniforms: &FrameUniforms) {}
}

impl RenderBackend for BrokenShaderBackend {
    fn name(&self) -> &'static str {
        "broken"
    }
    fn initialize(&mut self) -> PipelineResult<()> {
        Err(ShaderError::new("tone_main", "error: unknown identifier `lumaa`").into())
    }
    fn resize(&mut self, _width: u32, _height: u32) {}
    fn draw(&mut self, _frame: &CameraFrame) -> PipelineResult<Vec<u8>> {
        panic!("draw must not be called on a backend that failed to initialize");
    }
    fn release(&mut self) {}
}

/// Adapter whose detector always fails
struct FailingAdapter;

impl SceneAdapter for FailingAdapter {
    fn latest_anchors(&self) -> PipelineResult<Arc<Vec<SceneAnchor>>> {
        Err(PipelineError::Frame("detector returned malformed data".to_string()))
    }
    fn start(&self) {}
    fn pause(&self) {}
    fn resume(&self) {}
    fn stop(&self) {}
    fn state(&self) -> yanbao_camera::scene::AdapterState {
        yanbao_camera::scene::AdapterState::Running
    }
}

#[test]
fn test_neutral_parameters_are_identity() {
    let store = neutral_store();
    let mut compositor = compositor_with(&store, still_integrator(), Box::new(CpuBackend::new()));
    compositor.on_surface_created(16, 8).unwrap();

    let frame = gradient(16, 8);
    let (outcome, presenter) = render_once(&mut compositor, frame.clone());
    assert_eq!(outcome, FrameOutcome::Presented);
    assert_eq!(presenter.last.unwrap().data, frame.data.to_vec());
}

#[test]
fn test_parameter_edit_visible_next_frame() {
    let store = neutral_store();
    let mut compositor = compositor_with(&store, still_integrator(), Box::new(CpuBackend::new()));
    compositor.on_surface_created(8, 8).unwrap();
    let frame = gradient(8, 8);

    let (_, before) = render_once(&mut compositor, frame.clone());
    store.update(|p| {
        p.set(ChannelId::Saturation, -1.0);
    });
    let (_, after) = render_once(&mut compositor, frame);

    let before = before.last.unwrap();
    let after = after.last.unwrap();
    assert_ne!(before.data, after.data);
    // Fully desaturated: every pixel is gray
    for y in 0..8 {
        for x in 0..8 {
            let [r, g, b, _] = after.pixel(x, y);
            assert!(r.abs_diff(g) <= 1 && g.abs_diff(b) <= 1, "pixel ({x}, {y}) not gray");
        }
    }
}

#[test]
fn test_tilt_shifts_image() {
    let store = neutral_store();
    let orientation = still_integrator();
    let mut compositor = compositor_with(&store, Arc::clone(&orientation), Box::new(CpuBackend::new()));
    compositor.on_surface_created(32, 4).unwrap();
    let frame = gradient(32, 4);

    orientation.set_tilt(Tilt::new(0.5, 0.0));
    let (_, presenter) = render_once(&mut compositor, frame.clone());
    let shifted = presenter.last.unwrap();
    assert_ne!(shifted.data, frame.data.to_vec());
    // Sampling moves right, so the left edge now shows brighter red
    assert!(shifted.pixel(0, 0)[0] > frame.data[0]);
}

#[test]
fn test_tone_output_stays_in_unit_range() {
    let mut rng = StdRng::seed_from_u64(0x5eed_cafe);

    for _ in 0..2000 {
        let mut params = ParameterVector::new();
        for channel in ChannelId::ALL {
            // Out-of-domain inputs exercise clamping too
            params.set(channel, rng.random_range(-2.0..2.0));
        }
        let u = FrameUniforms::from_parameters(
            &params,
            Tilt::ZERO,
            &CompositorConfig::default(),
            64,
            64,
        );
        let color: Rgb = [rng.random(), rng.random(), rng.random()];
        let uv = [rng.random(), rng.random()];

        let out = tone::apply_tone(color, &u, uv);
        for v in out {
            assert!((0.0..=1.0).contains(&v), "tone produced {v} from {color:?}");
        }
    }
}

#[test]
fn test_beauty_output_stays_in_unit_range() {
    let mut rng = StdRng::seed_from_u64(42);
    let (width, height) = (6u32, 5u32);

    for _ in 0..200 {
        let image: Vec<Rgb> = (0..width * height)
            .map(|_| [rng.random(), rng.random(), rng.random()])
            .collect();
        let mut params = ParameterVector::new();
        for channel in [
            ChannelId::Beauty,
            ChannelId::Smoothing,
            ChannelId::Whitening,
            ChannelId::Redness,
        ] {
            params.set(channel, rng.random_range(-0.5..1.5));
        }
        let u = FrameUniforms::from_parameters(
            &params,
            Tilt::ZERO,
            &CompositorConfig::default(),
            width,
            height,
        );
        let x = rng.random_range(0..width);
        let y = rng.random_range(0..height);

        let out = beauty::apply_beauty(&image, width, height, x, y, &u);
        for v in out {
            assert!((0.0..=1.0).contains(&v), "beauty produced {v}");
        }
    }
}

#[test]
fn test_shader_failure_degrades_to_passthrough() {
    let store = neutral_store();
    store.update(|p| {
        p.set(ChannelId::Contrast, 0.9);
    });
    let mut compositor = compositor_with(&store, still_integrator(), Box::new(BrokenShaderBackend));

    compositor.on_surface_created(4, 4).unwrap();
    assert!(compositor.is_degraded());
    match compositor.init_error() {
        Some(PipelineError::Shader(e)) => {
            assert_eq!(e.stage, "tone_main");
            assert!(e.log.contains("unknown identifier"));
        }
        other => panic!("expected shader error, got {other:?}"),
    }

    let frame = gradient(4, 4);
    let (outcome, presenter) = render_once(&mut compositor, frame.clone());
    assert_eq!(outcome, FrameOutcome::Presented);
    assert_eq!(presenter.last.unwrap().data, frame.data.to_vec());
}

#[test]
fn test_release_from_another_thread() {
    let store = neutral_store();
    let mut compositor = compositor_with(&store, still_integrator(), Box::new(CpuBackend::new()));
    compositor.on_surface_created(32, 32).unwrap();
    let handle = compositor.release_handle();

    let slot = LatestFrameSlot::new();
    slot.publish(gradient(32, 32));
    let mut presenter = CapturingPresenter::default();

    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        handle.release();
        handle.is_released()
    });

    // Keep rendering until the release lands; the loop must never panic
    let mut outcome = FrameOutcome::Presented;
    for _ in 0..10_000 {
        outcome = compositor.render_frame(&slot, &mut presenter);
        if outcome == FrameOutcome::Skipped(SkipReason::Released) {
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }

    assert!(releaser.join().unwrap());
    assert_eq!(outcome, FrameOutcome::Skipped(SkipReason::Released));
    assert_eq!(compositor.state(), CompositorState::Released);
    assert!(compositor.on_surface_changed(8, 8).is_err());
}

#[test]
fn test_surface_change_updates_projection() {
    let store = neutral_store();
    let mut compositor = compositor_with(&store, still_integrator(), Box::new(CpuBackend::new()));
    compositor.on_surface_created(100, 100).unwrap();
    let square = *compositor.projection();

    compositor.on_surface_changed(200, 100).unwrap();
    assert_eq!(compositor.state(), CompositorState::SurfaceChanged);
    assert_ne!(*compositor.projection(), square);

    let (outcome, _) = render_once(&mut compositor, gradient(4, 4));
    assert_eq!(outcome, FrameOutcome::Presented);
    assert_eq!(compositor.state(), CompositorState::Rendering);
}

#[test]
fn test_plane_overlay_is_drawn() {
    let store = neutral_store();
    let adapter = Arc::new(SnapshotSceneAdapter::new("planes"));
    adapter.start();
    adapter.publish(vec![SceneAnchor {
        id: 3,
        pose: Pose::from_translation([0.0, -0.5, -2.0]),
        tracking: TrackingState::Tracking,
        kind: AnchorKind::Plane {
            extent_x: 1.0,
            extent_z: 1.0,
        },
    }]);

    let mut compositor = compositor_with(&store, still_integrator(), Box::new(CpuBackend::new()))
        .with_scene_adapter(adapter.clone());
    compositor.on_surface_created(64, 64).unwrap();

    let (_, presenter) = render_once(&mut compositor, CameraFrame::solid(64, 64, [0, 0, 0, 255]));
    let frame = presenter.last.unwrap();
    assert!(frame.data.chunks(4).any(|p| p == PLANE_COLOR));

    // Stopped adapters contribute nothing
    adapter.stop();
    let (_, presenter) = render_once(&mut compositor, CameraFrame::solid(64, 64, [0, 0, 0, 255]));
    assert!(!presenter.last.unwrap().data.chunks(4).any(|p| p == PLANE_COLOR));
}

#[test]
fn test_scene_errors_do_not_drop_frames() {
    let store = neutral_store();
    let mut compositor = compositor_with(&store, still_integrator(), Box::new(CpuBackend::new()))
        .with_scene_adapter(Arc::new(FailingAdapter));
    compositor.on_surface_created(4, 4).unwrap();

    let frame = gradient(4, 4);
    let (outcome, presenter) = render_once(&mut compositor, frame.clone());
    assert_eq!(outcome, FrameOutcome::Presented);
    assert_eq!(presenter.last.unwrap().data, frame.data.to_vec());
}
