// SPDX-License-Identifier: GPL-3.0-only

//! Scene-understanding adapter contract
//!
//! Plane and face detectors live outside the render core. They hand anchors
//! to the compositor through a [`SceneAdapter`]; the compositor reads one
//! snapshot per frame and never mutates or tracks anchors itself. Temporal
//! identity is the detector's job, signaled by a stable anchor id.

use crate::errors::PipelineResult;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Detector tracking state for an anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    Tracking,
    Paused,
    Stopped,
}

/// Rigid transform in camera space (meters, unit quaternion x, y, z, w)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub translation: [f32; 3],
    pub rotation: [f32; 4],
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        translation: [0.0; 3],
        rotation: [0.0, 0.0, 0.0, 1.0],
    };

    pub fn from_translation(translation: [f32; 3]) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }
}

/// Axis-aligned box in normalized image coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Detector-specific anchor payload
#[derive(Debug, Clone, PartialEq)]
pub enum AnchorKind {
    /// Horizontal or vertical plane centered on the pose, extents in meters
    Plane { extent_x: f32, extent_z: f32 },
    /// Face with named landmarks in anchor-local space
    Face {
        landmarks: BTreeMap<String, [f32; 3]>,
        bounding_box: FrameRegion,
    },
}

/// A tracked real-world reference
#[derive(Debug, Clone, PartialEq)]
pub struct SceneAnchor {
    /// Stable across frames while the detector tracks the same object
    pub id: u64,
    pub pose: Pose,
    pub tracking: TrackingState,
    pub kind: AnchorKind,
}

impl SceneAnchor {
    pub fn is_tracking(&self) -> bool {
        self.tracking == TrackingState::Tracking
    }
}

/// Adapter lifecycle, following the host's visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Idle,
    Running,
    Paused,
    Stopped,
}

/// Source of scene anchors for the compositor
///
/// Every method must be safe to call from any thread at any time and must
/// never block the caller on detector work.
pub trait SceneAdapter: Send + Sync {
    /// Snapshot of the current anchors. Errors are per-frame and transient.
    fn latest_anchors(&self) -> PipelineResult<Arc<Vec<SceneAnchor>>>;

    fn start(&self);
    fn pause(&self);
    fn resume(&self);
    /// Stop and drop every retained anchor
    fn stop(&self);

    fn state(&self) -> AdapterState;
}

#[derive(Debug)]
struct SnapshotState {
    lifecycle: AdapterState,
    anchors: Arc<Vec<SceneAnchor>>,
}

/// Adapter an external detector pushes snapshots into
///
/// Anchors are only served while running; paused or stopped adapters return
/// an empty snapshot.
#[derive(Debug)]
pub struct SnapshotSceneAdapter {
    name: String,
    state: Mutex<SnapshotState>,
}

impl SnapshotSceneAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(SnapshotState {
                lifecycle: AdapterState::Idle,
                anchors: Arc::new(Vec::new()),
            }),
        }
    }

    /// Replace the snapshot (detector thread). Ignored unless running.
    pub fn publish(&self, anchors: Vec<SceneAnchor>) {
        let mut state = self.lock();
        if state.lifecycle != AdapterState::Running {
            debug!(adapter = %self.name, "Dropping anchors published while not running");
            return;
        }
        state.anchors = Arc::new(anchors);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SnapshotState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(&self, to: AdapterState) {
        let mut state = self.lock();
        if state.lifecycle == to {
            return;
        }
        info!(adapter = %self.name, from = ?state.lifecycle, to = ?to, "Scene adapter state change");
        state.lifecycle = to;
        if to == AdapterState::Stopped {
            state.anchors = Arc::new(Vec::new());
        }
    }
}

impl SceneAdapter for SnapshotSceneAdapter {
    fn latest_anchors(&self) -> PipelineResult<Arc<Vec<SceneAnchor>>> {
        let state = self.lock();
        if state.lifecycle == AdapterState::Running {
            Ok(Arc::clone(&state.anchors))
        } else {
            Ok(Arc::new(Vec::new()))
        }
    }

    fn start(&self) {
        self.transition(AdapterState::Running);
    }

    fn pause(&self) {
        if self.state() == AdapterState::Running {
            self.transition(AdapterState::Paused);
        }
    }

    fn resume(&self) {
        if self.state() == AdapterState::Paused {
            self.transition(AdapterState::Running);
        }
    }

    fn stop(&self) {
        self.transition(AdapterState::Stopped);
    }

    fn state(&self) -> AdapterState {
        self.lock().lifecycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane(id: u64, tracking: TrackingState) -> SceneAnchor {
        SceneAnchor {
            id,
            pose: Pose::from_translation([0.0, -1.0, -2.0]),
            tracking,
            kind: AnchorKind::Plane {
                extent_x: 1.0,
                extent_z: 1.0,
            },
        }
    }

    #[test]
    fn test_serves_only_while_running() {
        let adapter = SnapshotSceneAdapter::new("planes");
        adapter.publish(vec![plane(1, TrackingState::Tracking)]);
        assert!(adapter.latest_anchors().unwrap().is_empty());

        adapter.start();
        adapter.publish(vec![plane(1, TrackingState::Tracking)]);
        assert_eq!(adapter.latest_anchors().unwrap().len(), 1);

        adapter.pause();
        assert!(adapter.latest_anchors().unwrap().is_empty());
        adapter.resume();
        assert_eq!(adapter.latest_anchors().unwrap().len(), 1);
    }

    #[test]
    fn test_stop_clears_anchors() {
        let adapter = SnapshotSceneAdapter::new("faces");
        adapter.start();
        adapter.publish(vec![plane(7, TrackingState::Paused)]);
        adapter.stop();
        assert_eq!(adapter.state(), AdapterState::Stopped);
        adapter.start();
        assert!(adapter.latest_anchors().unwrap().is_empty());
    }

    #[test]
    fn test_lifecycle_calls_are_idempotent() {
        let adapter = SnapshotSceneAdapter::new("planes");
        adapter.resume();
        assert_eq!(adapter.state(), AdapterState::Idle);
        adapter.stop();
        adapter.stop();
        adapter.pause();
        assert_eq!(adapter.state(), AdapterState::Stopped);
    }
}
