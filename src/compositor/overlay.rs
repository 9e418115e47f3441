// SPDX-License-Identifier: GPL-3.0-only

//! AR overlay geometry
//!
//! Anchors arrive in camera space (right-handed, -Z forward). Plane anchors
//! are drawn as their projected rectangle outline, face anchors as their
//! image-space bounding box plus a small cross per landmark.

use super::frame::RenderedFrame;
use crate::scene::{AnchorKind, Pose, SceneAnchor};

/// Column-major 4x4 matrix: `m[column][row]`
pub type Mat4 = [[f32; 4]; 4];

pub const IDENTITY: Mat4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

const PLANE_COLOR: [u8; 4] = [64, 220, 255, 255];
const FACE_COLOR: [u8; 4] = [255, 128, 200, 255];

/// OpenGL-style perspective projection
pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let f = 1.0 / (fov_y * 0.5).tan();
    let mut m = [[0.0; 4]; 4];
    m[0][0] = f / aspect;
    m[1][1] = f;
    m[2][2] = (far + near) / (near - far);
    m[2][3] = -1.0;
    m[3][2] = 2.0 * far * near / (near - far);
    m
}

pub fn multiply(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut out = [[0.0; 4]; 4];
    for (col, out_col) in out.iter_mut().enumerate() {
        for (row, value) in out_col.iter_mut().enumerate() {
            *value = (0..4).map(|k| a[k][row] * b[col][k]).sum();
        }
    }
    out
}

/// Model matrix of a pose (rotation then translation)
pub fn pose_matrix(pose: &Pose) -> Mat4 {
    let [x, y, z, w] = pose.rotation;
    let [tx, ty, tz] = pose.translation;
    [
        [
            1.0 - 2.0 * (y * y + z * z),
            2.0 * (x * y + w * z),
            2.0 * (x * z - w * y),
            0.0,
        ],
        [
            2.0 * (x * y - w * z),
            1.0 - 2.0 * (x * x + z * z),
            2.0 * (y * z + w * x),
            0.0,
        ],
        [
            2.0 * (x * z + w * y),
            2.0 * (y * z - w * x),
            1.0 - 2.0 * (x * x + y * y),
            0.0,
        ],
        [tx, ty, tz, 1.0],
    ]
}

pub fn transform(m: &Mat4, p: [f32; 3]) -> [f32; 4] {
    let v = [p[0], p[1], p[2], 1.0];
    let mut out = [0.0; 4];
    for (row, value) in out.iter_mut().enumerate() {
        *value = (0..4).map(|k| m[k][row] * v[k]).sum();
    }
    out
}

/// View-projection for the current viewport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub view_projection: Mat4,
}

impl Projection {
    pub fn new(fov_y: f32, near: f32, far: f32, viewport_width: u32, viewport_height: u32) -> Self {
        let aspect = viewport_width.max(1) as f32 / viewport_height.max(1) as f32;
        // The camera sits at the origin, so the view matrix is the identity
        Self {
            view_projection: multiply(&perspective(fov_y, aspect, near, far), &IDENTITY),
        }
    }

    /// Camera-space point to pixel coordinates; `None` behind the camera
    pub fn project(&self, model: &Mat4, local: [f32; 3], width: u32, height: u32) -> Option<[f32; 2]> {
        let clip = transform(&multiply(&self.view_projection, model), local);
        if clip[3] <= f32::EPSILON {
            return None;
        }
        let ndc_x = clip[0] / clip[3];
        let ndc_y = clip[1] / clip[3];
        Some([
            (ndc_x + 1.0) * 0.5 * width as f32,
            (1.0 - ndc_y) * 0.5 * height as f32,
        ])
    }
}

/// Clip a segment to [0, w) x [0, h) (Liang-Barsky)
fn clip_segment(a: [f32; 2], b: [f32; 2], width: f32, height: f32) -> Option<([f32; 2], [f32; 2])> {
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    let (mut t0, mut t1) = (0.0f32, 1.0f32);
    let max_x = width - 1.0;
    let max_y = height - 1.0;

    for (p, q) in [(-dx, a[0]), (dx, max_x - a[0]), (-dy, a[1]), (dy, max_y - a[1])] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else {
            let r = q / p;
            if p < 0.0 {
                if r > t1 {
                    return None;
                }
                t0 = t0.max(r);
            } else {
                if r < t0 {
                    return None;
                }
                t1 = t1.min(r);
            }
        }
    }
    Some((
        [a[0] + t0 * dx, a[1] + t0 * dy],
        [a[0] + t1 * dx, a[1] + t1 * dy],
    ))
}

fn put_pixel(frame: &mut RenderedFrame, x: i64, y: i64, color: [u8; 4]) {
    if x < 0 || y < 0 || x >= i64::from(frame.width) || y >= i64::from(frame.height) {
        return;
    }
    let i = (y as usize * frame.width as usize + x as usize) * 4;
    frame.data[i..i + 4].copy_from_slice(&color);
}

/// Draw a clipped line (Bresenham)
pub fn draw_line(frame: &mut RenderedFrame, a: [f32; 2], b: [f32; 2], color: [u8; 4]) {
    if !(a.iter().chain(b.iter()).all(|v| v.is_finite())) {
        return;
    }
    let Some((a, b)) = clip_segment(a, b, frame.width as f32, frame.height as f32) else {
        return;
    };

    let (mut x0, mut y0) = (a[0].round() as i64, a[1].round() as i64);
    let (x1, y1) = (b[0].round() as i64, b[1].round() as i64);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        put_pixel(frame, x0, y0, color);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn draw_polygon(frame: &mut RenderedFrame, points: &[[f32; 2]], color: [u8; 4]) {
    for (i, &a) in points.iter().enumerate() {
        let b = points[(i + 1) % points.len()];
        draw_line(frame, a, b, color);
    }
}

/// Draw every tracking anchor; returns how many were drawn
pub fn draw_anchors(frame: &mut RenderedFrame, anchors: &[SceneAnchor], projection: &Projection) -> usize {
    let (width, height) = (frame.width, frame.height);
    let mut drawn = 0;

    for anchor in anchors.iter().filter(|a| a.is_tracking()) {
        let model = pose_matrix(&anchor.pose);
        match &anchor.kind {
            AnchorKind::Plane { extent_x, extent_z } => {
                let (hx, hz) = (extent_x * 0.5, extent_z * 0.5);
                let corners = [[-hx, 0.0, -hz], [hx, 0.0, -hz], [hx, 0.0, hz], [-hx, 0.0, hz]];
                let projected: Option<Vec<_>> = corners
                    .iter()
                    .map(|&c| projection.project(&model, c, width, height))
                    .collect();
                // Skip planes that cross behind the camera
                if let Some(points) = projected {
                    draw_polygon(frame, &points, PLANE_COLOR);
                    drawn += 1;
                }
            }
            AnchorKind::Face {
                landmarks,
                bounding_box,
            } => {
                let (w, h) = (width as f32, height as f32);
                let x0 = bounding_box.x * w;
                let y0 = bounding_box.y * h;
                let x1 = (bounding_box.x + bounding_box.width) * w;
                let y1 = (bounding_box.y + bounding_box.height) * h;
                draw_polygon(frame, &[[x0, y0], [x1, y0], [x1, y1], [x0, y1]], FACE_COLOR);

                for position in landmarks.values() {
                    if let Some([px, py]) = projection.project(&model, *position, width, height) {
                        draw_line(frame, [px - 2.0, py], [px + 2.0, py], FACE_COLOR);
                        draw_line(frame, [px, py - 2.0], [px, py + 2.0], FACE_COLOR);
                    }
                }
                drawn += 1;
            }
        }
    }
    drawn
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{FrameRegion, TrackingState};
    use std::collections::BTreeMap;

    fn blank(width: u32, height: u32) -> RenderedFrame {
        RenderedFrame {
            width,
            height,
            data: vec![0; (width * height * 4) as usize],
            sequence: 0,
        }
    }

    fn lit_pixels(frame: &RenderedFrame) -> usize {
        frame.data.chunks(4).filter(|p| p[3] != 0).count()
    }

    #[test]
    fn test_point_ahead_projects_to_center() {
        let projection = Projection::new(std::f32::consts::FRAC_PI_2, 0.1, 100.0, 100, 100);
        let p = projection
            .project(&IDENTITY, [0.0, 0.0, -2.0], 100, 100)
            .unwrap();
        assert!((p[0] - 50.0).abs() < 1e-3 && (p[1] - 50.0).abs() < 1e-3);
        assert!(projection.project(&IDENTITY, [0.0, 0.0, 2.0], 100, 100).is_none());
    }

    #[test]
    fn test_rotation_quaternion() {
        // 90 degrees about Y maps +X to -Z
        let half = std::f32::consts::FRAC_PI_4;
        let pose = Pose {
            translation: [0.0; 3],
            rotation: [0.0, half.sin(), 0.0, half.cos()],
        };
        let p = transform(&pose_matrix(&pose), [1.0, 0.0, 0.0]);
        assert!(p[0].abs() < 1e-6 && (p[2] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_line_is_clipped() {
        let mut frame = blank(10, 10);
        draw_line(&mut frame, [-100.0, 5.0], [100.0, 5.0], [255; 4]);
        assert_eq!(lit_pixels(&frame), 10);
    }

    #[test]
    fn test_only_tracking_anchors_drawn() {
        let projection = Projection::new(std::f32::consts::FRAC_PI_3, 0.05, 100.0, 64, 64);
        let face = |tracking| SceneAnchor {
            id: 1,
            pose: Pose::from_translation([0.0, 0.0, -1.0]),
            tracking,
            kind: AnchorKind::Face {
                landmarks: BTreeMap::from([("nose".to_string(), [0.0, 0.0, 0.0])]),
                bounding_box: FrameRegion {
                    x: 0.25,
                    y: 0.25,
                    width: 0.5,
                    height: 0.5,
                },
            },
        };

        let mut frame = blank(64, 64);
        let anchors = vec![face(TrackingState::Paused), face(TrackingState::Stopped)];
        assert_eq!(draw_anchors(&mut frame, &anchors, &projection), 0);
        assert_eq!(lit_pixels(&frame), 0);

        let anchors = vec![face(TrackingState::Tracking)];
        assert_eq!(draw_anchors(&mut frame, &anchors, &projection), 1);
        assert!(lit_pixels(&frame) > 0);
    }
}
