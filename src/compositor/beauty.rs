// SPDX-License-Identifier: GPL-3.0-only

//! CPU reference of the beauty pass (`beauty_main` in `compositor.wgsl`)

use super::tone::{Rgb, luma, smoothstep};
use crate::shaders::FrameUniforms;

/// 3x3 Gaussian spatial weights, row-major
const KERNEL: [[f32; 3]; 3] = [[1.0, 2.0, 1.0], [2.0, 4.0, 2.0], [1.0, 2.0, 1.0]];

/// Whether any beauty stage would change the image
pub fn is_active(u: &FrameUniforms) -> bool {
    u.beauty_weight != 0.0 && (u.smoothing != 0.0 || u.whitening != 0.0 || u.redness != 0.0)
}

/// Edge-preserving 9-tap blur around (x, y)
///
/// Each neighbor is weighted by the spatial kernel times
/// `exp(-Δluma² * k)`, so taps across a strong edge contribute little.
/// Taps are `blur_radius` pixels apart and clamp at the image border.
pub fn bilateral_sample(image: &[Rgb], width: u32, height: u32, x: u32, y: u32, u: &FrameUniforms) -> Rgb {
    let center = image[(y * width + x) as usize];
    let center_luma = luma(center);
    let mut sum = [0.0f32; 3];
    let mut total = 0.0f32;

    for (row, dy) in (-1i32..=1).enumerate() {
        for (col, dx) in (-1i32..=1).enumerate() {
            let sx = (x as f32 + dx as f32 * u.blur_radius + 0.5).floor() as i32;
            let sy = (y as f32 + dy as f32 * u.blur_radius + 0.5).floor() as i32;
            let sx = sx.clamp(0, width as i32 - 1) as u32;
            let sy = sy.clamp(0, height as i32 - 1) as u32;
            let tap = image[(sy * width + sx) as usize];

            let diff = luma(tap) - center_luma;
            let w = KERNEL[row][col] * (-diff * diff * u.edge_sensitivity).exp();
            sum[0] += tap[0] * w;
            sum[1] += tap[1] * w;
            sum[2] += tap[2] * w;
            total += w;
        }
    }

    // The center tap always has weight 4, so total > 0
    [sum[0] / total, sum[1] / total, sum[2] / total]
}

/// Beauty result for one pixel of the toned image
pub fn apply_beauty(image: &[Rgb], width: u32, height: u32, x: u32, y: u32, u: &FrameUniforms) -> Rgb {
    let mut c = image[(y * width + x) as usize];
    if u.beauty_weight == 0.0 {
        return c;
    }

    let smoothing = u.smoothing * u.beauty_weight;
    if smoothing != 0.0 {
        let blurred = bilateral_sample(image, width, height, x, y, u);
        for i in 0..3 {
            c[i] = (c[i] + (blurred[i] - c[i]) * smoothing).clamp(0.0, 1.0);
        }
    }

    let whitening = u.whitening * u.beauty_weight;
    if whitening != 0.0 {
        let lift = whitening * 0.3 * smoothstep(0.2, 1.0, luma(c));
        for v in &mut c {
            *v = (*v + (1.0 - *v) * lift).clamp(0.0, 1.0);
        }
    }

    let redness = u.redness * u.beauty_weight;
    if redness != 0.0 {
        c[0] = (c[0] + redness * 0.1).clamp(0.0, 1.0);
    }

    c
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::Zeroable;

    fn uniforms() -> FrameUniforms {
        FrameUniforms {
            width: 4,
            height: 1,
            edge_sensitivity: 40.0,
            blur_radius: 1.0,
            ..FrameUniforms::zeroed()
        }
    }

    #[test]
    fn test_zero_weight_is_identity() {
        let image = vec![[0.1, 0.5, 0.9], [0.9, 0.5, 0.1], [0.3; 3], [0.7; 3]];
        let u = FrameUniforms {
            smoothing: 1.0,
            whitening: 1.0,
            redness: 1.0,
            ..uniforms()
        };
        assert!(!is_active(&u));
        for x in 0..4 {
            assert_eq!(apply_beauty(&image, 4, 1, x, 0, &u), image[x as usize]);
        }
    }

    #[test]
    fn test_blur_preserves_strong_edges() {
        // Dark | bright step edge
        let image = vec![[0.0; 3], [0.0; 3], [1.0; 3], [1.0; 3]];
        let u = FrameUniforms {
            beauty_weight: 1.0,
            smoothing: 1.0,
            edge_sensitivity: 400.0,
            ..uniforms()
        };
        let left = apply_beauty(&image, 4, 1, 1, 0, &u);
        assert!(left[0] < 0.01, "edge leaked: {:?}", left);
    }

    #[test]
    fn test_blur_smooths_small_noise() {
        let image = vec![[0.50; 3], [0.54; 3], [0.50; 3], [0.50; 3]];
        let u = FrameUniforms {
            beauty_weight: 1.0,
            smoothing: 1.0,
            ..uniforms()
        };
        let c = apply_beauty(&image, 4, 1, 1, 0, &u);
        assert!(c[0] < 0.54 && c[0] > 0.50);
    }

    #[test]
    fn test_redness_adds_to_red_only() {
        let image = vec![[0.4, 0.4, 0.4]];
        let u = FrameUniforms {
            width: 1,
            beauty_weight: 1.0,
            redness: 0.5,
            ..uniforms()
        };
        let c = apply_beauty(&image, 1, 1, 0, 0, &u);
        assert!((c[0] - 0.45).abs() < 1e-6);
        assert_eq!(c[1], 0.4);
        assert_eq!(c[2], 0.4);
    }
}
